//! Spatial picking and selection for reconstructed-scene viewers.
//!
//! This crate is the interaction core of a viewer for reconstructed 3D
//! scenes (calibrated cameras, a sparse point cloud with per-point
//! visibility, and an optional triangle mesh):
//!
//! - [`FaceOctree`] and [`PointOctree`] - Ray-nearest queries over mesh faces and points
//! - [`PickResolver`] - Click / double-click / drag handling with mesh > point > camera priority
//! - [`SelectionRecord`] and [`SelectionSet`] - Pointer pick and bulk selection
//! - [`Roi`] and [`fit_roi`] - Axis-aligned or oriented regions of interest
//! - [`Worker`] and [`JobQueue`] - A single background worker for index builds and image loads
//! - [`ImageSlot`] - Lock-free hand-off of decoded images to the interactive thread
//! - [`Session`] - All of the above wired to a [`ViewerHost`]
//!
//! # Layer 0 Crate
//!
//! There are no rendering or windowing dependencies. The renderer is reached
//! through the [`ViewerHost`] trait and image decoding through
//! [`ImageSource`], so the crate runs headless in tests and tools.
//!
//! # Threading
//!
//! A [`Session`] lives on the interactive thread and owns one worker thread.
//! Index rebuilds run on the worker against shared snapshots of the
//! geometry; the session swaps the finished index in on its next pick. Edits
//! made while a rebuild runs invalidate it, and the stale result is dropped.
//!
//! # Example
//!
//! ```
//! use cf_scene_select::{
//!     Mesh, NullHost, PointCloud, PointerEvent, Ray, SceneData, Selection, Session,
//!     ViewerConfig,
//! };
//! use nalgebra::{Point3, Vector3};
//!
//! let mesh = Mesh::new(
//!     vec![
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(0.0, 1.0, 0.0),
//!     ],
//!     vec![[0, 1, 2]],
//! );
//! let scene = SceneData::new(Vec::new(), PointCloud::default(), mesh);
//!
//! let mut session = Session::new(ViewerConfig::default(), NullHost)?;
//! session.open(scene)?;
//! session.wait_for_jobs()?;
//!
//! // A quick click straight down onto the triangle
//! let ray = Ray::new(Point3::new(0.25, 0.25, 5.0), -Vector3::z());
//! session.on_pointer(&ray, &PointerEvent::press(0.0));
//! session.on_pointer(&ray, &PointerEvent::release(0.05));
//! assert_eq!(session.record().selection, Selection::Triangle(0));
//! # Ok::<(), cf_scene_select::SceneError>(())
//! ```
//!
//! # Regions of Interest
//!
//! ```
//! use cf_scene_select::{Roi, RoiFit, fit_roi};
//! use nalgebra::Point3;
//!
//! let points = [Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0)];
//! let roi = fit_roi(&points, RoiFit::Aligned).unwrap().with_margin(0.03, 1e-3);
//! assert!(roi.contains(&Point3::new(1.0, 0.5, 0.5)));
//! assert!(matches!(roi, Roi::Aligned(_)));
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod bounds;
mod config;
mod error;
mod host;
mod image_slot;
mod index;
mod jobs;
mod octree;
mod ops;
mod pick;
mod ray;
mod roi;
mod scene;
mod selection;
mod session;

// Re-export core types
pub use bounds::{Aabb, OrientedBox};
pub use config::{
    CAMERA_CONE_HALF_ANGLE_DEG, CLICK_WINDOW, DOUBLE_CLICK_WINDOW, FACE_SPLIT_THRESHOLD,
    POINT_SPLIT_THRESHOLD, ROI_MARGIN, ViewerConfig,
};
pub use error::{SceneError, SceneResult};
pub use host::{ImageSource, NullHost, ViewerHost};
pub use image_slot::{ImageBuffer, ImageSlot, SlotState};
pub use index::{FaceOctree, IndexSlot, POINT_RADIUS_FRACTION, PointOctree, RAY_EPSILON};
pub use jobs::{Job, JobFn, JobKind, JobQueue, Worker, WorkerStats};
pub use octree::{Octree, OctreeItem, OctreeNode, OctreeStats, Pick};
pub use ops::{
    count_image_observations, fit_selection_roi, gather_selected_points, images_for_crop,
    points_seen_by, scene_box,
};
pub use pick::{
    Candidate, Modifiers, PickEffect, PickResolver, PickTargets, PointerAction, PointerButton,
    PointerEvent,
};
pub use ray::{Cone, Ray, ray_aabb_entry, ray_sphere_hit, ray_triangle_intersect};
pub use roi::{Roi, RoiFit, fit_oriented_box, fit_roi};
pub use scene::{Mesh, PointCloud, SceneData, SceneImage, ViewList};
pub use selection::{FOCUS_POINT, Selection, SelectionRecord, SelectionSet};
pub use session::{Session, ViewerImage};

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};
