//! Collaborators the session talks to.
//!
//! The selection core never renders, decodes files or owns the view camera.
//! It reports what changed through [`ViewerHost`] and loads images through
//! [`ImageSource`]. Every [`ViewerHost`] method has a no-op default so hosts
//! only implement what they draw.

use nalgebra::Point3;

use crate::bounds::Aabb;
use crate::error::SceneResult;
use crate::image_slot::ImageBuffer;
use crate::roi::Roi;
use crate::scene::{SceneData, SceneImage};
use crate::selection::{SelectionRecord, SelectionSet};

/// Rendering and view collaborator, called from the interactive thread.
pub trait ViewerHost {
    /// Selection highlight state changed.
    fn upload_selection(&mut self, _record: &SelectionRecord, _set: &SelectionSet) {}

    /// The region of interest changed or was removed.
    fn upload_bounds(&mut self, _roi: Option<&Roi>) {}

    /// Scene geometry changed and its render buffers are stale.
    fn upload_geometry(&mut self, _scene: &SceneData) {}

    /// A frame should be drawn.
    fn request_redraw(&mut self) {}

    /// The view should look through viewer camera `camera`.
    fn set_camera_view_mode(&mut self, _camera: usize, _image: &SceneImage) {}

    /// The view should leave camera view mode.
    fn disable_camera_view_mode(&mut self) {}

    /// The view should center on `point`.
    fn center_on(&mut self, _point: Point3<f64>) {}

    /// The bounds used to frame the scene changed.
    fn set_scene_bounds(&mut self, _bounds: &Aabb) {}

    /// A decoded image for viewer camera `camera` is ready for upload.
    fn upload_image(&mut self, _camera: usize, _image: ImageBuffer) {}
}

/// A host that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl ViewerHost for NullHost {}

/// Loads the pixels of a scene image. Called on the worker thread.
pub trait ImageSource: Send + Sync {
    /// Decodes `image`, scaled so its longest side is at most
    /// `max_resolution`.
    ///
    /// # Errors
    ///
    /// Any failure to produce the image. The session logs it and reverts the
    /// image slot to empty.
    fn load(&self, image: &SceneImage, max_resolution: u32) -> SceneResult<ImageBuffer>;
}
