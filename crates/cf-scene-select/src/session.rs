//! The interactive session: scene, indices, worker and selection together.
//!
//! A [`Session`] is driven from the interactive thread. Everything slow
//! (index builds, image decoding) is queued on its own [`Worker`], and the
//! results come back through [`IndexSlot`]s and [`ImageSlot`]s that the
//! session reads without blocking.
//!
//! Every geometry edit bumps a generation counter and drops the live
//! indices before queueing a rebuild. A rebuild only installs its result if
//! the generation it was built for is still current, so an index built from
//! geometry that has since been edited never becomes visible.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::config::ViewerConfig;
use crate::error::{SceneError, SceneResult};
use crate::host::{ImageSource, ViewerHost};
use crate::image_slot::{ImageSlot, SlotState};
use crate::index::{FaceOctree, IndexSlot, PointOctree};
use crate::jobs::{Worker, WorkerStats};
use crate::ops::{fit_selection_roi, gather_selected_points, images_for_crop, points_seen_by, scene_box};
use crate::pick::{PickEffect, PickResolver, PickTargets, PointerEvent};
use crate::ray::Ray;
use crate::scene::SceneData;
use crate::selection::{Selection, SelectionRecord, SelectionSet};

/// A calibrated scene image as shown by the viewer.
///
/// Viewer cameras are the valid scene images, in scene order.
#[derive(Debug)]
pub struct ViewerImage {
    scene_index: usize,
    slot: Arc<ImageSlot>,
    uploaded: bool,
}

impl ViewerImage {
    fn new(scene_index: usize) -> Self {
        Self {
            scene_index,
            slot: Arc::new(ImageSlot::new()),
            uploaded: false,
        }
    }

    /// Index of the image in the scene.
    #[must_use]
    pub const fn scene_index(&self) -> usize {
        self.scene_index
    }

    /// Slot the decoded pixels arrive in.
    #[must_use]
    pub fn slot(&self) -> &ImageSlot {
        &self.slot
    }

    /// Whether the pixels have been handed to the host.
    #[must_use]
    pub const fn is_uploaded(&self) -> bool {
        self.uploaded
    }
}

/// Interactive selection session over one scene.
pub struct Session<H: ViewerHost> {
    config: ViewerConfig,
    scene: SceneData,
    host: H,
    worker: Worker,
    image_source: Option<Arc<dyn ImageSource>>,
    faces: Arc<IndexSlot<FaceOctree>>,
    points: Arc<IndexSlot<PointOctree>>,
    generation: Arc<AtomicU64>,
    images: Vec<ViewerImage>,
    camera_centers: Vec<Point3<f64>>,
    resolver: PickResolver,
    selection: SelectionSet,
    show_mesh: bool,
    show_points: bool,
    camera_view: Option<usize>,
}

impl<H: ViewerHost> Session<H> {
    /// Creates an empty session and starts its worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidConfig`] for a bad configuration, or
    /// [`SceneError::Spawn`] if the worker cannot be started.
    pub fn new(config: ViewerConfig, host: H) -> SceneResult<Self> {
        config.validate()?;
        let worker = Worker::spawn("scene-worker")?;
        let resolver = PickResolver::new(&config);
        Ok(Self {
            config,
            scene: SceneData::default(),
            host,
            worker,
            image_source: None,
            faces: Arc::new(IndexSlot::new()),
            points: Arc::new(IndexSlot::new()),
            generation: Arc::new(AtomicU64::new(0)),
            images: Vec::new(),
            camera_centers: Vec::new(),
            resolver,
            selection: SelectionSet::new(),
            show_mesh: true,
            show_points: true,
            camera_view: None,
        })
    }

    /// Sets the collaborator that decodes images for camera view mode.
    #[must_use]
    pub fn with_image_source(mut self, source: Arc<dyn ImageSource>) -> Self {
        self.image_source = Some(source);
        self
    }

    /// Replaces the scene, queues an index build and frames the new bounds.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidConfig`] if view lists are not one per
    /// point, [`SceneError::IndexOutOfRange`] if the scene references
    /// missing images or vertices, or [`SceneError::QueueShutDown`] after
    /// [`Session::shutdown`].
    pub fn open(&mut self, scene: SceneData) -> SceneResult<()> {
        scene.validate()?;
        self.reset();

        self.images = scene
            .images
            .iter()
            .enumerate()
            .filter(|(_, image)| image.valid)
            .map(|(i, _)| ViewerImage::new(i))
            .collect();
        self.camera_centers = scene
            .images
            .iter()
            .filter(|image| image.valid)
            .map(|image| image.center)
            .collect();
        self.scene = scene;
        self.dispatch_rebuild()?;

        let bounds = self.scene.framing_bounds();
        self.host.upload_geometry(&self.scene);
        self.host.upload_bounds(self.scene.roi.as_ref());
        self.host.set_scene_bounds(&bounds);
        self.host.request_redraw();

        info!(
            images = self.scene.images.len(),
            cameras = self.images.len(),
            points = self.scene.points.len(),
            faces = self.scene.mesh.face_count(),
            bounded = self.scene.roi.is_some(),
            "Scene opened"
        );
        Ok(())
    }

    /// Drops the scene and everything derived from it.
    pub fn close(&mut self) {
        self.reset();
        self.scene = SceneData::default();
        self.host.upload_geometry(&self.scene);
        self.host.request_redraw();
    }

    fn reset(&mut self) {
        for image in &self.images {
            image.slot.release();
        }
        self.images.clear();
        self.camera_centers.clear();
        self.camera_view = None;
        self.selection.clear();
        self.resolver.clear();
        self.invalidate_indices();
    }

    fn invalidate_indices(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.faces.clear();
        self.points.clear();
    }

    /// Queues a rebuild of both indices from the current geometry.
    ///
    /// Returns `false` without queueing anything for an empty scene.
    fn dispatch_rebuild(&self) -> SceneResult<bool> {
        let mesh = (!self.scene.mesh.is_empty()).then(|| Arc::clone(&self.scene.mesh));
        let cloud = (!self.scene.points.is_empty()).then(|| Arc::clone(&self.scene.points));
        if mesh.is_none() && cloud.is_none() {
            return Ok(false);
        }

        let config = self.config.clone();
        let generation = Arc::clone(&self.generation);
        let built_for = generation.load(Ordering::Acquire);
        let faces = Arc::clone(&self.faces);
        let points = Arc::clone(&self.points);

        self.worker.submit("rebuild spatial indices", move || {
            if let Some(mesh) = mesh {
                let index = Arc::new(FaceOctree::build(mesh, &config));
                if !faces.install_if_current(index, &generation, built_for) {
                    debug!(built_for, "Discarded stale face index");
                }
            }
            if let Some(cloud) = cloud {
                let index = Arc::new(PointOctree::build(cloud, &config));
                if !points.install_if_current(index, &generation, built_for) {
                    debug!(built_for, "Discarded stale point index");
                }
            }
            true
        })?;
        Ok(true)
    }

    fn geometry_changed(&mut self) -> SceneResult<()> {
        self.invalidate_indices();
        self.dispatch_rebuild()?;
        self.host.upload_geometry(&self.scene);
        self.selection.clear();
        self.resolver.clear();
        self.host.upload_selection(self.resolver.record(), &self.selection);
        Ok(())
    }

    /// Feeds a pointer event and the world-space ray under the cursor.
    pub fn on_pointer(&mut self, ray: &Ray, event: &PointerEvent) {
        if self.scene.is_empty() {
            return;
        }

        let faces = if self.show_mesh { self.faces.get() } else { None };
        let points = if self.show_points { self.points.get() } else { None };
        let targets = PickTargets {
            faces: faces.as_deref(),
            points: points.as_deref(),
            min_views: self.config.effective_min_views(self.scene.images.len()),
            cameras: &self.camera_centers,
        };
        let effects = self.resolver.handle(ray, event, &targets);

        for effect in effects {
            match effect {
                PickEffect::EnterCameraView(camera) => {
                    if let Err(err) = self.set_camera_view_mode(camera) {
                        warn!(camera, %err, "Could not enter camera view mode");
                    }
                }
                PickEffect::LeaveCameraView => self.disable_camera_view_mode(),
                PickEffect::CenterOn(point) => self.host.center_on(point),
                PickEffect::RefreshSelection => {
                    self.log_selection();
                    self.host.upload_selection(self.resolver.record(), &self.selection);
                    self.host.request_redraw();
                }
            }
        }
    }

    fn log_selection(&self) {
        let record = self.resolver.record();
        match record.selection {
            Selection::None => debug!("Selection cleared"),
            Selection::Triangle(face) => {
                let vertices = self.scene.mesh.faces.get(face).copied().unwrap_or_default();
                debug!(
                    face,
                    ?vertices,
                    v0 = ?record.points[0],
                    v1 = ?record.points[1],
                    v2 = ?record.points[2],
                    hit = ?record.focus(),
                    "Face selected"
                );
            }
            Selection::Point(point) => {
                debug!(
                    point,
                    position = ?record.points[0],
                    views = ?self.scene.points.views_of(point),
                    "Point selected"
                );
            }
            Selection::Camera(camera) => {
                let Some(image) = self
                    .images
                    .get(camera)
                    .and_then(|v| self.scene.images.get(v.scene_index))
                else {
                    return;
                };
                let (roll, pitch, yaw) = image.rotation.euler_angles();
                debug!(
                    camera,
                    name = %image.name,
                    width = image.width,
                    height = image.height,
                    position = ?image.center,
                    rotation_deg = ?(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()),
                    neighbor = ?record.neighbor_camera,
                    "Camera selected"
                );
            }
        }
    }

    /// Deletes the bulk-selected points and faces.
    ///
    /// Returns whether anything was removed. On removal the indices are
    /// rebuilt and both selections are cleared.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::QueueShutDown`] after [`Session::shutdown`].
    pub fn remove_selected(&mut self) -> SceneResult<bool> {
        if self.selection.is_empty() {
            return Ok(false);
        }
        let points = self.scene.remove_points(self.selection.points());
        let faces = self.scene.remove_faces(self.selection.faces());
        info!(points, faces, "Removed selected geometry");

        let dirty = points + faces > 0;
        if dirty {
            self.geometry_changed()?;
        }
        self.host.request_redraw();
        Ok(dirty)
    }

    /// Fits the region of interest to the bulk selection.
    ///
    /// `use_aabb` selects an axis-aligned fit, otherwise an oriented box is
    /// searched. Returns whether a region was installed.
    pub fn fit_roi(&mut self, use_aabb: bool) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        let points = gather_selected_points(&self.scene, &self.selection);
        let Some(roi) = fit_selection_roi(&points, use_aabb, &self.config) else {
            return false;
        };

        info!(
            oriented = !use_aabb,
            points = points.len(),
            max_extent = roi.max_extent(),
            "Region of interest fitted to selection"
        );
        self.scene.roi = Some(roi);
        self.host.upload_bounds(self.scene.roi.as_ref());
        self.host.request_redraw();
        true
    }

    /// Drops geometry outside the region of interest.
    ///
    /// Returns whether anything was removed; `false` without a region.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::QueueShutDown`] after [`Session::shutdown`].
    pub fn crop_to_bounds(&mut self) -> SceneResult<bool> {
        let Some(roi) = self.scene.roi else {
            return Ok(false);
        };
        let (points, faces) = self.scene.crop(&roi);
        info!(points, faces, "Cropped scene to region of interest");

        let dirty = points + faces > 0;
        if dirty {
            self.geometry_changed()?;
        }
        let bounds = self.scene.framing_bounds();
        self.host.set_scene_bounds(&bounds);
        self.host.request_redraw();
        Ok(dirty)
    }

    /// Builds a sub-scene of the images that observe at least `min_points`
    /// of `selected`.
    ///
    /// `Ok(None)` when the scene lacks visibility information, fewer than
    /// two images qualify, or every image does.
    ///
    /// # Errors
    ///
    /// Propagates [`SceneData::sub_scene`] failures.
    pub fn crop_to_points(
        &self,
        selected: impl IntoIterator<Item = usize>,
        min_points: usize,
    ) -> SceneResult<Option<SceneData>> {
        if self.scene.images.is_empty() || !self.scene.points.has_views() {
            return Ok(None);
        }
        let Some(images) = images_for_crop(&self.scene.points, self.scene.images.len(), selected, min_points)
        else {
            return Ok(None);
        };
        self.scene.sub_scene(&images).map(Some)
    }

    /// [`Session::crop_to_points`] over the bulk-selected points.
    ///
    /// # Errors
    ///
    /// Propagates [`SceneData::sub_scene`] failures.
    pub fn crop_to_selected_points(&self, min_points: usize) -> SceneResult<Option<SceneData>> {
        self.crop_to_points(self.selection.points().iter().copied(), min_points)
    }

    /// Removes the region of interest, or sets one around the whole scene
    /// when there is none.
    pub fn toggle_scene_box(&mut self) {
        if self.scene.is_empty() {
            return;
        }
        if self.scene.roi.take().is_none() {
            let min_views = self.config.effective_min_views(self.scene.images.len());
            self.scene.roi = scene_box(&self.scene, min_views, &self.config);
        }
        debug!(bounded = self.scene.roi.is_some(), "Scene box toggled");
        self.host.upload_bounds(self.scene.roi.as_ref());
        self.host.request_redraw();
    }

    /// Looks through viewer camera `camera`, loading its image if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::IndexOutOfRange`] for an unknown camera, or
    /// [`SceneError::QueueShutDown`] after [`Session::shutdown`].
    pub fn set_camera_view_mode(&mut self, camera: usize) -> SceneResult<()> {
        let len = self.images.len();
        let viewer = self
            .images
            .get(camera)
            .ok_or_else(|| SceneError::out_of_range("camera", camera, len))?;
        let image = self
            .scene
            .images
            .get(viewer.scene_index)
            .ok_or_else(|| SceneError::out_of_range("image", viewer.scene_index, self.scene.images.len()))?;

        if !viewer.uploaded && viewer.slot.state() == SlotState::Empty {
            if let Some(source) = &self.image_source {
                viewer.slot.mark_loading()?;
                let slot = Arc::clone(&viewer.slot);
                let source = Arc::clone(source);
                let data = image.clone();
                let max_resolution = self.config.image_max_resolution;
                let submitted = self.worker.submit(format!("load image {}", image.name), move || {
                    match source.load(&data, max_resolution) {
                        Ok(buffer) => match slot.assign(buffer) {
                            Ok(()) => true,
                            Err(err) => {
                                warn!(image = %data.name, %err, "Decoded image discarded");
                                false
                            }
                        },
                        Err(err) => {
                            warn!(image = %data.name, %err, "Image load failed");
                            slot.fail_loading();
                            false
                        }
                    }
                });
                if let Err(err) = submitted {
                    viewer.slot.fail_loading();
                    return Err(err);
                }
            }
        }

        self.camera_view = Some(camera);
        self.host.set_camera_view_mode(camera, image);
        Ok(())
    }

    /// Leaves camera view mode if it is active.
    pub fn disable_camera_view_mode(&mut self) {
        if self.camera_view.take().is_some() {
            self.host.disable_camera_view_mode();
        }
    }

    /// Hands every decoded image waiting in a slot to the host.
    ///
    /// Call once per frame. Returns the number of images uploaded.
    pub fn poll_images(&mut self) -> usize {
        let mut uploaded = 0;
        for (camera, image) in self.images.iter_mut().enumerate() {
            if let Some(buffer) = image.slot.transfer() {
                debug!(camera, width = buffer.width(), height = buffer.height(), "Image uploaded");
                image.uploaded = true;
                self.host.upload_image(camera, buffer);
                uploaded += 1;
            }
        }
        if uploaded > 0 {
            self.host.request_redraw();
        }
        uploaded
    }

    /// Replaces the bulk selection with the points observed by the selected
    /// camera, or by the camera being looked through. Selected faces are
    /// dropped.
    ///
    /// With `enable` false, or without such a camera, the bulk selection is
    /// cleared instead. Returns whether a camera's points are selected.
    pub fn select_points_by_camera(&mut self, enable: bool) -> bool {
        if !self.scene.points.has_views() || self.scene.images.is_empty() {
            return false;
        }
        let camera = match self.resolver.record().selection {
            Selection::Camera(camera) => Some(camera),
            _ => self.camera_view,
        };
        let target = camera.and_then(|c| {
            let scene_index = self.images.get(c)?.scene_index;
            Some((c, u32::try_from(scene_index).ok()?))
        });

        let Some((camera, scene_index)) = target.filter(|_| enable) else {
            self.selection.clear();
            self.host.upload_selection(self.resolver.record(), &self.selection);
            self.host.request_redraw();
            return false;
        };

        if self.selection.highlight_camera() != Some(camera) {
            let indices = points_seen_by(&self.scene.points, scene_index);
            debug!(camera, points = indices.len(), "Selected points seen by camera");
            self.selection.clear();
            self.selection.set_points(indices, self.scene.points.len());
            self.selection.set_highlight_camera(Some(camera));
            self.host.upload_selection(self.resolver.record(), &self.selection);
            self.host.request_redraw();
        }
        true
    }

    /// Inverts the bulk selection over all points and faces.
    pub fn invert_selection(&mut self) {
        self.selection
            .invert(self.scene.points.len(), self.scene.mesh.face_count());
        self.host.upload_selection(self.resolver.record(), &self.selection);
        self.host.request_redraw();
    }

    /// Clears the bulk selection.
    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.host.upload_selection(self.resolver.record(), &self.selection);
        self.host.request_redraw();
    }

    /// Viewer camera showing scene image `scene_index`, if it is valid.
    #[must_use]
    pub fn viewer_image_index(&self, scene_index: usize) -> Option<usize> {
        self.images.iter().position(|image| image.scene_index == scene_index)
    }

    /// Shows or hides the mesh for picking.
    pub fn set_show_mesh(&mut self, show: bool) {
        self.show_mesh = show;
    }

    /// Shows or hides the point cloud for picking.
    pub fn set_show_points(&mut self, show: bool) {
        self.show_points = show;
    }

    /// Blocks until every queued job has run.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::QueueShutDown`] after [`Session::shutdown`].
    pub fn wait_for_jobs(&self) -> SceneResult<()> {
        self.worker.flush()
    }

    /// Stops the worker after the jobs already queued. Idempotent.
    pub fn shutdown(&mut self) {
        self.worker.shutdown();
    }

    /// The scene.
    #[must_use]
    pub const fn scene(&self) -> &SceneData {
        &self.scene
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// The host.
    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// The host, mutably.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The pointer selection record.
    #[must_use]
    pub const fn record(&self) -> &SelectionRecord {
        self.resolver.record()
    }

    /// The bulk selection.
    #[must_use]
    pub const fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    /// The bulk selection, mutably. Call [`ViewerHost::upload_selection`]
    /// through [`Session::host_mut`] if the host should see the change.
    pub fn selection_mut(&mut self) -> &mut SelectionSet {
        &mut self.selection
    }

    /// Selected point indices, for callers that keep their own list.
    #[must_use]
    pub fn selected_points(&self) -> &BTreeSet<usize> {
        self.selection.points()
    }

    /// Live face index, if built.
    #[must_use]
    pub fn face_index(&self) -> Option<Arc<FaceOctree>> {
        self.faces.get()
    }

    /// Live point index, if built.
    #[must_use]
    pub fn point_index(&self) -> Option<Arc<PointOctree>> {
        self.points.get()
    }

    /// Current geometry generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Viewer cameras.
    #[must_use]
    pub fn viewer_images(&self) -> &[ViewerImage] {
        &self.images
    }

    /// Viewer camera being looked through.
    #[must_use]
    pub const fn camera_view(&self) -> Option<usize> {
        self.camera_view
    }

    /// Worker job counters.
    #[must_use]
    pub fn worker_stats(&self) -> WorkerStats {
        self.worker.stats()
    }
}

impl<H: ViewerHost> Drop for Session<H> {
    fn drop(&mut self) {
        self.worker.shutdown();
        for image in &self.images {
            image.slot.release();
        }
    }
}
