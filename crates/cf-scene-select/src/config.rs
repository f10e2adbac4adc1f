//! Viewer configuration.
//!
//! [`ViewerConfig`] gathers every tunable of the selection core: picking
//! thresholds, interaction timing, octree split sizes and ROI fitting.
//!
//! # Example
//!
//! ```
//! use cf_scene_select::ViewerConfig;
//!
//! let config = ViewerConfig::default()
//!     .with_min_views(3)
//!     .with_roi_margin(0.05);
//! assert!(config.validate().is_ok());
//! assert_eq!(config.effective_min_views(2), 2);
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{SceneError, SceneResult};

/// Maximum press duration, in seconds, that still counts as a click.
pub const CLICK_WINDOW: f64 = 0.2;

/// Maximum gap, in seconds, between a selection and a release that makes a
/// double action.
pub const DOUBLE_CLICK_WINDOW: f64 = 0.3;

/// Default ROI safety margin as a fraction of the largest extent.
pub const ROI_MARGIN: f64 = 0.03;

/// Default octree split threshold for face-backed trees.
pub const FACE_SPLIT_THRESHOLD: usize = 256;

/// Default octree split threshold for point-backed trees.
pub const POINT_SPLIT_THRESHOLD: usize = 512;

/// Default camera pick cone half-angle, in degrees.
pub const CAMERA_CONE_HALF_ANGLE_DEG: f64 = 0.5;

/// Configuration for picking, indexing and selection-derived operations.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ViewerConfig {
    /// Minimum number of views a point needs to be pickable.
    /// Clamped into `[1, image count]` at use.
    pub min_views: u32,

    /// ROI margin as a fraction of the fitted box's largest extent.
    pub roi_margin: f64,

    /// Extent the ROI margin is computed from when the fitted region has
    /// zero extent, as when it was fitted to a single point.
    pub roi_min_extent: f64,

    /// Candidate orientations per axis when fitting an oriented ROI.
    pub obb_samples: usize,

    /// A face-backed octree node splits when it holds more faces than this.
    pub face_split_threshold: usize,

    /// A point-backed octree node splits when it holds more points than this.
    pub point_split_threshold: usize,

    /// Hard limit on octree depth.
    pub max_octree_depth: usize,

    /// Radius of the sphere a point occupies for ray picking.
    /// `None` uses 0.1% of the point cloud's bounding-box diagonal.
    pub point_pick_radius: Option<f64>,

    /// Maximum press duration, in seconds, that counts as a click.
    pub click_window: f64,

    /// Maximum gap, in seconds, for a double action.
    pub double_click_window: f64,

    /// Half-angle, in degrees, of the cone used to pick cameras.
    pub camera_cone_half_angle_deg: f64,

    /// Longest image side requested when loading an image for camera view.
    pub image_max_resolution: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            min_views: 2,
            roi_margin: ROI_MARGIN,
            roi_min_extent: 1e-3,
            obb_samples: 32,
            face_split_threshold: FACE_SPLIT_THRESHOLD,
            point_split_threshold: POINT_SPLIT_THRESHOLD,
            max_octree_depth: 12,
            point_pick_radius: None,
            click_window: CLICK_WINDOW,
            double_click_window: DOUBLE_CLICK_WINDOW,
            camera_cone_half_angle_deg: CAMERA_CONE_HALF_ANGLE_DEG,
            image_max_resolution: 1024,
        }
    }
}

impl ViewerConfig {
    /// Set the minimum views threshold for point picking.
    #[must_use]
    pub const fn with_min_views(mut self, min_views: u32) -> Self {
        self.min_views = min_views;
        self
    }

    /// Set the ROI margin fraction.
    #[must_use]
    pub const fn with_roi_margin(mut self, margin: f64) -> Self {
        self.roi_margin = margin;
        self
    }

    /// Set the number of candidate orientations for oriented ROI fitting.
    #[must_use]
    pub const fn with_obb_samples(mut self, samples: usize) -> Self {
        self.obb_samples = samples;
        self
    }

    /// Set both octree split thresholds.
    #[must_use]
    pub const fn with_split_thresholds(mut self, faces: usize, points: usize) -> Self {
        self.face_split_threshold = faces;
        self.point_split_threshold = points;
        self
    }

    /// Set a fixed point pick radius.
    #[must_use]
    pub const fn with_point_pick_radius(mut self, radius: f64) -> Self {
        self.point_pick_radius = Some(radius);
        self
    }

    /// Set the click and double-click windows, in seconds.
    #[must_use]
    pub const fn with_click_windows(mut self, click: f64, double_click: f64) -> Self {
        self.click_window = click;
        self.double_click_window = double_click;
        self
    }

    /// Set the camera pick cone half-angle, in degrees.
    #[must_use]
    pub const fn with_camera_cone_half_angle(mut self, degrees: f64) -> Self {
        self.camera_cone_half_angle_deg = degrees;
        self
    }

    /// Minimum views clamped into `[1, image_count]`.
    #[must_use]
    pub fn effective_min_views(&self, image_count: usize) -> usize {
        let upper = image_count.max(1);
        (self.min_views as usize).clamp(1, upper)
    }

    /// Camera cone half-angle in radians.
    #[must_use]
    pub fn camera_cone_half_angle(&self) -> f64 {
        self.camera_cone_half_angle_deg.to_radians()
    }

    /// Checks that every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidConfig`] naming the first bad value.
    pub fn validate(&self) -> SceneResult<()> {
        if !(self.roi_margin >= 0.0 && self.roi_margin.is_finite()) {
            return Err(SceneError::invalid_config(format!(
                "roi_margin must be a non-negative number, got {}",
                self.roi_margin
            )));
        }
        if !(self.roi_min_extent > 0.0 && self.roi_min_extent.is_finite()) {
            return Err(SceneError::invalid_config("roi_min_extent must be positive"));
        }
        if self.face_split_threshold == 0 || self.point_split_threshold == 0 {
            return Err(SceneError::invalid_config("split thresholds must be at least 1"));
        }
        if self.max_octree_depth == 0 {
            return Err(SceneError::invalid_config("max_octree_depth must be at least 1"));
        }
        if let Some(r) = self.point_pick_radius {
            if !(r > 0.0 && r.is_finite()) {
                return Err(SceneError::invalid_config(format!(
                    "point_pick_radius must be positive, got {r}"
                )));
            }
        }
        if !(self.click_window > 0.0 && self.double_click_window > 0.0) {
            return Err(SceneError::invalid_config("click windows must be positive"));
        }
        if !(self.camera_cone_half_angle_deg > 0.0 && self.camera_cone_half_angle_deg < 90.0) {
            return Err(SceneError::invalid_config(format!(
                "camera cone half-angle must be in (0, 90) degrees, got {}",
                self.camera_cone_half_angle_deg
            )));
        }
        if self.image_max_resolution == 0 {
            return Err(SceneError::invalid_config("image_max_resolution must be positive"));
        }
        Ok(())
    }
}
