//! Scene data: point cloud, triangle mesh, calibrated images and the active
//! region of interest.
//!
//! Geometry is held behind [`Arc`] so that index rebuilds running on the
//! worker can read an immutable snapshot while the interactive thread keeps
//! editing. Edits go through [`Arc::make_mut`], which copies the collection
//! only while a snapshot of it is still alive.

use std::collections::BTreeSet;
use std::sync::Arc;

use nalgebra::{Point3, Rotation3};
use tracing::debug;

use crate::bounds::Aabb;
use crate::error::{SceneError, SceneResult};
use crate::roi::Roi;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Indices of the images observing one point.
pub type ViewList = Vec<u32>;

/// A point cloud with optional per-point visibility.
///
/// `views` is either empty (no visibility information) or holds exactly one
/// [`ViewList`] per point.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointCloud {
    /// Point positions.
    pub points: Vec<Point3<f64>>,
    /// Per-point image indices, parallel to `points` when present.
    pub views: Vec<ViewList>,
}

impl PointCloud {
    /// Creates a point cloud without visibility information.
    #[must_use]
    pub const fn new(points: Vec<Point3<f64>>) -> Self {
        Self {
            points,
            views: Vec::new(),
        }
    }

    /// Creates a point cloud with one view list per point.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidConfig`] if the lengths differ.
    pub fn with_views(points: Vec<Point3<f64>>, views: Vec<ViewList>) -> SceneResult<Self> {
        if views.len() != points.len() {
            return Err(SceneError::invalid_config(format!(
                "{} view lists for {} points",
                views.len(),
                points.len()
            )));
        }
        Ok(Self { points, views })
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if there are no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns `true` if per-point view lists are present.
    #[must_use]
    pub fn has_views(&self) -> bool {
        !self.views.is_empty()
    }

    /// Views of point `index`, empty without visibility information.
    #[must_use]
    pub fn views_of(&self, index: usize) -> &[u32] {
        self.views.get(index).map_or(&[], Vec::as_slice)
    }

    /// Checks the visibility filter used for picking.
    ///
    /// Always `true` without visibility information.
    #[must_use]
    pub fn is_confident(&self, index: usize, min_views: usize) -> bool {
        !self.has_views() || self.views_of(index).len() >= min_views
    }

    /// Bounds of the points seen by at least `min_views` images.
    ///
    /// Falls back to all points when none qualify.
    #[must_use]
    pub fn bounds(&self, min_views: usize) -> Aabb {
        let mut aabb = Aabb::empty();
        for (i, p) in self.points.iter().enumerate() {
            if self.is_confident(i, min_views) {
                aabb.expand_point(p);
            }
        }
        if aabb.is_valid() {
            aabb
        } else {
            Aabb::from_points(&self.points)
        }
    }

    /// Removes the given point indices, keeping views aligned.
    ///
    /// Returns the number of points removed.
    pub fn remove(&mut self, indices: &BTreeSet<usize>) -> usize {
        self.retain_indexed(|i, _| !indices.contains(&i))
    }

    /// Keeps only points for which `keep(index, point)` holds.
    ///
    /// Returns the number of points removed.
    pub fn retain_indexed(&mut self, mut keep: impl FnMut(usize, &Point3<f64>) -> bool) -> usize {
        let before = self.points.len();
        let mask: Vec<bool> = self.points.iter().enumerate().map(|(i, p)| keep(i, p)).collect();

        let mut it = mask.iter();
        self.points.retain(|_| it.next().copied().unwrap_or(false));
        if self.has_views() {
            let mut it = mask.iter();
            self.views.retain(|_| it.next().copied().unwrap_or(false));
        }
        before - self.points.len()
    }
}

/// An indexed triangle mesh.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Mesh {
    /// Vertex positions.
    pub vertices: Vec<Point3<f64>>,
    /// Triangle faces as indices into `vertices`.
    pub faces: Vec<[u32; 3]>,
}

impl Mesh {
    /// Creates a mesh from its parts.
    #[must_use]
    pub const fn new(vertices: Vec<Point3<f64>>, faces: Vec<[u32; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Number of faces.
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Returns `true` if the mesh has no faces.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// The three corner positions of face `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` or one of the face's vertex indices is out of range.
    #[must_use]
    pub fn triangle(&self, index: usize) -> [Point3<f64>; 3] {
        self.faces[index].map(|v| self.vertices[v as usize])
    }

    /// Checks that every face references existing vertices.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::IndexOutOfRange`] for the first bad reference.
    pub fn validate(&self) -> SceneResult<()> {
        let len = self.vertices.len();
        for face in &self.faces {
            if let Some(&v) = face.iter().find(|&&v| v as usize >= len) {
                return Err(SceneError::out_of_range("vertex", v as usize, len));
            }
        }
        Ok(())
    }

    /// Bounds of the vertices referenced by faces.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        let mut aabb = Aabb::empty();
        for face in &self.faces {
            for &v in face {
                aabb.expand_point(&self.vertices[v as usize]);
            }
        }
        aabb
    }

    /// Removes the given face indices. Vertices are kept.
    ///
    /// Returns the number of faces removed.
    pub fn remove_faces(&mut self, indices: &BTreeSet<usize>) -> usize {
        let before = self.faces.len();
        let mut index = 0;
        self.faces.retain(|_| {
            let keep = !indices.contains(&index);
            index += 1;
            keep
        });
        before - self.faces.len()
    }

    /// Drops vertices no face references and renumbers the faces.
    ///
    /// Returns the number of vertices removed.
    pub fn compact(&mut self) -> usize {
        let mut remap = vec![u32::MAX; self.vertices.len()];
        for face in &self.faces {
            for &v in face {
                remap[v as usize] = 0;
            }
        }

        let mut next = 0_u32;
        let mut kept = Vec::with_capacity(self.vertices.len());
        for (slot, vertex) in remap.iter_mut().zip(&self.vertices) {
            if *slot == 0 {
                *slot = next;
                next += 1;
                kept.push(*vertex);
            }
        }
        for face in &mut self.faces {
            *face = face.map(|v| remap[v as usize]);
        }

        let removed = self.vertices.len() - kept.len();
        self.vertices = kept;
        removed
    }
}

/// A calibrated image of the scene.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SceneImage {
    /// Image file name.
    pub name: String,
    /// Camera center in world coordinates.
    pub center: Point3<f64>,
    /// World-to-camera rotation.
    pub rotation: Rotation3<f64>,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Whether the image carries a usable calibration.
    pub valid: bool,
}

impl SceneImage {
    /// Creates a valid image at `center` with identity rotation.
    #[must_use]
    pub fn new(name: impl Into<String>, center: Point3<f64>) -> Self {
        Self {
            name: name.into(),
            center,
            rotation: Rotation3::identity(),
            width: 0,
            height: 0,
            valid: true,
        }
    }

    /// Sets the image size.
    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Sets the camera rotation.
    #[must_use]
    pub const fn with_rotation(mut self, rotation: Rotation3<f64>) -> Self {
        self.rotation = rotation;
        self
    }

    /// Marks the image as lacking a usable calibration.
    #[must_use]
    pub const fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }
}

/// Everything the selection core edits.
#[derive(Debug, Clone, Default)]
pub struct SceneData {
    /// Calibrated images.
    pub images: Vec<SceneImage>,
    /// Point cloud snapshot.
    pub points: Arc<PointCloud>,
    /// Mesh snapshot.
    pub mesh: Arc<Mesh>,
    /// Active region of interest.
    pub roi: Option<Roi>,
}

impl SceneData {
    /// Creates a scene from its parts, without a region of interest.
    #[must_use]
    pub fn new(images: Vec<SceneImage>, points: PointCloud, mesh: Mesh) -> Self {
        Self {
            images,
            points: Arc::new(points),
            mesh: Arc::new(mesh),
            roi: None,
        }
    }

    /// Sets the region of interest.
    #[must_use]
    pub const fn with_roi(mut self, roi: Roi) -> Self {
        self.roi = Some(roi);
        self
    }

    /// Checks that views and faces reference existing images and vertices.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidConfig`] if view lists are present but
    /// not one per point, or [`SceneError::IndexOutOfRange`] for the first
    /// bad reference.
    pub fn validate(&self) -> SceneResult<()> {
        self.mesh.validate()?;
        let points = &self.points;
        if !points.views.is_empty() && points.views.len() != points.points.len() {
            return Err(SceneError::invalid_config(format!(
                "{} view lists for {} points",
                points.views.len(),
                points.points.len()
            )));
        }
        let len = self.images.len();
        for views in &self.points.views {
            if let Some(&v) = views.iter().find(|&&v| v as usize >= len) {
                return Err(SceneError::out_of_range("image", v as usize, len));
            }
        }
        Ok(())
    }

    /// Returns `true` if the scene has no images, points or faces.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.points.is_empty() && self.mesh.is_empty()
    }

    /// Number of images with a usable calibration.
    #[must_use]
    pub fn calibrated_image_count(&self) -> usize {
        self.images.iter().filter(|i| i.valid).count()
    }

    /// Removes points by index. Returns the number removed.
    pub fn remove_points(&mut self, indices: &BTreeSet<usize>) -> usize {
        if indices.is_empty() {
            return 0;
        }
        Arc::make_mut(&mut self.points).remove(indices)
    }

    /// Removes faces by index. Returns the number removed.
    pub fn remove_faces(&mut self, indices: &BTreeSet<usize>) -> usize {
        if indices.is_empty() {
            return 0;
        }
        Arc::make_mut(&mut self.mesh).remove_faces(indices)
    }

    /// Drops points outside `roi` and faces with any vertex outside it.
    ///
    /// Returns the number of points and faces removed.
    pub fn crop(&mut self, roi: &Roi) -> (usize, usize) {
        let outside_points = self.points.points.iter().any(|p| !roi.contains(p));
        let removed_points = if outside_points {
            Arc::make_mut(&mut self.points).retain_indexed(|_, p| roi.contains(p))
        } else {
            0
        };

        let outside_faces: BTreeSet<usize> = self
            .mesh
            .faces
            .iter()
            .enumerate()
            .filter(|(_, face)| {
                face.iter()
                    .any(|&v| !roi.contains(&self.mesh.vertices[v as usize]))
            })
            .map(|(i, _)| i)
            .collect();
        let removed_faces = if outside_faces.is_empty() {
            0
        } else {
            let mesh = Arc::make_mut(&mut self.mesh);
            let removed = mesh.remove_faces(&outside_faces);
            mesh.compact();
            removed
        };

        (removed_points, removed_faces)
    }

    /// Builds a scene restricted to the given images, in the given order.
    ///
    /// Point views are renumbered to the new image list; points left without
    /// any view are dropped. Points without visibility information, the mesh
    /// and the region of interest are kept as they are.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::IndexOutOfRange`] for an unknown image index.
    pub fn sub_scene(&self, image_indices: &[usize]) -> SceneResult<Self> {
        let len = self.images.len();
        let mut remap = vec![None; len];
        let mut images = Vec::with_capacity(image_indices.len());
        for (new_idx, &old_idx) in image_indices.iter().enumerate() {
            let image = self
                .images
                .get(old_idx)
                .ok_or_else(|| SceneError::out_of_range("image", old_idx, len))?;
            remap[old_idx] = u32::try_from(new_idx).ok();
            images.push(image.clone());
        }

        let points = if self.points.has_views() {
            let mut cloud = PointCloud::default();
            for (p, views) in self.points.points.iter().zip(&self.points.views) {
                let kept: ViewList = views
                    .iter()
                    .filter_map(|&v| remap.get(v as usize).copied().flatten())
                    .collect();
                if !kept.is_empty() {
                    cloud.points.push(*p);
                    cloud.views.push(kept);
                }
            }
            cloud
        } else {
            (*self.points).clone()
        };

        debug!(
            images = images.len(),
            points = points.len(),
            dropped_points = self.points.len() - points.len(),
            "Built sub-scene"
        );

        Ok(Self {
            images,
            points: Arc::new(points),
            mesh: Arc::clone(&self.mesh),
            roi: self.roi,
        })
    }

    /// Bounds used to frame the scene when it is opened.
    ///
    /// The region of interest if present; otherwise the union of the point
    /// bounds (points seen by at least `min(3, calibrated images)` views) and
    /// the mesh bounds; otherwise the camera centers enlarged by half a unit
    /// on every side.
    #[must_use]
    pub fn framing_bounds(&self) -> Aabb {
        if let Some(roi) = &self.roi {
            return roi.aabb();
        }

        let mut aabb = Aabb::empty();
        if !self.points.is_empty() {
            let min_views = self.calibrated_image_count().min(3);
            aabb.expand(&self.points.bounds(min_views));
        }
        if !self.mesh.is_empty() {
            aabb.expand(&self.mesh.bounds());
        }
        if aabb.is_valid() {
            return aabb;
        }

        let centers: Vec<_> = self
            .images
            .iter()
            .filter(|i| i.valid)
            .map(|i| i.center)
            .collect();
        Aabb::from_points(&centers).enlarged(0.5)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn line_cloud(n: usize) -> PointCloud {
        let points = (0..n).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        let views = (0..n).map(|i| vec![0, u32::try_from(i % 3).unwrap() + 1]).collect();
        PointCloud::with_views(points, views).unwrap()
    }

    fn quad() -> Mesh {
        Mesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(5.0, 5.0, 5.0),
            ],
            vec![[0, 1, 2], [0, 2, 3], [2, 3, 4]],
        )
    }

    #[test]
    fn test_point_cloud_views_length_checked() {
        assert!(PointCloud::with_views(vec![Point3::origin()], vec![]).is_err());
    }

    #[test]
    fn test_point_remove_keeps_views_aligned() {
        let mut cloud = line_cloud(6);
        let removed = cloud.remove(&[1, 4].into_iter().collect());
        assert_eq!(removed, 2);
        assert_eq!(cloud.len(), 4);
        assert_eq!(cloud.views.len(), 4);
        assert_eq!(cloud.points[1].x, 2.0);
        assert_eq!(cloud.views[1], vec![0, 3]);
    }

    #[test]
    fn test_point_bounds_filter_and_fallback() {
        let cloud = PointCloud::with_views(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0)],
            vec![vec![0, 1, 2], vec![0]],
        )
        .unwrap();
        assert_eq!(cloud.bounds(3).max.x, 0.0);
        // Nothing has 4 views, so every point counts
        assert_eq!(cloud.bounds(4).max.x, 10.0);
        assert!(PointCloud::new(vec![Point3::origin()]).is_confident(0, 5));
    }

    #[test]
    fn test_mesh_remove_and_compact() {
        let mut mesh = quad();
        assert_eq!(mesh.remove_faces(&[2].into_iter().collect()), 1);
        assert_eq!(mesh.compact(), 1);
        assert_eq!(mesh.vertices.len(), 4);
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.bounds().max, Point3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_mesh_validate_catches_bad_index() {
        let mesh = Mesh::new(vec![Point3::origin()], vec![[0, 0, 3]]);
        assert!(matches!(
            mesh.validate(),
            Err(SceneError::IndexOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn test_scene_validate_catches_view_count_mismatch() {
        let images = vec![SceneImage::new("a", Point3::origin())];
        let cloud = PointCloud {
            points: vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            views: vec![vec![0]],
        };
        let scene = SceneData::new(images.clone(), cloud, Mesh::default());
        assert!(matches!(scene.validate(), Err(SceneError::InvalidConfig(_))));

        let scene = SceneData::new(images, PointCloud::new(vec![Point3::origin()]), Mesh::default());
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn test_crop_drops_outside_geometry() {
        let mut scene = SceneData::new(vec![], line_cloud(10), quad());
        let roi = Roi::Aligned(Aabb::new(Point3::new(-0.5, -0.5, -0.5), Point3::new(3.5, 1.5, 0.5)));
        let (points, faces) = scene.crop(&roi);
        assert_eq!(points, 6);
        assert_eq!(faces, 1);
        assert_eq!(scene.points.len(), 4);
        assert_eq!(scene.points.views.len(), 4);
        assert_eq!(scene.mesh.face_count(), 2);
        assert_eq!(scene.mesh.vertices.len(), 4);
    }

    #[test]
    fn test_crop_leaves_snapshot_untouched() {
        let mut scene = SceneData::new(vec![], line_cloud(10), Mesh::default());
        let snapshot = Arc::clone(&scene.points);
        scene.remove_points(&[0].into_iter().collect());
        assert_eq!(snapshot.len(), 10);
        assert_eq!(scene.points.len(), 9);
    }

    #[test]
    fn test_sub_scene_remaps_views() {
        let images: Vec<_> = (0..4)
            .map(|i| SceneImage::new(format!("img{i}"), Point3::new(f64::from(i), 0.0, 0.0)))
            .collect();
        let cloud = PointCloud::with_views(
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)],
            vec![vec![0, 2], vec![1], vec![3, 2]],
        )
        .unwrap();
        let scene = SceneData::new(images, cloud, quad());

        let sub = scene.sub_scene(&[2, 3]).unwrap();
        assert_eq!(sub.images.len(), 2);
        assert_eq!(sub.images[0].name, "img2");
        assert_eq!(sub.points.len(), 2);
        assert_eq!(sub.points.views[0], vec![0]);
        assert_eq!(sub.points.views[1], vec![1, 0]);
        assert_eq!(sub.mesh.face_count(), 3);

        assert!(scene.sub_scene(&[9]).is_err());
    }

    #[test]
    fn test_framing_bounds_fallbacks() {
        let images = vec![
            SceneImage::new("a", Point3::new(0.0, 0.0, 0.0)),
            SceneImage::new("b", Point3::new(2.0, 0.0, 0.0)),
        ];
        let scene = SceneData::new(images, PointCloud::default(), Mesh::default());
        let bounds = scene.framing_bounds();
        assert_relative_eq!(bounds.min.x, -0.5);
        assert_relative_eq!(bounds.max.x, 2.5);

        let scene = scene.with_roi(Roi::Aligned(Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0))));
        assert_relative_eq!(scene.framing_bounds().max.x, 1.0);

        let scene = SceneData::new(vec![], PointCloud::new(vec![Point3::new(7.0, 0.0, 0.0)]), quad());
        let bounds = scene.framing_bounds();
        assert_relative_eq!(bounds.max.x, 7.0);
        assert_relative_eq!(bounds.max.z, 5.0);
    }

    #[test]
    fn test_framing_bounds_single_camera_is_not_degenerate() {
        let images = vec![SceneImage::new("a", Point3::new(1.0, 2.0, 3.0))];
        let scene = SceneData::new(images, PointCloud::default(), Mesh::default());
        let bounds = scene.framing_bounds();
        assert!(bounds.is_valid());
        assert_relative_eq!(bounds.size(), Vector3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(bounds.min, Point3::new(0.5, 1.5, 2.5));
    }
}
