//! Face and point indices, and the live slots the pick resolver reads.
//!
//! An index is a read-only snapshot: it owns an [`Arc`] of the geometry it
//! was built from and is never mutated. When geometry changes a new index is
//! built on the worker and swapped into an [`IndexSlot`] as a whole.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use nalgebra::Point3;
use tracing::debug;

use crate::bounds::Aabb;
use crate::config::ViewerConfig;
use crate::octree::{Octree, OctreeItem, OctreeStats, Pick};
use crate::ray::{Ray, ray_sphere_hit, ray_triangle_intersect};
use crate::scene::{Mesh, PointCloud};

/// Tolerance for ray-triangle tests.
pub const RAY_EPSILON: f64 = 1e-12;

/// Pick radius relative to the point cloud's bounding-box diagonal.
pub const POINT_RADIUS_FRACTION: f64 = 1e-3;

/// Octree over the faces of a mesh snapshot.
#[derive(Debug)]
pub struct FaceOctree {
    mesh: Arc<Mesh>,
    tree: Octree,
}

impl FaceOctree {
    /// Builds the index over `mesh`, routing faces by centroid.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use cf_scene_select::{FaceOctree, Mesh, Ray, ViewerConfig};
    /// use nalgebra::{Point3, Vector3};
    ///
    /// let mesh = Mesh::new(
    ///     vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
    ///     vec![[0, 1, 2]],
    /// );
    /// let index = FaceOctree::build(Arc::new(mesh), &ViewerConfig::default());
    /// let ray = Ray::new(Point3::new(0.2, 0.2, 3.0), -Vector3::z());
    /// let pick = index.nearest_hit(&ray).unwrap();
    /// assert_eq!(pick.index, 0);
    /// assert!((pick.distance - 3.0).abs() < 1e-12);
    /// ```
    #[must_use]
    pub fn build(mesh: Arc<Mesh>, config: &ViewerConfig) -> Self {
        let items: Vec<OctreeItem> = (0..mesh.face_count())
            .map(|i| {
                let [a, b, c] = mesh.triangle(i);
                OctreeItem {
                    bbox: Aabb::from_triangle(&a, &b, &c),
                    anchor: Point3::from((a.coords + b.coords + c.coords) / 3.0),
                }
            })
            .collect();
        let tree = Octree::build(&items, config.face_split_threshold, config.max_octree_depth);

        let stats = tree.stats();
        debug!(
            faces = items.len(),
            leaves = stats.leaf_count,
            depth = stats.max_depth,
            "Built face octree"
        );
        Self { mesh, tree }
    }

    /// Closest face hit by `ray`, by parametric distance.
    #[must_use]
    pub fn nearest_hit(&self, ray: &Ray) -> Option<Pick> {
        self.tree.nearest(ray, |i| {
            let [a, b, c] = self.mesh.triangle(i);
            ray_triangle_intersect(ray, &a, &b, &c, RAY_EPSILON)
        })
    }

    /// The mesh snapshot this index was built from.
    #[must_use]
    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    /// Returns `true` if no faces are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Tree statistics.
    #[must_use]
    pub fn stats(&self) -> OctreeStats {
        self.tree.stats()
    }
}

/// Octree over the points of a point-cloud snapshot.
///
/// Each point is treated as a sphere of [`PointOctree::radius`]; its hit
/// distance is the projection of the point on the ray.
#[derive(Debug)]
pub struct PointOctree {
    cloud: Arc<PointCloud>,
    tree: Octree,
    radius: f64,
}

impl PointOctree {
    /// Builds the index over `cloud`.
    ///
    /// The pick radius is `config.point_pick_radius`, or a thousandth of the
    /// cloud's bounding-box diagonal when unset.
    #[must_use]
    pub fn build(cloud: Arc<PointCloud>, config: &ViewerConfig) -> Self {
        let radius = config.point_pick_radius.unwrap_or_else(|| {
            let diagonal = Aabb::from_points(&cloud.points).diagonal();
            (diagonal * POINT_RADIUS_FRACTION).max(f64::EPSILON)
        });

        let items: Vec<OctreeItem> = cloud
            .points
            .iter()
            .map(|p| OctreeItem {
                bbox: Aabb::new(*p, *p).enlarged(radius),
                anchor: *p,
            })
            .collect();
        let tree = Octree::build(&items, config.point_split_threshold, config.max_octree_depth);

        let stats = tree.stats();
        debug!(
            points = items.len(),
            radius,
            leaves = stats.leaf_count,
            depth = stats.max_depth,
            "Built point octree"
        );
        Self { cloud, tree, radius }
    }

    /// Closest point within the pick radius of `ray`, among points seen by at
    /// least `min_views` images. Points of a cloud without visibility
    /// information always qualify.
    #[must_use]
    pub fn nearest_hit(&self, ray: &Ray, min_views: usize) -> Option<Pick> {
        self.tree.nearest(ray, |i| {
            if !self.cloud.is_confident(i, min_views) {
                return None;
            }
            ray_sphere_hit(ray, &self.cloud.points[i], self.radius)
        })
    }

    /// The point-cloud snapshot this index was built from.
    #[must_use]
    pub fn cloud(&self) -> &Arc<PointCloud> {
        &self.cloud
    }

    /// Pick radius used for every point.
    #[must_use]
    pub const fn radius(&self) -> f64 {
        self.radius
    }

    /// Returns `true` if no points are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Tree statistics.
    #[must_use]
    pub fn stats(&self) -> OctreeStats {
        self.tree.stats()
    }
}

/// Holder of the live index, replaced as a whole.
///
/// Readers clone the inner [`Arc`] and release the lock immediately, so a
/// query never holds the slot while it runs and always sees either the
/// previous complete index or the new one.
#[derive(Debug)]
pub struct IndexSlot<T> {
    live: RwLock<Option<Arc<T>>>,
}

impl<T> Default for IndexSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IndexSlot<T> {
    /// Creates an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            live: RwLock::new(None),
        }
    }

    /// The live index, if one is installed.
    #[must_use]
    pub fn get(&self) -> Option<Arc<T>> {
        self.live.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns `true` if an index is installed.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.live.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Replaces the live index.
    pub fn install(&self, index: Arc<T>) {
        *self.live.write().unwrap_or_else(PoisonError::into_inner) = Some(index);
    }

    /// Installs `index` only if `generation` still equals `built_for`.
    ///
    /// The comparison happens under the write lock. Writers that bump the
    /// generation and then call [`IndexSlot::clear`] therefore never see a
    /// stale index survive. Returns whether the index was installed.
    pub fn install_if_current(&self, index: Arc<T>, generation: &AtomicU64, built_for: u64) -> bool {
        let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
        if generation.load(Ordering::Acquire) != built_for {
            return false;
        }
        *live = Some(index);
        true
    }

    /// Drops the live index.
    pub fn clear(&self) {
        *self.live.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
