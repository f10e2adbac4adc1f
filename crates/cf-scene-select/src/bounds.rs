//! Axis-aligned and oriented bounding boxes.
//!
//! # Example
//!
//! ```
//! use cf_scene_select::{Aabb, OrientedBox};
//! use nalgebra::Point3;
//!
//! let aabb = Aabb::from_points(&[Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0)]);
//! assert!(aabb.contains(&Point3::new(1.0, 0.5, 0.5)));
//!
//! let obb = OrientedBox::from_aabb(&aabb);
//! assert!((obb.volume() - 2.0).abs() < 1e-10);
//! ```

use nalgebra::{Point3, Rotation3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in world coordinates.
///
/// [`Aabb::empty`] is inverted (min > max) so that expanding it by the first
/// point yields a zero-sized box at that point.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3<f64>,
    /// Maximum corner of the bounding box.
    pub max: Point3<f64>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Creates a new AABB from two corners given in any order.
    #[must_use]
    pub fn new(a: Point3<f64>, b: Point3<f64>) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Creates an empty (inverted) bounding box.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    /// Creates the tight bounding box of a point set.
    ///
    /// Returns an empty box for an empty slice.
    #[must_use]
    pub fn from_points(points: &[Point3<f64>]) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.expand_point(p);
        }
        aabb
    }

    /// Creates a bounding box from a triangle.
    #[must_use]
    pub fn from_triangle(v0: &Point3<f64>, v1: &Point3<f64>, v2: &Point3<f64>) -> Self {
        Self {
            min: Point3::new(
                v0.x.min(v1.x).min(v2.x),
                v0.y.min(v1.y).min(v2.y),
                v0.z.min(v1.z).min(v2.z),
            ),
            max: Point3::new(
                v0.x.max(v1.x).max(v2.x),
                v0.y.max(v1.y).max(v2.y),
                v0.z.max(v1.z).max(v2.z),
            ),
        }
    }

    /// Checks if this bounding box is valid (non-empty).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Returns the center point of the AABB.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Returns the full size of the AABB along each axis.
    #[must_use]
    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Returns the half-extents of the AABB.
    #[must_use]
    pub fn half_extents(&self) -> Vector3<f64> {
        self.size() * 0.5
    }

    /// Returns the largest of the three side lengths.
    #[must_use]
    pub fn max_extent(&self) -> f64 {
        self.size().max()
    }

    /// Length of the box diagonal, zero for an empty box.
    #[must_use]
    pub fn diagonal(&self) -> f64 {
        if self.is_valid() { self.size().norm() } else { 0.0 }
    }

    /// Checks if a point is inside the AABB. Boundary points are inside.
    #[must_use]
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Expands this AABB to include a point.
    pub fn expand_point(&mut self, point: &Point3<f64>) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.min.z = self.min.z.min(point.z);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
        self.max.z = self.max.z.max(point.z);
    }

    /// Expands this AABB to include another.
    pub fn expand(&mut self, other: &Self) {
        if other.is_valid() {
            self.expand_point(&other.min);
            self.expand_point(&other.max);
        }
    }

    /// Grows the box by `margin` on every side.
    #[must_use]
    pub fn enlarged(&self, margin: f64) -> Self {
        let m = Vector3::repeat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }
}

/// An oriented bounding box.
///
/// `rotation` maps box-local axes to world axes; a world point `p` is inside
/// when `rotation⁻¹ (p - center)` lies within `±half_extents`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrientedBox {
    /// Center of the box.
    pub center: Point3<f64>,
    /// Half-extents along each local axis.
    pub half_extents: Vector3<f64>,
    /// Local-to-world rotation.
    pub rotation: Rotation3<f64>,
}

impl Default for OrientedBox {
    fn default() -> Self {
        Self {
            center: Point3::origin(),
            half_extents: Vector3::zeros(),
            rotation: Rotation3::identity(),
        }
    }
}

impl OrientedBox {
    /// Creates an oriented box from its parts.
    #[must_use]
    pub const fn new(center: Point3<f64>, half_extents: Vector3<f64>, rotation: Rotation3<f64>) -> Self {
        Self {
            center,
            half_extents,
            rotation,
        }
    }

    /// Creates an identity-oriented box covering `aabb`.
    #[must_use]
    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self {
            center: aabb.center(),
            half_extents: aabb.half_extents(),
            rotation: Rotation3::identity(),
        }
    }

    /// Full extents (2 * `half_extents`).
    #[must_use]
    pub fn extents(&self) -> Vector3<f64> {
        self.half_extents * 2.0
    }

    /// Largest full side length.
    #[must_use]
    pub fn max_extent(&self) -> f64 {
        self.extents().max()
    }

    /// Box volume.
    #[must_use]
    pub fn volume(&self) -> f64 {
        let e = self.extents();
        e.x * e.y * e.z
    }

    /// Checks if a point is inside the box. Boundary points are inside.
    #[must_use]
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        let local = self.rotation.inverse_transform_vector(&(point - self.center));
        local.x.abs() <= self.half_extents.x
            && local.y.abs() <= self.half_extents.y
            && local.z.abs() <= self.half_extents.z
    }

    /// Grows the box by `margin` on every side.
    #[must_use]
    pub fn enlarged(&self, margin: f64) -> Self {
        Self {
            half_extents: self.half_extents.add_scalar(margin),
            ..*self
        }
    }

    /// The eight corners in world space.
    #[must_use]
    pub fn corners(&self) -> [Point3<f64>; 8] {
        let h = self.half_extents;
        [
            Vector3::new(-h.x, -h.y, -h.z),
            Vector3::new(h.x, -h.y, -h.z),
            Vector3::new(h.x, h.y, -h.z),
            Vector3::new(-h.x, h.y, -h.z),
            Vector3::new(-h.x, -h.y, h.z),
            Vector3::new(h.x, -h.y, h.z),
            Vector3::new(h.x, h.y, h.z),
            Vector3::new(-h.x, h.y, h.z),
        ]
        .map(|c| self.center + self.rotation * c)
    }

    /// World-space axis-aligned box enclosing this oriented box.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&self.corners())
    }
}
