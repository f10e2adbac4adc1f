//! Rays and the primitive intersection tests used by picking.
//!
//! All distances returned here are parametric: the hit point is
//! `origin + t * direction`. Callers that want world-space distances should
//! normalize the ray first (see [`Ray::normalized`]).

// Standard notation for Möller–Trumbore.
#![allow(clippy::many_single_char_names)]

use nalgebra::{Point3, Vector3};

use crate::bounds::Aabb;

/// A ray defined by an origin point and a direction vector.
///
/// The direction does not need to be normalized, but must be non-zero.
///
/// # Example
///
/// ```
/// use cf_scene_select::Ray;
/// use nalgebra::{Point3, Vector3};
///
/// let ray = Ray::new(Point3::origin(), Vector3::new(2.0, 0.0, 0.0));
/// let p = ray.point_at(3.0);
/// assert!((p.x - 6.0).abs() < 1e-10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// The origin of the ray.
    pub origin: Point3<f64>,
    /// The direction of the ray (not necessarily normalized).
    pub direction: Vector3<f64>,
}

impl Ray {
    /// Creates a new ray with the given origin and direction.
    #[must_use]
    pub const fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self { origin, direction }
    }

    /// Returns the point along the ray at parameter `t`.
    #[must_use]
    pub fn point_at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction * t
    }

    /// Returns a normalized version of this ray.
    ///
    /// If the direction is zero, returns the ray unchanged.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let norm = self.direction.norm();
        if norm < f64::EPSILON {
            return *self;
        }
        Self {
            origin: self.origin,
            direction: self.direction / norm,
        }
    }

    /// Returns `1 / direction` per axis, for slab tests.
    ///
    /// Zero components become `±∞`, which the slab test handles.
    #[must_use]
    pub fn inverse_direction(&self) -> Vector3<f64> {
        Vector3::new(
            1.0 / self.direction.x,
            1.0 / self.direction.y,
            1.0 / self.direction.z,
        )
    }

    /// Parameter of the point on the ray closest to `point` (may be negative).
    #[must_use]
    pub fn project(&self, point: &Point3<f64>) -> f64 {
        let len_sq = self.direction.norm_squared();
        if len_sq < f64::EPSILON {
            return 0.0;
        }
        (point - self.origin).dot(&self.direction) / len_sq
    }

    /// Squared distance from `point` to the infinite line carrying this ray.
    #[must_use]
    pub fn distance_squared_to_line(&self, point: &Point3<f64>) -> f64 {
        let t = self.project(point);
        (point - self.point_at(t)).norm_squared()
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self::new(Point3::origin(), Vector3::x())
    }
}

/// Ray-triangle intersection using the Möller–Trumbore algorithm.
///
/// Returns `Some(t)` for hits in front of the origin (`t > epsilon`).
/// Both triangle windings are accepted.
#[must_use]
pub fn ray_triangle_intersect(
    ray: &Ray,
    v0: &Point3<f64>,
    v1: &Point3<f64>,
    v2: &Point3<f64>,
    epsilon: f64,
) -> Option<f64> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = ray.direction.cross(&edge2);
    let a = edge1.dot(&h);

    // Ray is parallel to triangle
    if a.abs() < epsilon {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * ray.direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(&q);
    if t > epsilon { Some(t) } else { None }
}

/// Ray-AABB slab test returning the entry parameter.
///
/// `dir_inv` must be [`Ray::inverse_direction`] of `ray`. Returns the entry
/// parameter clamped to zero when the origin is inside the box, or `None`
/// when the box is missed, lies behind the origin, or is entered beyond
/// `max_t`.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn ray_aabb_entry(ray: &Ray, dir_inv: &Vector3<f64>, aabb: &Aabb, max_t: f64) -> Option<f64> {
    let mut tmin = f64::NEG_INFINITY;
    let mut tmax = f64::INFINITY;

    for axis in 0..3 {
        let origin = ray.origin[axis];
        // Parallel to this slab: inside or never
        if ray.direction[axis] == 0.0 {
            if origin < aabb.min[axis] || origin > aabb.max[axis] {
                return None;
            }
            continue;
        }
        let t1 = (aabb.min[axis] - origin) * dir_inv[axis];
        let t2 = (aabb.max[axis] - origin) * dir_inv[axis];
        tmin = tmin.max(t1.min(t2));
        tmax = tmax.min(t1.max(t2));
    }

    if tmax >= tmin && tmax >= 0.0 && tmin <= max_t {
        Some(tmin.max(0.0))
    } else {
        None
    }
}

/// Ray-sphere test returning the parameter of the closest approach.
///
/// A point counts as hit when its distance to the ray line is at most
/// `radius` and it lies in front of the origin. The returned parameter is
/// the projection of the center on the ray, so equally deep targets compare
/// equal regardless of their radius.
#[must_use]
pub fn ray_sphere_hit(ray: &Ray, center: &Point3<f64>, radius: f64) -> Option<f64> {
    let t = ray.project(center);
    if t < 0.0 {
        return None;
    }
    if (center - ray.point_at(t)).norm_squared() <= radius * radius {
        Some(t)
    } else {
        None
    }
}

/// A circular cone with its apex at a ray origin, opening along the ray.
///
/// Used to pick camera centers, which have no extent of their own: a camera
/// is hit when it lies inside the cone, and its distance is measured along
/// the cone axis.
#[derive(Debug, Clone, Copy)]
pub struct Cone {
    apex: Point3<f64>,
    axis: Vector3<f64>,
    cos_half_angle: f64,
}

impl Cone {
    /// Creates a cone around `ray` with the given half-angle in radians.
    #[must_use]
    pub fn new(ray: &Ray, half_angle: f64) -> Self {
        let ray = ray.normalized();
        Self {
            apex: ray.origin,
            axis: ray.direction,
            cos_half_angle: half_angle.cos(),
        }
    }

    /// Returns the axial distance of `point` if it lies inside the cone.
    #[must_use]
    pub fn classify(&self, point: &Point3<f64>) -> Option<f64> {
        let offset = point - self.apex;
        let axial = offset.dot(&self.axis);
        if axial <= 0.0 {
            return None;
        }
        let norm = offset.norm();
        if axial >= norm * self.cos_half_angle {
            Some(axial)
        } else {
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_triangle() -> [Point3<f64>; 3] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_ray_point_at_and_normalized() {
        let ray = Ray::new(Point3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 4.0));
        let n = ray.normalized();
        assert_relative_eq!(n.direction.norm(), 1.0);
        assert_relative_eq!(n.point_at(2.0).z, 2.0);
        assert_relative_eq!(ray.point_at(2.0).z, 8.0);
    }

    #[test]
    fn test_ray_project() {
        let ray = Ray::new(Point3::origin(), Vector3::x());
        assert_relative_eq!(ray.project(&Point3::new(3.0, 5.0, 0.0)), 3.0);
        assert_relative_eq!(ray.distance_squared_to_line(&Point3::new(3.0, 2.0, 0.0)), 4.0);
    }

    #[test]
    fn test_triangle_hit_both_windings() {
        let [a, b, c] = unit_triangle();
        let ray = Ray::new(Point3::new(0.2, 0.2, 5.0), -Vector3::z());
        let t = ray_triangle_intersect(&ray, &a, &b, &c, 1e-12).unwrap();
        assert_relative_eq!(t, 5.0);
        let t = ray_triangle_intersect(&ray, &a, &c, &b, 1e-12).unwrap();
        assert_relative_eq!(t, 5.0);
    }

    #[test]
    fn test_triangle_miss_and_behind() {
        let [a, b, c] = unit_triangle();
        let outside = Ray::new(Point3::new(0.8, 0.8, 5.0), -Vector3::z());
        assert!(ray_triangle_intersect(&outside, &a, &b, &c, 1e-12).is_none());

        let behind = Ray::new(Point3::new(0.2, 0.2, 5.0), Vector3::z());
        assert!(ray_triangle_intersect(&behind, &a, &b, &c, 1e-12).is_none());

        let parallel = Ray::new(Point3::new(0.2, 0.2, 0.0), Vector3::x());
        assert!(ray_triangle_intersect(&parallel, &a, &b, &c, 1e-12).is_none());
    }

    #[test]
    fn test_aabb_entry() {
        let aabb = Aabb::new(Point3::new(1.0, -1.0, -1.0), Point3::new(2.0, 1.0, 1.0));
        let ray = Ray::new(Point3::origin(), Vector3::x());
        let inv = ray.inverse_direction();
        assert_relative_eq!(ray_aabb_entry(&ray, &inv, &aabb, f64::INFINITY).unwrap(), 1.0);
        assert!(ray_aabb_entry(&ray, &inv, &aabb, 0.5).is_none());

        let away = Ray::new(Point3::origin(), -Vector3::x());
        assert!(ray_aabb_entry(&away, &away.inverse_direction(), &aabb, f64::INFINITY).is_none());

        let inside = Ray::new(Point3::new(1.5, 0.0, 0.0), Vector3::y());
        let t = ray_aabb_entry(&inside, &inside.inverse_direction(), &aabb, f64::INFINITY);
        assert_eq!(t, Some(0.0));

        // Origin on a face of the box, travelling parallel to it
        let grazing = Ray::new(Point3::new(1.0, 0.0, -5.0), Vector3::z());
        let t = ray_aabb_entry(&grazing, &grazing.inverse_direction(), &aabb, f64::INFINITY);
        assert_eq!(t, Some(4.0));
    }

    #[test]
    fn test_sphere_hit_uses_projection() {
        let ray = Ray::new(Point3::origin(), Vector3::z());
        let t = ray_sphere_hit(&ray, &Point3::new(0.05, 0.0, 3.0), 0.1).unwrap();
        assert_relative_eq!(t, 3.0);
        assert!(ray_sphere_hit(&ray, &Point3::new(0.5, 0.0, 3.0), 0.1).is_none());
        assert!(ray_sphere_hit(&ray, &Point3::new(0.0, 0.0, -3.0), 0.1).is_none());
    }

    #[test]
    fn test_cone_classify() {
        let ray = Ray::new(Point3::origin(), Vector3::new(0.0, 0.0, 2.0));
        let cone = Cone::new(&ray, 0.5_f64.to_radians());

        assert_relative_eq!(cone.classify(&Point3::new(0.0, 0.0, 10.0)).unwrap(), 10.0);
        // tan(0.5 deg) * 10 ~= 0.0873
        assert!(cone.classify(&Point3::new(0.08, 0.0, 10.0)).is_some());
        assert!(cone.classify(&Point3::new(0.1, 0.0, 10.0)).is_none());
        assert!(cone.classify(&Point3::new(0.0, 0.0, -10.0)).is_none());
    }
}
