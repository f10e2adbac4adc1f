//! Region of interest: the box that bounds cropping and visualization.
//!
//! A region is fitted to a point list either as a tight axis-aligned box or
//! as an oriented box found by a bounded search over candidate orientations,
//! then enlarged by a safety margin so boundary geometry is not clipped.

// Sample counts are small
#![allow(clippy::cast_precision_loss)]

use nalgebra::{Matrix3, Point3, Rotation3, Unit, Vector3};
use std::f64::consts::FRAC_PI_2;

use crate::bounds::{Aabb, OrientedBox};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An active region of interest.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Roi {
    /// Axis-aligned region.
    Aligned(Aabb),
    /// Oriented region.
    Oriented(OrientedBox),
}

impl Roi {
    /// Checks if a point lies inside the region (boundary included).
    #[must_use]
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        match self {
            Self::Aligned(aabb) => aabb.contains(point),
            Self::Oriented(obb) => obb.contains(point),
        }
    }

    /// Largest full side length of the region.
    #[must_use]
    pub fn max_extent(&self) -> f64 {
        match self {
            Self::Aligned(aabb) => aabb.max_extent(),
            Self::Oriented(obb) => obb.max_extent(),
        }
    }

    /// Grows the region by `margin` on every side.
    #[must_use]
    pub fn enlarged(&self, margin: f64) -> Self {
        match self {
            Self::Aligned(aabb) => Self::Aligned(aabb.enlarged(margin)),
            Self::Oriented(obb) => Self::Oriented(obb.enlarged(margin)),
        }
    }

    /// Enlarges by `fraction` of the largest extent.
    ///
    /// `min_extent` stands in for the largest extent only when the region
    /// is zero-sized, as when it was fitted to a single point.
    #[must_use]
    pub fn with_margin(&self, fraction: f64, min_extent: f64) -> Self {
        let extent = self.max_extent();
        let base = if extent > 0.0 { extent } else { min_extent };
        self.enlarged(base * fraction)
    }

    /// World-space axis-aligned bounds of the region.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        match self {
            Self::Aligned(aabb) => *aabb,
            Self::Oriented(obb) => obb.aabb(),
        }
    }
}

/// How a region is fitted to a point list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoiFit {
    /// Tight axis-aligned box.
    Aligned,
    /// Oriented box searched over `samples` candidate angles per axis.
    Oriented {
        /// Candidate rotations tried around each local axis.
        samples: usize,
    },
}

/// Fits a region to `points` without margin. Returns `None` for no points.
///
/// # Example
///
/// ```
/// use cf_scene_select::{fit_roi, RoiFit};
/// use nalgebra::Point3;
///
/// let points = [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 2.0, 3.0)];
/// let roi = fit_roi(&points, RoiFit::Aligned).unwrap();
/// assert!((roi.max_extent() - 3.0).abs() < 1e-12);
/// ```
#[must_use]
pub fn fit_roi(points: &[Point3<f64>], fit: RoiFit) -> Option<Roi> {
    if points.is_empty() {
        return None;
    }
    Some(match fit {
        RoiFit::Aligned => Roi::Aligned(Aabb::from_points(points)),
        RoiFit::Oriented { samples } => Roi::Oriented(fit_oriented_box(points, samples)),
    })
}

/// Fits an oriented box of small volume to `points`.
///
/// Starts from the better of the world axes and the principal axes, then
/// sweeps `samples` rotations over a quarter turn around each local axis of
/// the current best box, keeping any rotation that lowers the volume (ties
/// broken by surface area). The sweep runs twice, so the cost is bounded by
/// `6 * samples + 2` box evaluations.
#[must_use]
pub fn fit_oriented_box(points: &[Point3<f64>], samples: usize) -> OrientedBox {
    if points.is_empty() {
        return OrientedBox::default();
    }

    let mut best = tight_box(points, Rotation3::identity());
    let pca = tight_box(points, principal_axes(points));
    if better(&pca, &best) {
        best = pca;
    }

    let samples = samples.max(1);
    let step = FRAC_PI_2 / samples as f64;
    for _pass in 0..2 {
        for axis_idx in 0..3 {
            let base = best.rotation;
            let local_axis = match axis_idx {
                0 => Vector3::x(),
                1 => Vector3::y(),
                _ => Vector3::z(),
            };
            let axis = Unit::new_normalize(base * local_axis);
            for k in 1..samples {
                let rotation = Rotation3::from_axis_angle(&axis, step * k as f64) * base;
                let candidate = tight_box(points, rotation);
                if better(&candidate, &best) {
                    best = candidate;
                }
            }
        }
    }
    best
}

fn better(candidate: &OrientedBox, best: &OrientedBox) -> bool {
    let (cv, bv) = (candidate.volume(), best.volume());
    let tol = 1e-9 * bv.max(f64::MIN_POSITIVE);
    if cv < bv - tol {
        return true;
    }
    (cv - bv).abs() <= tol && surface_area(candidate) < surface_area(best) * (1.0 - 1e-9)
}

fn surface_area(obb: &OrientedBox) -> f64 {
    let e = obb.extents();
    2.0 * (e.x * e.y + e.y * e.z + e.z * e.x)
}

fn tight_box(points: &[Point3<f64>], rotation: Rotation3<f64>) -> OrientedBox {
    let mut min = Vector3::repeat(f64::INFINITY);
    let mut max = Vector3::repeat(f64::NEG_INFINITY);
    for p in points {
        let local = rotation.inverse_transform_vector(&p.coords);
        min = min.inf(&local);
        max = max.sup(&local);
    }
    let local_center = (min + max) * 0.5;
    OrientedBox::new(
        Point3::from(rotation * local_center),
        (max - min) * 0.5,
        rotation,
    )
}

fn principal_axes(points: &[Point3<f64>]) -> Rotation3<f64> {
    let n = points.len() as f64;
    let centroid: Vector3<f64> = points.iter().map(|p| p.coords).sum::<Vector3<f64>>() / n;
    let mut cov = Matrix3::zeros();
    for p in points {
        let d = p.coords - centroid;
        cov += d * d.transpose();
    }
    cov /= n;

    let mut axes = cov.symmetric_eigen().eigenvectors;
    // Keep a right-handed frame
    if axes.determinant() < 0.0 {
        let flipped = -axes.column(2).into_owned();
        axes.set_column(2, &flipped);
    }
    Rotation3::from_matrix_unchecked(axes)
}
