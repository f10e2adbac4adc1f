//! Selection-derived queries over scene data.
//!
//! These are the pure halves of the session operations: they read a scene
//! and a selection and compute what the operation should do, leaving the
//! mutation and the notifications to [`Session`](crate::Session).

use hashbrown::HashMap;
use nalgebra::Point3;
use tracing::{debug, info};

use crate::config::ViewerConfig;
use crate::roi::{Roi, RoiFit, fit_roi};
use crate::scene::{PointCloud, SceneData};
use crate::selection::SelectionSet;

/// Positions of the selected points followed by the corners of the
/// selected faces. Out-of-range indices are skipped; shared corners repeat.
#[must_use]
pub fn gather_selected_points(scene: &SceneData, set: &SelectionSet) -> Vec<Point3<f64>> {
    let mut points = Vec::with_capacity(set.points().len() + set.faces().len() * 3);
    points.extend(set.points().iter().filter_map(|&i| scene.points.points.get(i).copied()));
    for &f in set.faces() {
        if let Some(face) = scene.mesh.faces.get(f) {
            points.extend(face.iter().filter_map(|&v| scene.mesh.vertices.get(v as usize).copied()));
        }
    }
    points
}

/// Fits a region to `points` and applies the configured margin.
///
/// `None` when there are no points.
#[must_use]
pub fn fit_selection_roi(points: &[Point3<f64>], use_aabb: bool, config: &ViewerConfig) -> Option<Roi> {
    let fit = if use_aabb {
        RoiFit::Aligned
    } else {
        RoiFit::Oriented {
            samples: config.obb_samples,
        }
    };
    fit_roi(points, fit).map(|roi| roi.with_margin(config.roi_margin, config.roi_min_extent))
}

/// Default region around the whole scene: the mesh bounds, else the bounds
/// of points seen by at least `min_views` images, with the configured margin.
#[must_use]
pub fn scene_box(scene: &SceneData, min_views: usize, config: &ViewerConfig) -> Option<Roi> {
    let aabb = if !scene.mesh.is_empty() {
        scene.mesh.bounds()
    } else if !scene.points.is_empty() {
        scene.points.bounds(min_views)
    } else {
        return None;
    };
    Some(Roi::Aligned(aabb).with_margin(config.roi_margin, config.roi_min_extent))
}

/// Number of `selected` points each image observes.
///
/// Out-of-range point indices are skipped.
#[must_use]
pub fn count_image_observations(
    cloud: &PointCloud,
    selected: impl IntoIterator<Item = usize>,
) -> HashMap<u32, usize> {
    let mut counts = HashMap::new();
    for point in selected {
        for &image in cloud.views_of(point) {
            *counts.entry(image).or_insert(0) += 1;
        }
    }
    counts
}

/// Images observing at least `min_points` of the selected points, ascending.
///
/// `None` when fewer than two images qualify, or when every one of the
/// `image_count` images does and cropping would change nothing.
#[must_use]
pub fn images_for_crop(
    cloud: &PointCloud,
    image_count: usize,
    selected: impl IntoIterator<Item = usize>,
    min_points: usize,
) -> Option<Vec<usize>> {
    let counts = count_image_observations(cloud, selected);
    let mut images: Vec<usize> = counts
        .iter()
        .filter(|&(_, &count)| count >= min_points)
        .map(|(&image, _)| image as usize)
        .collect();
    images.sort_unstable();

    if images.len() < 2 {
        debug!(
            qualifying = images.len(),
            min_points, "Crop to points needs at least two images"
        );
        return None;
    }
    if images.len() == image_count {
        info!(
            images = images.len(),
            min_points, "Every image qualifies; nothing to crop"
        );
        return None;
    }
    info!(
        images = images.len(),
        of = image_count,
        min_points,
        "Cropping scene to qualifying images"
    );
    Some(images)
}

/// Indices of the points observed by `image`.
#[must_use]
pub fn points_seen_by(cloud: &PointCloud, image: u32) -> Vec<usize> {
    cloud
        .views
        .iter()
        .enumerate()
        .filter(|(_, views)| views.contains(&image))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::scene::{Mesh, SceneImage};
    use approx::assert_relative_eq;

    /// 200 points; image 0 sees all, image 1 sees the first 150, image 2
    /// sees the first 100, images 3 and 4 see only the last 10.
    fn observed_cloud() -> PointCloud {
        let points = (0..200).map(|i| Point3::new(f64::from(i), 0.0, 0.0)).collect();
        let views = (0..200)
            .map(|i| {
                let mut v = vec![0];
                if i < 150 {
                    v.push(1);
                }
                if i < 100 {
                    v.push(2);
                }
                if i >= 190 {
                    v.extend([3, 4]);
                }
                v
            })
            .collect();
        PointCloud::with_views(points, views).unwrap()
    }

    #[test]
    fn test_count_image_observations() {
        let counts = count_image_observations(&observed_cloud(), 0..200);
        assert_eq!(counts[&0], 200);
        assert_eq!(counts[&1], 150);
        assert_eq!(counts[&2], 100);
        assert_eq!(counts[&3], 10);
        // Out of range is skipped
        assert!(count_image_observations(&observed_cloud(), [999]).is_empty());
    }

    #[test]
    fn test_images_for_crop_threshold() {
        let cloud = observed_cloud();
        assert_eq!(images_for_crop(&cloud, 5, 0..200, 150), Some(vec![0, 1]));
        assert_eq!(images_for_crop(&cloud, 5, 0..200, 151), None);
        assert_eq!(images_for_crop(&cloud, 5, 0..200, 10), None);
        assert_eq!(images_for_crop(&cloud, 5, 0..200, 100), Some(vec![0, 1, 2]));
    }

    #[test]
    fn test_points_seen_by() {
        let cloud = observed_cloud();
        assert_eq!(points_seen_by(&cloud, 3), (190..200).collect::<Vec<_>>());
        assert!(points_seen_by(&cloud, 9).is_empty());
    }

    #[test]
    fn test_gather_and_fit() {
        let mesh = Mesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(10.0, 0.0, 0.0),
                Point3::new(0.0, 5.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        let scene = SceneData::new(vec![SceneImage::new("a", Point3::origin())], observed_cloud(), mesh);
        let mut set = SelectionSet::new();
        set.select_points([3, 500]);
        set.select_faces([0, 7]);

        let points = gather_selected_points(&scene, &set);
        assert_eq!(points.len(), 4);

        let config = ViewerConfig::default();
        let roi = fit_selection_roi(&points, true, &config).unwrap();
        let aabb = roi.aabb();
        assert_relative_eq!(aabb.min.x, -0.3);
        assert_relative_eq!(aabb.max.x, 10.3);
        assert_relative_eq!(aabb.max.y, 5.3);

        assert!(fit_selection_roi(&[], true, &config).is_none());
        assert!(matches!(fit_selection_roi(&points, false, &config), Some(Roi::Oriented(_))));
    }

    #[test]
    fn test_scene_box_prefers_mesh() {
        let mesh = Mesh::new(
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
            vec![[0, 1, 2]],
        );
        let config = ViewerConfig::default();
        let scene = SceneData::new(vec![], observed_cloud(), mesh);
        assert_relative_eq!(scene_box(&scene, 1, &config).unwrap().aabb().max.x, 1.03);

        let cloud = PointCloud::with_views(
            vec![Point3::origin(), Point3::new(10.0, 0.0, 0.0), Point3::new(50.0, 0.0, 0.0)],
            vec![vec![0, 1], vec![0, 1], vec![0]],
        )
        .unwrap();
        let scene = SceneData::new(vec![], cloud, Mesh::default());
        // The far point has a single view
        assert_relative_eq!(scene_box(&scene, 2, &config).unwrap().aabb().max.x, 10.3);

        assert!(scene_box(&SceneData::default(), 1, &config).is_none());
    }
}
