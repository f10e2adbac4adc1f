//! Octree over items with bounding boxes, answering nearest ray hits.
//!
//! Items are routed to octants by an anchor point (a face centroid or the
//! point itself), while every node stores the tight union of its items'
//! bounds. Pruning against those bounds is therefore exact: an item can only
//! be hit inside its own box, so a node entered beyond the best hit so far
//! cannot hold a closer one.

use nalgebra::{Point3, Vector3};

use crate::bounds::Aabb;
use crate::ray::{Ray, ray_aabb_entry};

/// The nearest item hit by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pick {
    /// Index of the item in its source collection.
    pub index: usize,
    /// Parametric distance along the query ray.
    pub distance: f64,
}

impl Pick {
    /// Orders hits by distance, then by index, so results are deterministic.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_closer_than(&self, other: &Self) -> bool {
        self.distance < other.distance || (self.distance == other.distance && self.index < other.index)
    }
}

/// Octree node holding either item indices or up to eight children.
#[derive(Debug)]
pub enum OctreeNode {
    /// Leaf node.
    Leaf {
        /// Tight bounds of the items in this leaf.
        bbox: Aabb,
        /// Item indices.
        items: Vec<u32>,
    },
    /// Internal node; empty octants are omitted.
    Internal {
        /// Tight bounds of every item in this subtree.
        bbox: Aabb,
        /// Non-empty children.
        children: Vec<Self>,
    },
}

impl OctreeNode {
    /// Bounding box of this node.
    #[must_use]
    pub fn bbox(&self) -> &Aabb {
        match self {
            Self::Leaf { bbox, .. } | Self::Internal { bbox, .. } => bbox,
        }
    }
}

/// An item to be indexed: its bounds and the anchor used to place it.
#[derive(Debug, Clone, Copy)]
pub struct OctreeItem {
    /// Bounds of the item.
    pub bbox: Aabb,
    /// Point deciding the octant the item is routed to.
    pub anchor: Point3<f64>,
}

/// Hierarchical spatial partition over a fixed item list.
#[derive(Debug)]
pub struct Octree {
    root: Option<OctreeNode>,
    item_count: usize,
}

impl Octree {
    /// Builds the tree. A node splits into octants while it holds more than
    /// `split_threshold` items and is shallower than `max_depth`.
    #[must_use]
    pub fn build(items: &[OctreeItem], split_threshold: usize, max_depth: usize) -> Self {
        if items.is_empty() {
            return Self {
                root: None,
                item_count: 0,
            };
        }

        let mut anchors = Aabb::empty();
        for item in items {
            anchors.expand_point(&item.anchor);
        }
        // Cubic root cell so every octant is a cube too
        let half = Vector3::repeat(anchors.max_extent() * 0.5);
        let center = anchors.center();
        let cell = Aabb::new(center - half, center + half);

        let indices = (0..items.len()).filter_map(|i| u32::try_from(i).ok()).collect();
        let root = Self::build_recursive(items, indices, &cell, 0, split_threshold.max(1), max_depth);

        Self {
            root: Some(root),
            item_count: items.len(),
        }
    }

    fn build_recursive(
        items: &[OctreeItem],
        indices: Vec<u32>,
        cell: &Aabb,
        depth: usize,
        split_threshold: usize,
        max_depth: usize,
    ) -> OctreeNode {
        let mut bbox = Aabb::empty();
        for &i in &indices {
            bbox.expand(&items[i as usize].bbox);
        }

        if indices.len() <= split_threshold || depth >= max_depth {
            return OctreeNode::Leaf { bbox, items: indices };
        }

        let mid = cell.center();
        let mut buckets: [Vec<u32>; 8] = Default::default();
        for i in indices {
            let a = items[i as usize].anchor;
            buckets[octant(&a, &mid)].push(i);
        }

        let children = buckets
            .into_iter()
            .enumerate()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(octant, bucket)| {
                let child_cell = child_cell(cell, &mid, octant);
                Self::build_recursive(items, bucket, &child_cell, depth + 1, split_threshold, max_depth)
            })
            .collect();

        OctreeNode::Internal { bbox, children }
    }

    /// Returns the nearest item accepted by `test`.
    ///
    /// `test` returns the item's hit distance along `ray`, or `None` on a
    /// miss. Hit distances must lie inside the item's bounds for pruning to
    /// be exact. Equal distances resolve to the lowest index.
    pub fn nearest(&self, ray: &Ray, mut test: impl FnMut(usize) -> Option<f64>) -> Option<Pick> {
        let root = self.root.as_ref()?;
        let inv = ray.inverse_direction();
        let mut best = None;
        Self::nearest_recursive(root, ray, &inv, &mut test, &mut best);
        best
    }

    fn nearest_recursive(
        node: &OctreeNode,
        ray: &Ray,
        inv: &Vector3<f64>,
        test: &mut dyn FnMut(usize) -> Option<f64>,
        best: &mut Option<Pick>,
    ) {
        let max_t = best.map_or(f64::INFINITY, |b| b.distance);
        if ray_aabb_entry(ray, inv, node.bbox(), max_t).is_none() {
            return;
        }

        match node {
            OctreeNode::Leaf { items, .. } => {
                for &i in items {
                    let index = i as usize;
                    if let Some(distance) = test(index) {
                        let candidate = Pick { index, distance };
                        if best.is_none_or(|b| candidate.is_closer_than(&b)) {
                            *best = Some(candidate);
                        }
                    }
                }
            }
            OctreeNode::Internal { children, .. } => {
                let mut order: Vec<(f64, &OctreeNode)> = children
                    .iter()
                    .filter_map(|c| ray_aabb_entry(ray, inv, c.bbox(), max_t).map(|t| (t, c)))
                    .collect();
                order.sort_by(|a, b| a.0.total_cmp(&b.0));

                for (entry, child) in order {
                    if best.is_some_and(|b| entry > b.distance) {
                        break;
                    }
                    Self::nearest_recursive(child, ray, inv, test, best);
                }
            }
        }
    }

    /// Number of indexed items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Returns `true` if the tree holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Bounds of all items.
    #[must_use]
    pub fn root_bbox(&self) -> Option<&Aabb> {
        self.root.as_ref().map(OctreeNode::bbox)
    }

    /// Statistics about the tree structure.
    #[must_use]
    pub fn stats(&self) -> OctreeStats {
        let mut stats = OctreeStats::default();
        if let Some(ref root) = self.root {
            Self::collect_stats(root, 0, &mut stats);
        }
        stats
    }

    fn collect_stats(node: &OctreeNode, depth: usize, stats: &mut OctreeStats) {
        stats.max_depth = stats.max_depth.max(depth);
        match node {
            OctreeNode::Leaf { items, .. } => {
                stats.leaf_count += 1;
                stats.total_items_in_leaves += items.len();
                stats.max_leaf_size = stats.max_leaf_size.max(items.len());
            }
            OctreeNode::Internal { children, .. } => {
                stats.internal_count += 1;
                for child in children {
                    Self::collect_stats(child, depth + 1, stats);
                }
            }
        }
    }
}

/// Statistics about octree structure.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OctreeStats {
    /// Number of internal nodes.
    pub internal_count: usize,
    /// Number of leaf nodes.
    pub leaf_count: usize,
    /// Maximum depth of the tree.
    pub max_depth: usize,
    /// Maximum number of items in any leaf.
    pub max_leaf_size: usize,
    /// Total items stored across all leaves.
    pub total_items_in_leaves: usize,
}

fn octant(p: &Point3<f64>, mid: &Point3<f64>) -> usize {
    usize::from(p.x >= mid.x) | (usize::from(p.y >= mid.y) << 1) | (usize::from(p.z >= mid.z) << 2)
}

fn child_cell(cell: &Aabb, mid: &Point3<f64>, octant: usize) -> Aabb {
    let pick = |bit: usize, lo: f64, m: f64, hi: f64| {
        if octant & bit == 0 { (lo, m) } else { (m, hi) }
    };
    let (x0, x1) = pick(1, cell.min.x, mid.x, cell.max.x);
    let (y0, y1) = pick(2, cell.min.y, mid.y, cell.max.y);
    let (z0, z1) = pick(4, cell.min.z, mid.z, cell.max.z);
    Aabb::new(Point3::new(x0, y0, z0), Point3::new(x1, y1, z1))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use crate::ray::ray_sphere_hit;

    fn point_items(points: &[Point3<f64>], radius: f64) -> Vec<OctreeItem> {
        points
            .iter()
            .map(|p| OctreeItem {
                bbox: Aabb::new(*p, *p).enlarged(radius),
                anchor: *p,
            })
            .collect()
    }

    fn grid(n: usize) -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    points.push(Point3::new(x as f64, y as f64, z as f64));
                }
            }
        }
        points
    }

    #[test]
    fn test_empty_tree() {
        let tree = Octree::build(&[], 8, 8);
        assert!(tree.is_empty());
        assert!(tree.root_bbox().is_none());
        assert!(tree.nearest(&Ray::default(), |_| Some(1.0)).is_none());
    }

    #[test]
    fn test_split_respects_threshold() {
        let points = grid(10);
        let tree = Octree::build(&point_items(&points, 0.1), 16, 12);
        let stats = tree.stats();
        assert_eq!(stats.total_items_in_leaves, 1000);
        assert!(stats.max_leaf_size <= 16);
        assert!(stats.internal_count > 0);

        let single = Octree::build(&point_items(&points, 0.1), 1000, 12).stats();
        assert_eq!(single.leaf_count, 1);
        assert_eq!(single.internal_count, 0);
    }

    #[test]
    fn test_depth_limit_on_coincident_items() {
        let points = vec![Point3::new(1.0, 1.0, 1.0); 100];
        let tree = Octree::build(&point_items(&points, 0.1), 4, 5);
        let stats = tree.stats();
        assert!(stats.max_depth <= 5);
        assert_eq!(stats.total_items_in_leaves, 100);
    }

    #[test]
    fn test_nearest_matches_linear_scan() {
        let points = grid(8);
        let radius = 0.3;
        let tree = Octree::build(&point_items(&points, radius), 8, 12);

        let ray = Ray::new(Point3::new(3.1, 2.9, -5.0), Vector3::new(0.01, 0.02, 1.0)).normalized();
        let hit = tree.nearest(&ray, |i| ray_sphere_hit(&ray, &points[i], radius)).unwrap();

        let mut expected: Option<Pick> = None;
        for (index, p) in points.iter().enumerate() {
            if let Some(distance) = ray_sphere_hit(&ray, p, radius) {
                let c = Pick { index, distance };
                if expected.is_none_or(|e| c.is_closer_than(&e)) {
                    expected = Some(c);
                }
            }
        }
        assert_eq!(Some(hit), expected);
        assert_eq!(points[hit.index], Point3::new(3.0, 3.0, 0.0));
    }

    #[test]
    fn test_tie_resolves_to_lowest_index() {
        let points = vec![Point3::new(0.0, 0.0, 5.0); 3];
        let tree = Octree::build(&point_items(&points, 0.1), 1, 4);
        let ray = Ray::new(Point3::origin(), Vector3::z());
        let hit = tree.nearest(&ray, |i| ray_sphere_hit(&ray, &points[i], 0.1)).unwrap();
        assert_eq!(hit.index, 0);
    }
}
