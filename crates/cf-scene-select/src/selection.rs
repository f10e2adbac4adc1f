//! Single-element selection record and bulk selection set.

use std::collections::BTreeSet;
use std::fmt;

use nalgebra::Point3;

/// The element currently picked with the pointer.
///
/// Camera indices refer to viewer cameras (see
/// [`Session::viewer_image_index`](crate::Session::viewer_image_index)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    /// Nothing selected.
    #[default]
    None,
    /// A point of the point cloud.
    Point(usize),
    /// A face of the mesh.
    Triangle(usize),
    /// A viewer camera.
    Camera(usize),
}

impl Selection {
    /// Returns `true` for [`Selection::None`].
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns `true` if something is selected.
    #[must_use]
    pub const fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Index of the selected element.
    #[must_use]
    pub const fn index(&self) -> Option<usize> {
        match *self {
            Self::None => None,
            Self::Point(i) | Self::Triangle(i) | Self::Camera(i) => Some(i),
        }
    }

    /// Short name of the selection kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Point(_) => "point",
            Self::Triangle(_) => "triangle",
            Self::Camera(_) => "camera",
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(i) => write!(f, "{} {i}", self.kind()),
            None => f.write_str("none"),
        }
    }
}

/// Index of the display point used as the focus of centering requests.
pub const FOCUS_POINT: usize = 3;

/// The persistent pick state of a session.
///
/// `points` holds the face corners and the ray hit for a triangle, or the
/// element position in slots 0 and [`FOCUS_POINT`] for a point or camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRecord {
    /// Selected element.
    pub selection: Selection,
    /// Display points.
    pub points: [Point3<f64>; 4],
    /// Timestamp, in seconds, of the last selection change or double action.
    pub time: f64,
    /// Secondary camera picked with the control modifier.
    pub neighbor_camera: Option<usize>,
}

impl Default for SelectionRecord {
    fn default() -> Self {
        Self {
            selection: Selection::None,
            points: [Point3::origin(); 4],
            time: f64::NEG_INFINITY,
            neighbor_camera: None,
        }
    }
}

impl SelectionRecord {
    /// The point a double action centers on.
    #[must_use]
    pub const fn focus(&self) -> Point3<f64> {
        self.points[FOCUS_POINT]
    }

    /// Clears the selection, keeping the timestamp.
    pub fn clear(&mut self) {
        self.selection = Selection::None;
        self.neighbor_camera = None;
    }
}

/// A bulk selection of points and faces.
///
/// Indices are kept ordered so deletions and fits are deterministic. Any edit
/// forgets the highlighted camera, so [`SelectionSet::highlight_camera`] is
/// only set while the set holds exactly that camera's points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    points: BTreeSet<usize>,
    faces: BTreeSet<usize>,
    highlight_camera: Option<usize>,
}

impl SelectionSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            points: BTreeSet::new(),
            faces: BTreeSet::new(),
            highlight_camera: None,
        }
    }

    /// Returns `true` if no point or face is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.faces.is_empty()
    }

    /// Selected point indices.
    #[must_use]
    pub const fn points(&self) -> &BTreeSet<usize> {
        &self.points
    }

    /// Selected face indices.
    #[must_use]
    pub const fn faces(&self) -> &BTreeSet<usize> {
        &self.faces
    }

    /// Adds points to the selection.
    pub fn select_points(&mut self, indices: impl IntoIterator<Item = usize>) {
        self.points.extend(indices);
        self.highlight_camera = None;
    }

    /// Adds faces to the selection.
    pub fn select_faces(&mut self, indices: impl IntoIterator<Item = usize>) {
        self.faces.extend(indices);
        self.highlight_camera = None;
    }

    /// Replaces the point selection, dropping indices `>= point_count`.
    pub fn set_points(&mut self, indices: impl IntoIterator<Item = usize>, point_count: usize) {
        self.points = indices.into_iter().filter(|&i| i < point_count).collect();
        self.highlight_camera = None;
    }

    /// Selects every unselected point and face and deselects the rest.
    pub fn invert(&mut self, point_count: usize, face_count: usize) {
        self.points = (0..point_count).filter(|i| !self.points.contains(i)).collect();
        self.faces = (0..face_count).filter(|i| !self.faces.contains(i)).collect();
        self.highlight_camera = None;
    }

    /// Empties the set and forgets the highlighted camera.
    pub fn clear(&mut self) {
        self.points.clear();
        self.faces.clear();
        self.highlight_camera = None;
    }

    /// Camera whose visible points currently fill the set, if any.
    #[must_use]
    pub const fn highlight_camera(&self) -> Option<usize> {
        self.highlight_camera
    }

    /// Records the camera whose visible points fill the set.
    pub fn set_highlight_camera(&mut self, camera: Option<usize>) {
        self.highlight_camera = camera;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_kind_and_index() {
        assert!(Selection::None.is_none());
        assert_eq!(Selection::Triangle(4).index(), Some(4));
        assert_eq!(Selection::Camera(1).kind(), "camera");
        assert_eq!(Selection::Point(9).to_string(), "point 9");
        assert_eq!(Selection::None.to_string(), "none");
    }

    #[test]
    fn test_record_clear_keeps_time() {
        let mut record = SelectionRecord {
            selection: Selection::Point(2),
            time: 1.5,
            neighbor_camera: Some(3),
            ..SelectionRecord::default()
        };
        record.clear();
        assert!(record.selection.is_none());
        assert_eq!(record.neighbor_camera, None);
        assert!((record.time - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_set_invert() {
        let mut set = SelectionSet::new();
        assert!(set.is_empty());
        set.select_points([0, 2]);
        set.select_faces([1]);
        set.invert(4, 3);
        assert_eq!(set.points().iter().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(set.faces().iter().copied().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_set_points_bounds_checked() {
        let mut set = SelectionSet::new();
        set.set_points([5, 1, 9], 6);
        assert_eq!(set.points().len(), 2);
        set.set_highlight_camera(Some(2));
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.highlight_camera(), None);
    }

    #[test]
    fn test_edits_forget_highlight_camera() {
        let mut set = SelectionSet::new();
        set.set_points([0, 1], 4);
        set.set_highlight_camera(Some(1));
        set.invert(4, 2);
        assert_eq!(set.highlight_camera(), None);

        set.set_highlight_camera(Some(1));
        set.select_faces([0]);
        assert_eq!(set.highlight_camera(), None);

        set.set_highlight_camera(Some(1));
        set.select_points([3]);
        assert_eq!(set.highlight_camera(), None);

        set.set_highlight_camera(Some(1));
        set.set_points([2], 4);
        assert_eq!(set.highlight_camera(), None);
    }
}
