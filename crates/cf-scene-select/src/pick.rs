//! Pointer-driven picking.
//!
//! [`PickResolver`] turns press/release pairs into selections. A release
//! more than [`CLICK_WINDOW`](crate::CLICK_WINDOW) after its press is
//! a drag and is ignored. A release shortly after the last selection change
//! is a double action on the current selection. Any other release casts the
//! ray against the mesh, the point cloud and the cameras.
//!
//! When several kinds are hit at the same distance the priority is
//! mesh > point > camera: each later kind only replaces the tentative result
//! when it is strictly closer.

use nalgebra::Point3;
use tracing::debug;

use crate::config::ViewerConfig;
use crate::index::{FaceOctree, PointOctree};
use crate::ray::{Cone, Ray};
use crate::selection::{FOCUS_POINT, Selection, SelectionRecord};

/// Pointer button that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerButton {
    /// Usually the left button.
    #[default]
    Primary,
    /// Usually the right button.
    Secondary,
    /// Middle button.
    Middle,
}

/// Button transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    /// Button went down.
    Press,
    /// Button went up.
    Release,
}

/// Keyboard modifiers held during a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct Modifiers {
    /// Alt / option.
    pub alt: bool,
    /// Control.
    pub ctrl: bool,
    /// Shift.
    pub shift: bool,
}

impl Modifiers {
    /// No modifier held.
    pub const NONE: Self = Self {
        alt: false,
        ctrl: false,
        shift: false,
    };
    /// Only alt held.
    pub const ALT: Self = Self {
        alt: true,
        ctrl: false,
        shift: false,
    };
    /// Only control held.
    pub const CTRL: Self = Self {
        alt: false,
        ctrl: true,
        shift: false,
    };
}

/// A pointer button event with its timestamp in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    /// Button.
    pub button: PointerButton,
    /// Transition.
    pub action: PointerAction,
    /// Modifiers.
    pub modifiers: Modifiers,
    /// Monotonic time in seconds.
    pub time: f64,
}

impl PointerEvent {
    /// Primary-button press at `time`.
    #[must_use]
    pub const fn press(time: f64) -> Self {
        Self {
            button: PointerButton::Primary,
            action: PointerAction::Press,
            modifiers: Modifiers::NONE,
            time,
        }
    }

    /// Primary-button release at `time`.
    #[must_use]
    pub const fn release(time: f64) -> Self {
        Self {
            button: PointerButton::Primary,
            action: PointerAction::Release,
            modifiers: Modifiers::NONE,
            time,
        }
    }

    /// Sets the modifiers.
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// What a pick can be resolved against.
///
/// An index left `None` is skipped, either because its geometry is hidden or
/// because it has not been built yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct PickTargets<'a> {
    /// Mesh face index.
    pub faces: Option<&'a FaceOctree>,
    /// Point index.
    pub points: Option<&'a PointOctree>,
    /// Minimum views a point needs to be picked.
    pub min_views: usize,
    /// Viewer camera centers.
    pub cameras: &'a [Point3<f64>],
}

/// The nearest element along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Element hit.
    pub selection: Selection,
    /// Distance along the normalized ray.
    pub distance: f64,
    /// Display points for the selection record.
    pub points: [Point3<f64>; 4],
}

/// Request produced by a pointer event, for the session to carry out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PickEffect {
    /// Look through viewer camera.
    EnterCameraView(usize),
    /// Leave camera view mode.
    LeaveCameraView,
    /// Center the view on a point.
    CenterOn(Point3<f64>),
    /// Selection highlight must be re-uploaded and a frame redrawn.
    RefreshSelection,
}

/// Click / double-click / drag state machine owning the selection record.
#[derive(Debug, Clone)]
pub struct PickResolver {
    click_window: f64,
    double_click_window: f64,
    cone_half_angle: f64,
    press_time: Option<f64>,
    record: SelectionRecord,
}

impl PickResolver {
    /// Creates a resolver with the timing and cone settings of `config`.
    #[must_use]
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            click_window: config.click_window,
            double_click_window: config.double_click_window,
            cone_half_angle: config.camera_cone_half_angle(),
            press_time: None,
            record: SelectionRecord::default(),
        }
    }

    /// Current selection record.
    #[must_use]
    pub const fn record(&self) -> &SelectionRecord {
        &self.record
    }

    /// Clears the selection. Returns whether something was selected.
    pub fn clear(&mut self) -> bool {
        let had = self.record.selection.is_some();
        self.record.clear();
        had
    }

    /// Feeds a pointer event carrying the world-space `ray` under the cursor.
    ///
    /// Returns the view requests the event produced, in order.
    pub fn handle(&mut self, ray: &Ray, event: &PointerEvent, targets: &PickTargets<'_>) -> Vec<PickEffect> {
        let now = event.time;
        match event.action {
            PointerAction::Press => {
                self.press_time = Some(now);
                Vec::new()
            }
            PointerAction::Release => {
                let Some(pressed) = self.press_time.take() else {
                    return Vec::new();
                };
                if now - pressed > self.click_window {
                    debug!(held = now - pressed, "Long press ignored");
                    return Vec::new();
                }
                if self.record.selection.is_some() && now - self.record.time < self.double_click_window {
                    return self.double_action(now);
                }
                self.pick(ray, event, targets)
            }
        }
    }

    fn double_action(&mut self, now: f64) -> Vec<PickEffect> {
        self.record.time = now;
        match self.record.selection {
            Selection::Camera(camera) => vec![PickEffect::EnterCameraView(camera)],
            _ => vec![
                PickEffect::LeaveCameraView,
                PickEffect::CenterOn(self.record.focus()),
            ],
        }
    }

    fn pick(&mut self, ray: &Ray, event: &PointerEvent, targets: &PickTargets<'_>) -> Vec<PickEffect> {
        let previous = self.record.selection;
        let mut effects = Vec::new();
        let mut neighbor_changed = false;

        match self.resolve(ray, targets) {
            None => self.record.selection = Selection::None,
            Some(Candidate {
                selection: Selection::Camera(camera),
                ..
            }) if event.modifiers.alt => {
                effects.push(PickEffect::EnterCameraView(camera));
            }
            Some(Candidate {
                selection: Selection::Camera(camera),
                ..
            }) if event.modifiers.ctrl => {
                self.record.neighbor_camera = Some(camera);
                neighbor_changed = true;
            }
            Some(candidate) => {
                self.record = SelectionRecord {
                    selection: candidate.selection,
                    points: candidate.points,
                    time: event.time,
                    neighbor_camera: None,
                };
                if matches!(candidate.selection, Selection::Camera(_)) {
                    effects.push(PickEffect::LeaveCameraView);
                }
            }
        }

        debug!(
            button = ?event.button,
            previous = %previous,
            selection = %self.record.selection,
            "Pick resolved"
        );

        if self.record.selection.is_some() || previous.is_some() || neighbor_changed {
            effects.push(PickEffect::RefreshSelection);
        }
        effects
    }

    /// Nearest element along `ray`, without touching the selection.
    ///
    /// Distances are measured along the normalized ray. Ties keep the
    /// earlier kind in the order mesh, point, camera.
    #[must_use]
    pub fn resolve(&self, ray: &Ray, targets: &PickTargets<'_>) -> Option<Candidate> {
        let ray = ray.normalized();
        let mut best: Option<Candidate> = None;

        if let Some(index) = targets.faces {
            if let Some(pick) = index.nearest_hit(&ray) {
                let [a, b, c] = index.mesh().triangle(pick.index);
                best = Some(Candidate {
                    selection: Selection::Triangle(pick.index),
                    distance: pick.distance,
                    points: [a, b, c, ray.point_at(pick.distance)],
                });
            }
        }

        if let Some(index) = targets.points {
            if let Some(pick) = index.nearest_hit(&ray, targets.min_views) {
                if best.is_none_or(|b| pick.distance < b.distance) {
                    let p = index.cloud().points[pick.index];
                    best = Some(Candidate {
                        selection: Selection::Point(pick.index),
                        distance: pick.distance,
                        points: element_points(p),
                    });
                }
            }
        }

        let cone = Cone::new(&ray, self.cone_half_angle);
        for (camera, center) in targets.cameras.iter().enumerate() {
            if let Some(distance) = cone.classify(center) {
                if best.is_none_or(|b| distance < b.distance) {
                    best = Some(Candidate {
                        selection: Selection::Camera(camera),
                        distance,
                        points: element_points(*center),
                    });
                }
            }
        }

        best
    }
}

fn element_points(p: Point3<f64>) -> [Point3<f64>; 4] {
    let mut points = [Point3::origin(); 4];
    points[0] = p;
    points[FOCUS_POINT] = p;
    points
}
