#![forbid(unsafe_code)]

//! Swipe gesture state machine: pointer input in, card transform and
//! effect requests out.
//!
//! [`SwipeGestureStateMachine`] interprets one drag at a time. Early
//! movement picks a branch (the *direction lock*), the branch shapes the card
//! transform, and the release either commits an action or springs back.
//!
//! # State Machine
//!
//! ```text
//! Idle ──Down──▶ Dragging(None) ──lock──▶ Dragging(Horizontal | Up | Down)
//!                     │                          │
//!                     └─Up (no movement): Tap    ├─Up, condition met──▶ Committing
//!                                                └─Up, otherwise: Reset ──▶ Idle
//! Committing ──complete_commit()──▶ Idle
//! ```
//!
//! While locked `Down`, a nested classify mode switches between inactive and
//! active with a hysteresis band (`classify_exit < classify_enter`). While
//! active, horizontal travel since entry picks the target index in steps of
//! `tag_switch` pixels.
//!
//! # Invariants
//!
//! 1. Once a session's lock is not `None`, it never changes before the
//!    session ends.
//! 2. Classify mode toggles at most once per threshold crossing; movement
//!    inside the band never toggles it.
//! 3. The selected classify index is always within `0..=target_count`.
//! 4. Every release produces exactly one of `Tap`, `Commit`, or `Reset`.
//! 5. Input is ignored while `Committing`.
//!
//! # Failure Modes
//!
//! - A `Down` arriving mid-session (lost `Up`) resets the old session first.
//! - The target list shrinking mid-gesture clamps the index; nothing errors.
//! - A "previous" shuffle with no previous card resets instead of committing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::SwipeThresholds;
use crate::geometry::Point;
use crate::haptics::{HapticCoordinator, HapticKind};
use crate::preload::PreloadSlot;

// ---------------------------------------------------------------------------
// Input and output
// ---------------------------------------------------------------------------

/// Raw pointer input, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerInput {
    Down { position: Point },
    Move { position: Point },
    /// `velocity` is the release velocity in px/s.
    Up { position: Point, velocity: Point },
    /// The platform took the pointer away (e.g. a system gesture).
    Cancel,
}

/// Which branch a drag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockedDirection {
    #[default]
    None,
    /// Shuffle to the next or previous card.
    Horizontal,
    /// Delete.
    Up,
    /// Classify into a target.
    Down,
}

impl LockedDirection {
    #[inline]
    #[must_use]
    pub fn is_locked(self) -> bool {
        self != Self::None
    }
}

/// Visual transform of the active card.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardTransform {
    pub offset_x: f32,
    pub offset_y: f32,
    pub rotation_deg: f32,
    pub alpha: f32,
    pub scale: f32,
}

impl CardTransform {
    pub const NEUTRAL: CardTransform = CardTransform {
        offset_x: 0.0,
        offset_y: 0.0,
        rotation_deg: 0.0,
        alpha: 1.0,
        scale: 1.0,
    };

    #[must_use]
    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }
}

impl Default for CardTransform {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Facts about the deck the machine cannot know by itself. Supplied with
/// every input because both can change mid-gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GestureContext {
    /// Number of existing classification targets (excluding "create new").
    pub target_count: usize,
    /// Whether a card precedes the current one.
    pub has_previous: bool,
}

/// A committed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitAction {
    /// Shuffle by `delta` cards: `-1` previous, `+1` next.
    Advance { delta: i32 },
    Delete,
    /// Classify into `target_index` (0 = create a new target).
    Classify {
        target_index: usize,
        entered_at: Instant,
    },
}

/// Requests and notifications emitted by [`SwipeGestureStateMachine::process`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SwipeEffect {
    /// The session locked into a branch.
    Locked(LockedDirection),
    /// Start preparing a raster of the current image.
    RequestPreload(PreloadSlot),
    /// Abandon a preload and release its raster.
    CancelPreload(PreloadSlot),
    ClassifyEntered { index: usize },
    ClassifyExited,
    ClassifySelection { index: usize },
    /// Release without movement.
    Tap,
    Commit(CommitAction),
    /// Spring back to neutral from `from`. Every preload is void.
    Reset { from: CardTransform },
}

/// Phase of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    Dragging(LockedDirection),
    /// Waiting for the commit animation to finish.
    Committing,
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// One drag, from `Down` to release.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    pub origin: Point,
    pub started_at: Instant,
    pub locked: LockedDirection,
    pub transform: CardTransform,
    /// Moved beyond the touch slop; suppresses tap.
    pub has_moved: bool,
    swipe_haptic_fired: bool,
    delete_armed: bool,
}

impl DragSession {
    fn new(origin: Point, started_at: Instant) -> Self {
        Self {
            origin,
            started_at,
            locked: LockedDirection::None,
            transform: CardTransform::NEUTRAL,
            has_moved: false,
            swipe_haptic_fired: false,
            delete_armed: false,
        }
    }
}

/// Classify sub-mode of a `Down` session.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassifyState {
    pub active: bool,
    pub selected_index: usize,
    /// Pointer x at entry.
    pub entry_x: f32,
    pub entered_at: Option<Instant>,
}

// ---------------------------------------------------------------------------
// SwipeGestureStateMachine
// ---------------------------------------------------------------------------

/// Direction-locked swipe interpreter.
pub struct SwipeGestureStateMachine {
    thresholds: SwipeThresholds,
    haptics: HapticCoordinator,
    session: Option<DragSession>,
    classify: ClassifyState,
    committing: bool,
}

impl std::fmt::Debug for SwipeGestureStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwipeGestureStateMachine")
            .field("phase", &self.phase())
            .field("classify", &self.classify)
            .finish()
    }
}

impl SwipeGestureStateMachine {
    #[must_use]
    pub fn new(thresholds: SwipeThresholds, haptics: HapticCoordinator) -> Self {
        Self {
            thresholds,
            haptics,
            session: None,
            classify: ClassifyState::default(),
            committing: false,
        }
    }

    #[must_use]
    pub fn thresholds(&self) -> &SwipeThresholds {
        &self.thresholds
    }

    /// Takes effect from the next session.
    pub fn set_thresholds(&mut self, thresholds: SwipeThresholds) {
        self.thresholds = thresholds;
    }

    #[must_use]
    pub fn haptics(&self) -> &HapticCoordinator {
        &self.haptics
    }

    #[must_use]
    pub fn phase(&self) -> GesturePhase {
        if self.committing {
            GesturePhase::Committing
        } else {
            match &self.session {
                Some(s) => GesturePhase::Dragging(s.locked),
                None => GesturePhase::Idle,
            }
        }
    }

    #[must_use]
    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn locked_direction(&self) -> LockedDirection {
        self.session.map_or(LockedDirection::None, |s| s.locked)
    }

    #[must_use]
    pub fn classify(&self) -> &ClassifyState {
        &self.classify
    }

    /// Current card transform (neutral when idle).
    #[must_use]
    pub fn transform(&self) -> CardTransform {
        self.session.map_or(CardTransform::NEUTRAL, |s| s.transform)
    }

    /// The preload slot whose results are still wanted.
    #[must_use]
    pub fn active_preload_slot(&self) -> Option<PreloadSlot> {
        match self.locked_direction() {
            LockedDirection::Up => Some(PreloadSlot::Delete),
            LockedDirection::Down if self.classify.active => Some(PreloadSlot::Classify),
            _ => None,
        }
    }

    /// Feed one pointer input.
    pub fn process(
        &mut self,
        input: &PointerInput,
        ctx: &GestureContext,
        now: Instant,
    ) -> Vec<SwipeEffect> {
        let mut out = Vec::new();
        if self.committing {
            trace!(?input, "input ignored while committing");
            return out;
        }
        match *input {
            PointerInput::Down { position } => {
                if self.session.is_some() {
                    self.reset_into(&mut out);
                }
                self.session = Some(DragSession::new(position, now));
            }
            PointerInput::Move { position } => self.on_move(position, ctx, now, &mut out),
            PointerInput::Up { position, velocity } => {
                self.on_move(position, ctx, now, &mut out);
                self.on_release(velocity, ctx, &mut out);
            }
            PointerInput::Cancel => {
                if self.session.is_some() {
                    self.reset_into(&mut out);
                }
            }
        }
        out
    }

    /// The commit animation finished: back to `Idle`.
    pub fn complete_commit(&mut self) {
        if self.committing {
            debug!("commit complete");
        }
        self.committing = false;
        self.session = None;
        self.classify = ClassifyState::default();
    }

    /// Abandon whatever is in progress. Returns the resulting effects
    /// (a `Reset` if a drag or commit was in progress).
    pub fn reset(&mut self) -> Vec<SwipeEffect> {
        let mut out = Vec::new();
        if self.session.is_some() {
            self.reset_into(&mut out);
        }
        self.committing = false;
        out
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn on_move(
        &mut self,
        position: Point,
        ctx: &GestureContext,
        now: Instant,
        out: &mut Vec<SwipeEffect>,
    ) {
        let t = self.thresholds;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let dx = position.x - session.origin.x;
        let dy = position.y - session.origin.y;
        let (ax, ay) = (dx.abs(), dy.abs());

        if !session.has_moved && ax.max(ay) > t.touch_slop {
            session.has_moved = true;
        }

        if !session.locked.is_locked() && session.has_moved {
            let vertical = ay > t.lock_ratio * ax;
            let lock = if vertical && dy < 0.0 {
                LockedDirection::Up
            } else if vertical && dy > 0.0 && ctx.target_count > 0 {
                LockedDirection::Down
            } else if ax.max(ay) > t.horizontal_lock {
                LockedDirection::Horizontal
            } else {
                LockedDirection::None
            };
            if lock.is_locked() {
                debug!(?lock, dx, dy, "direction locked");
                session.locked = lock;
                out.push(SwipeEffect::Locked(lock));
                if lock == LockedDirection::Up {
                    out.push(SwipeEffect::RequestPreload(PreloadSlot::Delete));
                }
            }
        }

        match session.locked {
            LockedDirection::None => {}
            LockedDirection::Horizontal => {
                let tr = &mut session.transform;
                tr.offset_x = dx;
                tr.offset_y = dy * t.horizontal_y_damping;
                tr.rotation_deg = (dx / t.screen_width * t.rotation_per_width)
                    .clamp(-t.max_rotation, t.max_rotation);
                if !session.swipe_haptic_fired && tr.offset_x.abs() > t.swipe {
                    session.swipe_haptic_fired = true;
                    self.haptics
                        .transition(HapticKind::SwipeThreshold, false, true, now);
                }
            }
            LockedDirection::Up => {
                let tr = &mut session.transform;
                tr.offset_y = dy.min(0.0);
                tr.offset_x = dx * t.up_x_damping;
                let armed = tr.offset_y.abs() > t.delete;
                if armed != session.delete_armed {
                    let kind = if armed {
                        HapticKind::DeleteArmed
                    } else {
                        HapticKind::DeleteDisarmed
                    };
                    self.haptics
                        .transition(kind, session.delete_armed, armed, now);
                    session.delete_armed = armed;
                }
            }
            LockedDirection::Down => {
                let tr = &mut session.transform;
                tr.offset_y = dy.max(0.0);
                tr.offset_x = dx * t.down_x_damping;
                let offset_y = tr.offset_y;
                self.update_classify(offset_y, position.x, ctx, now, out);
            }
        }
    }

    fn update_classify(
        &mut self,
        offset_y: f32,
        pointer_x: f32,
        ctx: &GestureContext,
        now: Instant,
        out: &mut Vec<SwipeEffect>,
    ) {
        let t = self.thresholds;
        let c = &mut self.classify;
        if !c.active {
            if offset_y > t.classify_enter {
                c.active = true;
                c.entry_x = pointer_x;
                c.entered_at = Some(now);
                c.selected_index = default_index(ctx.target_count);
                debug!(index = c.selected_index, "classify entered");
                out.push(SwipeEffect::ClassifyEntered {
                    index: c.selected_index,
                });
                out.push(SwipeEffect::RequestPreload(PreloadSlot::Classify));
                self.haptics
                    .transition(HapticKind::ClassifyEntered, false, true, now);
            }
            return;
        }

        if offset_y < t.classify_exit {
            c.active = false;
            c.entered_at = None;
            debug!("classify exited");
            out.push(SwipeEffect::ClassifyExited);
            out.push(SwipeEffect::CancelPreload(PreloadSlot::Classify));
            self.haptics
                .transition(HapticKind::ClassifyExited, true, false, now);
            return;
        }

        let index = quantize_index(pointer_x - c.entry_x, t.tag_switch, ctx.target_count);
        if index != c.selected_index {
            let previous = c.selected_index;
            c.selected_index = index;
            trace!(previous, index, "classify selection");
            out.push(SwipeEffect::ClassifySelection { index });
            self.haptics
                .transition(HapticKind::ClassifyIndex, previous, index, now);
        }
    }

    fn on_release(&mut self, velocity: Point, ctx: &GestureContext, out: &mut Vec<SwipeEffect>) {
        let t = self.thresholds;
        let Some(session) = self.session else {
            return;
        };
        if !session.has_moved {
            trace!("tap");
            out.push(SwipeEffect::Tap);
            self.session = None;
            self.classify = ClassifyState::default();
            return;
        }

        let tr = session.transform;
        let commit = match session.locked {
            LockedDirection::None => None,
            LockedDirection::Horizontal => {
                let passed = tr.offset_x.abs() > t.swipe || velocity.x.abs() > t.velocity;
                let delta = if tr.offset_x > 0.0 { -1 } else { 1 };
                (passed && (delta > 0 || ctx.has_previous))
                    .then_some(CommitAction::Advance { delta })
            }
            LockedDirection::Up => (tr.offset_y.abs() > t.delete
                || velocity.y.abs() > t.velocity)
                .then_some(CommitAction::Delete),
            LockedDirection::Down => {
                let c = self.classify;
                match (c.active, c.entered_at) {
                    (true, Some(entered_at)) => Some(CommitAction::Classify {
                        target_index: c.selected_index.min(ctx.target_count),
                        entered_at,
                    }),
                    _ => None,
                }
            }
        };

        match commit {
            Some(action) => {
                debug!(?action, ?velocity, "commit");
                self.committing = true;
                out.push(SwipeEffect::Commit(action));
            }
            None => self.reset_into(out),
        }
    }

    fn reset_into(&mut self, out: &mut Vec<SwipeEffect>) {
        let from = self.transform();
        debug!(?from, "reset");
        self.session = None;
        self.classify = ClassifyState::default();
        self.committing = false;
        out.push(SwipeEffect::Reset { from });
    }
}

/// Index selected on classify entry: the first existing target, or
/// "create new" when there are none.
#[inline]
#[must_use]
pub fn default_index(target_count: usize) -> usize {
    usize::from(target_count > 0)
}

/// Target index after `relative_x` pixels of travel since entry.
#[must_use]
pub fn quantize_index(relative_x: f32, step: f32, target_count: usize) -> usize {
    let steps = if step > 0.0 && relative_x.is_finite() {
        (relative_x / step).trunc() as i64
    } else {
        0
    };
    let index = default_index(target_count) as i64 + steps;
    index.clamp(0, target_count as i64) as usize
}

// ---------------------------------------------------------------------------
// VelocityTracker
// ---------------------------------------------------------------------------

/// Release velocity from recent pointer samples.
#[derive(Debug, Clone)]
pub struct VelocityTracker {
    window: Duration,
    samples: VecDeque<(Instant, Point)>,
}

impl Default for VelocityTracker {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl VelocityTracker {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::with_capacity(16),
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn push(&mut self, position: Point, now: Instant) {
        self.samples.push_back((now, position));
        while let Some(&(t, _)) = self.samples.front()
            && now.saturating_duration_since(t) > self.window
        {
            self.samples.pop_front();
        }
    }

    /// Velocity in px/s over the samples within the window ending at the
    /// newest sample. Zero with fewer than two samples or no elapsed time.
    #[must_use]
    pub fn velocity(&self) -> Point {
        let (Some(&(t0, p0)), Some(&(t1, p1))) = (self.samples.front(), self.samples.back()) else {
            return Point::ZERO;
        };
        let dt = t1.saturating_duration_since(t0).as_secs_f32();
        if dt < 0.001 {
            return Point::ZERO;
        }
        Point::new((p1.x - p0.x) / dt, (p1.y - p0.y) / dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GestureConfig, ScreenMetrics};
    use crate::haptics::{HapticIntensity, RecordingHaptics, SharedHapticSettings};
    use std::sync::Arc;

    // 1000 × 2000 px at density 1: swipe 250, delete 160, classify 100/60,
    // slop 8, horizontal lock 20, tag switch 18.
    fn thresholds() -> SwipeThresholds {
        GestureConfig::default().resolve(ScreenMetrics::new(1000.0, 2000.0, 1.0))
    }

    fn machine() -> (SwipeGestureStateMachine, Arc<RecordingHaptics>) {
        let device = Arc::new(RecordingHaptics::default());
        let haptics = HapticCoordinator::new(device.clone(), SharedHapticSettings::default())
            .with_throttle(Duration::ZERO);
        (SwipeGestureStateMachine::new(thresholds(), haptics), device)
    }

    fn ctx(targets: usize) -> GestureContext {
        GestureContext {
            target_count: targets,
            has_previous: true,
        }
    }

    fn down(x: f32, y: f32) -> PointerInput {
        PointerInput::Down {
            position: Point::new(x, y),
        }
    }

    fn mv(x: f32, y: f32) -> PointerInput {
        PointerInput::Move {
            position: Point::new(x, y),
        }
    }

    fn up(x: f32, y: f32) -> PointerInput {
        up_fast(x, y, 0.0, 0.0)
    }

    fn up_fast(x: f32, y: f32, vx: f32, vy: f32) -> PointerInput {
        PointerInput::Up {
            position: Point::new(x, y),
            velocity: Point::new(vx, vy),
        }
    }

    fn run(
        m: &mut SwipeGestureStateMachine,
        c: GestureContext,
        inputs: &[PointerInput],
    ) -> Vec<SwipeEffect> {
        let t0 = Instant::now();
        let mut out = Vec::new();
        for (i, input) in inputs.iter().enumerate() {
            out.extend(m.process(input, &c, t0 + Duration::from_millis(16 * i as u64)));
        }
        out
    }

    fn commits(effects: &[SwipeEffect]) -> Vec<CommitAction> {
        effects
            .iter()
            .filter_map(|e| match e {
                SwipeEffect::Commit(a) => Some(*a),
                _ => None,
            })
            .collect()
    }

    fn is_reset(e: &SwipeEffect) -> bool {
        matches!(e, SwipeEffect::Reset { .. })
    }

    // --- Locking -----------------------------------------------------------

    #[test]
    fn small_movement_does_not_lock() {
        let (mut m, _) = machine();
        run(&mut m, ctx(3), &[down(500.0, 500.0), mv(505.0, 503.0)]);
        assert_eq!(m.phase(), GesturePhase::Dragging(LockedDirection::None));
    }

    #[test]
    fn steep_upward_movement_locks_up_and_requests_preload() {
        let (mut m, _) = machine();
        let fx = run(&mut m, ctx(3), &[down(500.0, 500.0), mv(502.0, 480.0)]);
        assert_eq!(m.locked_direction(), LockedDirection::Up);
        assert!(fx.contains(&SwipeEffect::RequestPreload(PreloadSlot::Delete)));
    }

    #[test]
    fn downward_needs_targets() {
        let (mut m, _) = machine();
        run(&mut m, ctx(2), &[down(500.0, 500.0), mv(500.0, 530.0)]);
        assert_eq!(m.locked_direction(), LockedDirection::Down);

        let (mut m, _) = machine();
        run(&mut m, ctx(0), &[down(500.0, 500.0), mv(500.0, 530.0)]);
        assert_eq!(m.locked_direction(), LockedDirection::Horizontal);
    }

    #[test]
    fn diagonal_under_lock_distance_stays_unlocked() {
        let (mut m, _) = machine();
        run(&mut m, ctx(1), &[down(0.0, 0.0), mv(12.0, 12.0)]);
        assert_eq!(m.locked_direction(), LockedDirection::None);
        run(&mut m, ctx(1), &[mv(25.0, 15.0)]);
        assert_eq!(m.locked_direction(), LockedDirection::Horizontal);
    }

    #[test]
    fn lock_is_immutable_within_session() {
        let (mut m, _) = machine();
        run(
            &mut m,
            ctx(3),
            &[down(500.0, 500.0), mv(540.0, 500.0), mv(540.0, 200.0), mv(540.0, 900.0)],
        );
        assert_eq!(m.locked_direction(), LockedDirection::Horizontal);
    }

    // --- Branch transforms -------------------------------------------------

    #[test]
    fn horizontal_transform() {
        let (mut m, _) = machine();
        run(&mut m, ctx(0), &[down(500.0, 500.0), mv(600.0, 550.0)]);
        let tr = m.transform();
        assert_eq!(tr.offset_x, 100.0);
        assert!((tr.offset_y - 10.0).abs() < 1e-4);
        assert!((tr.rotation_deg - 4.0).abs() < 1e-4);
        run(&mut m, ctx(0), &[mv(1500.0, 500.0)]);
        assert_eq!(m.transform().rotation_deg, 20.0);
        run(&mut m, ctx(0), &[mv(-600.0, 500.0)]);
        assert_eq!(m.transform().rotation_deg, -20.0);
    }

    #[test]
    fn up_branch_clamps_downward_travel() {
        let (mut m, _) = machine();
        run(&mut m, ctx(0), &[down(500.0, 500.0), mv(500.0, 450.0), mv(510.0, 600.0)]);
        let tr = m.transform();
        assert_eq!(tr.offset_y, 0.0);
        assert!((tr.offset_x - 3.0).abs() < 1e-4);
    }

    #[test]
    fn down_branch_clamps_upward_travel() {
        let (mut m, _) = machine();
        run(&mut m, ctx(1), &[down(500.0, 500.0), mv(500.0, 550.0), mv(510.0, 400.0)]);
        let tr = m.transform();
        assert_eq!(tr.offset_y, 0.0);
        assert!((tr.offset_x - 7.0).abs() < 1e-4);
    }

    // --- Haptics -----------------------------------------------------------

    #[test]
    fn horizontal_threshold_haptic_fires_once_per_session() {
        let (mut m, device) = machine();
        run(
            &mut m,
            ctx(0),
            &[down(0.0, 0.0), mv(300.0, 0.0), mv(100.0, 0.0), mv(300.0, 0.0)],
        );
        assert_eq!(device.pulses(), vec![HapticIntensity::Heavy]);
    }

    #[test]
    fn delete_haptic_rearms_within_session() {
        let (mut m, device) = machine();
        run(
            &mut m,
            ctx(0),
            &[
                down(0.0, 1000.0),
                mv(0.0, 800.0),
                mv(0.0, 900.0),
                mv(0.0, 800.0),
            ],
        );
        assert_eq!(
            device.pulses(),
            vec![HapticIntensity::Heavy, HapticIntensity::Light, HapticIntensity::Heavy]
        );
    }

    // --- Classify ----------------------------------------------------------

    #[test]
    fn classify_entry_selects_default_and_requests_preload() {
        let (mut m, device) = machine();
        let fx = run(&mut m, ctx(3), &[down(100.0, 500.0), mv(100.0, 620.0)]);
        assert!(m.classify().active);
        assert_eq!(m.classify().selected_index, 1);
        assert!(fx.contains(&SwipeEffect::ClassifyEntered { index: 1 }));
        assert!(fx.contains(&SwipeEffect::RequestPreload(PreloadSlot::Classify)));
        assert_eq!(device.pulses(), vec![HapticIntensity::Medium]);
    }

    #[test]
    fn classify_exit_below_lower_threshold() {
        let (mut m, _) = machine();
        run(&mut m, ctx(3), &[down(100.0, 500.0), mv(100.0, 620.0)]);
        let fx = run(&mut m, ctx(3), &[mv(100.0, 580.0)]);
        assert!(m.classify().active, "inside the band stays active");
        assert!(fx.is_empty());
        let fx = run(&mut m, ctx(3), &[mv(100.0, 550.0)]);
        assert!(!m.classify().active);
        assert!(fx.contains(&SwipeEffect::CancelPreload(PreloadSlot::Classify)));
    }

    #[test]
    fn classify_index_quantized_from_entry_x() {
        let (mut m, _) = machine();
        run(&mut m, ctx(5), &[down(100.0, 500.0), mv(100.0, 620.0)]);
        let fx = run(&mut m, ctx(5), &[mv(154.0, 620.0)]);
        assert_eq!(m.classify().selected_index, 4);
        assert_eq!(fx, vec![SwipeEffect::ClassifySelection { index: 4 }]);
    }

    #[test]
    fn classify_index_clamps_to_target_count() {
        let (mut m, _) = machine();
        run(&mut m, ctx(3), &[down(100.0, 500.0), mv(100.0, 620.0), mv(154.0, 620.0)]);
        assert_eq!(m.classify().selected_index, 3);
        run(&mut m, ctx(3), &[mv(-400.0, 620.0)]);
        assert_eq!(m.classify().selected_index, 0);
    }

    #[test]
    fn same_index_does_not_repeat_haptic() {
        let (mut m, device) = machine();
        run(&mut m, ctx(5), &[down(100.0, 500.0), mv(100.0, 620.0)]);
        device.clear();
        run(&mut m, ctx(5), &[mv(110.0, 620.0), mv(117.0, 620.0)]);
        assert!(device.pulses().is_empty());
        run(&mut m, ctx(5), &[mv(120.0, 620.0)]);
        assert_eq!(device.pulses(), vec![HapticIntensity::Light]);
    }

    #[test]
    fn shrinking_targets_clamp_index() {
        let (mut m, _) = machine();
        run(&mut m, ctx(5), &[down(100.0, 500.0), mv(100.0, 620.0), mv(200.0, 620.0)]);
        assert_eq!(m.classify().selected_index, 5);
        let fx = run(&mut m, ctx(2), &[up(200.0, 620.0)]);
        assert!(matches!(
            commits(&fx)[..],
            [CommitAction::Classify { target_index: 2, .. }]
        ));
    }

    #[test]
    fn quantize_index_rules() {
        assert_eq!(quantize_index(54.0, 18.0, 3), 3);
        assert_eq!(quantize_index(17.9, 18.0, 3), 1);
        assert_eq!(quantize_index(-18.0, 18.0, 3), 0);
        assert_eq!(quantize_index(-17.0, 18.0, 3), 1);
        assert_eq!(quantize_index(500.0, 18.0, 0), 0);
        assert_eq!(quantize_index(f32::NAN, 18.0, 3), 1);
    }

    // --- Release -----------------------------------------------------------

    #[test]
    fn release_without_movement_is_tap() {
        let (mut m, _) = machine();
        let fx = run(&mut m, ctx(0), &[down(10.0, 10.0), mv(12.0, 11.0), up(12.0, 11.0)]);
        assert_eq!(fx, vec![SwipeEffect::Tap]);
        assert_eq!(m.phase(), GesturePhase::Idle);
    }

    #[test]
    fn horizontal_velocity_or_gate() {
        let (mut m, _) = machine();
        let fx = run(&mut m, ctx(0), &[down(500.0, 500.0), mv(400.0, 500.0), up_fast(400.0, 500.0, -900.0, 0.0)]);
        assert_eq!(commits(&fx), vec![CommitAction::Advance { delta: 1 }]);
        assert_eq!(m.phase(), GesturePhase::Committing);

        let (mut m, _) = machine();
        let fx = run(&mut m, ctx(0), &[down(500.0, 500.0), mv(400.0, 500.0), up_fast(400.0, 500.0, -500.0, 0.0)]);
        assert!(commits(&fx).is_empty());
        assert!(fx.iter().any(is_reset));
        assert_eq!(m.phase(), GesturePhase::Idle);
    }

    #[test]
    fn right_swipe_is_previous_and_needs_a_previous_card() {
        let (mut m, _) = machine();
        let fx = run(&mut m, ctx(0), &[down(100.0, 500.0), mv(400.0, 500.0), up(400.0, 500.0)]);
        assert_eq!(commits(&fx), vec![CommitAction::Advance { delta: -1 }]);

        let (mut m, _) = machine();
        let first = GestureContext {
            target_count: 0,
            has_previous: false,
        };
        let fx = run(&mut m, first, &[down(100.0, 500.0), mv(400.0, 500.0), up(400.0, 500.0)]);
        assert!(commits(&fx).is_empty());
        assert!(fx.iter().any(is_reset));
    }

    #[test]
    fn up_commits_on_distance_or_velocity() {
        let (mut m, _) = machine();
        let fx = run(&mut m, ctx(0), &[down(0.0, 1000.0), mv(0.0, 800.0), up(0.0, 800.0)]);
        assert_eq!(commits(&fx), vec![CommitAction::Delete]);

        let (mut m, _) = machine();
        let fx = run(&mut m, ctx(0), &[down(0.0, 1000.0), mv(0.0, 950.0), up_fast(0.0, 950.0, 0.0, -1200.0)]);
        assert_eq!(commits(&fx), vec![CommitAction::Delete]);

        let (mut m, _) = machine();
        let fx = run(&mut m, ctx(0), &[down(0.0, 1000.0), mv(0.0, 950.0), up(0.0, 950.0)]);
        assert!(fx.iter().any(is_reset));
    }

    #[test]
    fn down_commits_only_when_classify_active() {
        let (mut m, _) = machine();
        let fx = run(&mut m, ctx(2), &[down(0.0, 0.0), mv(0.0, 50.0), up_fast(0.0, 50.0, 0.0, 3000.0)]);
        assert!(commits(&fx).is_empty());
        assert!(fx.iter().any(is_reset));

        let (mut m, _) = machine();
        let fx = run(&mut m, ctx(2), &[down(0.0, 0.0), mv(0.0, 150.0), up(0.0, 150.0)]);
        assert!(matches!(
            commits(&fx)[..],
            [CommitAction::Classify { target_index: 1, .. }]
        ));
    }

    #[test]
    fn reset_reports_transform_and_clears_state() {
        let (mut m, _) = machine();
        let fx = run(
            &mut m,
            ctx(2),
            &[down(0.0, 0.0), mv(0.0, 150.0), mv(0.0, 50.0), up(0.0, 50.0)],
        );
        let Some(SwipeEffect::Reset { from }) = fx.last() else {
            panic!("expected reset, got {fx:?}");
        };
        assert_eq!(from.offset_y, 50.0);
        assert_eq!(m.phase(), GesturePhase::Idle);
        assert!(!m.classify().active);
        assert!(m.transform().is_neutral());
    }

    #[test]
    fn input_ignored_while_committing_until_complete() {
        let (mut m, _) = machine();
        run(&mut m, ctx(0), &[down(0.0, 1000.0), mv(0.0, 800.0), up(0.0, 800.0)]);
        assert!(run(&mut m, ctx(0), &[down(0.0, 0.0), mv(300.0, 0.0)]).is_empty());
        m.complete_commit();
        assert_eq!(m.phase(), GesturePhase::Idle);
        run(&mut m, ctx(0), &[down(0.0, 0.0), mv(300.0, 0.0)]);
        assert_eq!(m.locked_direction(), LockedDirection::Horizontal);
    }

    #[test]
    fn cancel_and_lost_up_reset() {
        let (mut m, _) = machine();
        let fx = run(&mut m, ctx(0), &[down(0.0, 0.0), mv(100.0, 0.0), PointerInput::Cancel]);
        assert!(fx.iter().any(is_reset));
        let fx = run(&mut m, ctx(0), &[down(0.0, 0.0), mv(100.0, 0.0), down(5.0, 5.0)]);
        assert!(fx.iter().any(is_reset));
        assert_eq!(m.phase(), GesturePhase::Dragging(LockedDirection::None));
    }

    #[test]
    fn active_preload_slot_follows_branch() {
        let (mut m, _) = machine();
        run(&mut m, ctx(2), &[down(0.0, 0.0), mv(0.0, 50.0)]);
        assert_eq!(m.active_preload_slot(), None);
        run(&mut m, ctx(2), &[mv(0.0, 150.0)]);
        assert_eq!(m.active_preload_slot(), Some(PreloadSlot::Classify));
    }

    // --- VelocityTracker ---------------------------------------------------

    #[test]
    fn velocity_over_window() {
        let mut v = VelocityTracker::default();
        let t0 = Instant::now();
        v.push(Point::new(0.0, 0.0), t0);
        v.push(Point::new(50.0, 10.0), t0 + Duration::from_millis(50));
        let vel = v.velocity();
        assert!((vel.x - 1000.0).abs() < 1.0);
        assert!((vel.y - 200.0).abs() < 1.0);
    }

    #[test]
    fn velocity_forgets_old_samples() {
        let mut v = VelocityTracker::default();
        let t0 = Instant::now();
        v.push(Point::new(0.0, 0.0), t0);
        v.push(Point::new(500.0, 0.0), t0 + Duration::from_millis(300));
        assert_eq!(v.velocity(), Point::ZERO);
        v.push(Point::new(510.0, 0.0), t0 + Duration::from_millis(310));
        assert!((v.velocity().x - 1000.0).abs() < 1.0);
    }
}
