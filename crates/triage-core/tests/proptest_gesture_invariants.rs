//! Property-based invariant tests for the swipe gesture state machine.
//!
//! 1. A locked direction never changes within a session
//! 2. Classify enters only above the upper threshold and exits only below
//!    the lower one
//! 3. The selected target index stays within `[0, target_count]`
//! 4. A release yields exactly one of: tap, commit, reset
//! 5. Branch transforms stay on their side (up never positive, down never
//!    negative)

use std::time::{Duration, Instant};

use proptest::prelude::*;
use triage_core::config::{GestureConfig, ScreenMetrics};
use triage_core::gesture::{
    GestureContext, LockedDirection, PointerInput, SwipeEffect, SwipeGestureStateMachine,
};
use triage_core::haptics::HapticCoordinator;
use triage_core::Point;

// 1000 × 2000 px at density 1: classify enter 100, exit 60.
const ENTER: f32 = 100.0;
const EXIT: f32 = 60.0;

fn machine() -> SwipeGestureStateMachine {
    let t = GestureConfig::default().resolve(ScreenMetrics::new(1000.0, 2000.0, 1.0));
    SwipeGestureStateMachine::new(t, HapticCoordinator::disabled())
}

fn path_strategy() -> impl Strategy<Value = Vec<(f32, f32)>> {
    proptest::collection::vec((-600.0f32..600.0, -600.0f32..600.0), 1..40)
}

fn ctx(targets: usize) -> GestureContext {
    GestureContext {
        target_count: targets,
        has_previous: true,
    }
}

proptest! {
    #[test]
    fn lock_is_immutable_within_session(
        path in path_strategy(),
        targets in 0usize..6,
    ) {
        let mut m = machine();
        let c = ctx(targets);
        let t0 = Instant::now();
        let origin = Point::new(500.0, 1000.0);
        m.process(&PointerInput::Down { position: origin }, &c, t0);
        let mut locked = LockedDirection::None;
        for (i, (dx, dy)) in path.iter().enumerate() {
            let position = Point::new(origin.x + dx, origin.y + dy);
            let now = t0 + Duration::from_millis(16 * (i as u64 + 1));
            m.process(&PointerInput::Move { position }, &c, now);
            let current = m.locked_direction();
            if locked.is_locked() {
                prop_assert_eq!(current, locked);
            }
            locked = current;
            if current == LockedDirection::Down {
                prop_assert!(targets > 0);
            }
        }
    }

    #[test]
    fn classify_hysteresis_and_index_bounds(
        path in path_strategy(),
        targets in 1usize..6,
    ) {
        let mut m = machine();
        let c = ctx(targets);
        let t0 = Instant::now();
        let origin = Point::new(500.0, 600.0);
        m.process(&PointerInput::Down { position: origin }, &c, t0);
        // Force a downward lock first.
        m.process(&PointerInput::Move { position: Point::new(500.0, 630.0) }, &c, t0);
        prop_assume!(m.locked_direction() == LockedDirection::Down);

        let mut was_active = m.classify().active;
        for (i, (dx, dy)) in path.iter().enumerate() {
            let position = Point::new(origin.x + dx, origin.y + dy);
            let now = t0 + Duration::from_millis(16 * (i as u64 + 1));
            m.process(&PointerInput::Move { position }, &c, now);
            let offset_y = m.transform().offset_y;
            prop_assert!(offset_y >= 0.0);
            let active = m.classify().active;
            if active && !was_active {
                prop_assert!(offset_y > ENTER);
            }
            if !active && was_active {
                prop_assert!(offset_y < EXIT);
            }
            prop_assert!(m.classify().selected_index <= targets);
            was_active = active;
        }
    }

    #[test]
    fn up_branch_never_moves_card_down(path in path_strategy()) {
        let mut m = machine();
        let c = ctx(0);
        let t0 = Instant::now();
        let origin = Point::new(500.0, 1000.0);
        m.process(&PointerInput::Down { position: origin }, &c, t0);
        m.process(&PointerInput::Move { position: Point::new(500.0, 960.0) }, &c, t0);
        prop_assert_eq!(m.locked_direction(), LockedDirection::Up);
        for (dx, dy) in path {
            let position = Point::new(origin.x + dx, origin.y + dy);
            m.process(&PointerInput::Move { position }, &c, t0);
            prop_assert!(m.transform().offset_y <= 0.0);
        }
    }

    #[test]
    fn release_resolves_to_exactly_one_outcome(
        path in path_strategy(),
        targets in 0usize..4,
        vx in -3000.0f32..3000.0,
        vy in -3000.0f32..3000.0,
    ) {
        let mut m = machine();
        let c = ctx(targets);
        let t0 = Instant::now();
        let origin = Point::new(500.0, 1000.0);
        let mut effects = m.process(&PointerInput::Down { position: origin }, &c, t0);
        let mut last = origin;
        for (dx, dy) in &path {
            last = Point::new(origin.x + dx, origin.y + dy);
            effects.extend(m.process(&PointerInput::Move { position: last }, &c, t0));
        }
        let release = m.process(
            &PointerInput::Up { position: last, velocity: Point::new(vx, vy) },
            &c,
            t0,
        );
        let outcomes = release
            .iter()
            .filter(|e| matches!(e, SwipeEffect::Tap | SwipeEffect::Commit(_) | SwipeEffect::Reset { .. }))
            .count();
        prop_assert_eq!(outcomes, 1);
    }
}
