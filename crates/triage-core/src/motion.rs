#![forbid(unsafe_code)]

//! Card motion outside the genie effect: the spring-back after a failed
//! commit and the short shuffle when cycling cards.
//!
//! Both implement [`CardAnimation`]: advance with [`CardAnimation::tick`],
//! read the card with [`CardAnimation::transform`].
//!
//! # Spring-back
//!
//! [`SpringBack`] integrates a damped spring on the *remaining fraction* of
//! the displacement (1 → 0) with semi-implicit Euler, in steps of at most
//! 4 ms so large frame gaps stay stable. With the default stiffness 400 and
//! damping 40 the spring is critically damped: fastest return, no overshoot.
//!
//! # Failure Modes
//!
//! - Huge `dt`: subdivided, never a single explosive step.
//! - Non-positive stiffness is raised to a small minimum; the spring still
//!   converges, slowly.

use std::time::Duration;

use crate::easing::{ease_in_out_cubic, lerp};
use crate::gesture::CardTransform;

const MAX_STEP_SECS: f32 = 0.004;
const REST_POSITION: f32 = 0.001;
const REST_VELOCITY: f32 = 0.01;
const MIN_STIFFNESS: f32 = 0.1;

/// Time-driven card motion.
pub trait CardAnimation {
    fn tick(&mut self, dt: Duration);
    fn is_complete(&self) -> bool;
    fn transform(&self) -> CardTransform;
}

fn mix(from: CardTransform, to: CardTransform, t: f32) -> CardTransform {
    CardTransform {
        offset_x: lerp(from.offset_x, to.offset_x, t),
        offset_y: lerp(from.offset_y, to.offset_y, t),
        rotation_deg: lerp(from.rotation_deg, to.rotation_deg, t),
        alpha: lerp(from.alpha, to.alpha, t),
        scale: lerp(from.scale, to.scale, t),
    }
}

// ---------------------------------------------------------------------------
// SpringBack
// ---------------------------------------------------------------------------

/// Returns a card to [`CardTransform::NEUTRAL`].
#[derive(Debug, Clone)]
pub struct SpringBack {
    from: CardTransform,
    /// Fraction of `from`'s displacement still applied.
    remaining: f32,
    velocity: f32,
    stiffness: f32,
    damping: f32,
    at_rest: bool,
}

impl SpringBack {
    /// Critically damped spring for the default stiffness.
    #[must_use]
    pub fn new(from: CardTransform) -> Self {
        Self {
            from,
            remaining: 1.0,
            velocity: 0.0,
            stiffness: 400.0,
            damping: 40.0,
            at_rest: from.is_neutral(),
        }
    }

    #[must_use]
    pub fn with_stiffness(mut self, k: f32) -> Self {
        self.stiffness = if k.is_finite() { k.max(MIN_STIFFNESS) } else { MIN_STIFFNESS };
        self
    }

    #[must_use]
    pub fn with_damping(mut self, c: f32) -> Self {
        self.damping = if c.is_finite() { c.max(0.0) } else { 0.0 };
        self
    }

    /// Damping that makes this spring critically damped.
    #[must_use]
    pub fn critical_damping(&self) -> f32 {
        2.0 * self.stiffness.sqrt()
    }

    /// Fraction of the release displacement still applied.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    fn step(&mut self, dt: f32) {
        let accel = -self.stiffness * self.remaining - self.damping * self.velocity;
        self.velocity += accel * dt;
        self.remaining += self.velocity * dt;
    }
}

impl CardAnimation for SpringBack {
    fn tick(&mut self, dt: Duration) {
        if self.at_rest {
            return;
        }
        let mut left = dt.as_secs_f32();
        while left > 0.0 {
            let h = left.min(MAX_STEP_SECS);
            self.step(h);
            left -= h;
        }
        if self.remaining.abs() < REST_POSITION && self.velocity.abs() < REST_VELOCITY {
            self.remaining = 0.0;
            self.velocity = 0.0;
            self.at_rest = true;
        }
    }

    fn is_complete(&self) -> bool {
        self.at_rest
    }

    fn transform(&self) -> CardTransform {
        if self.at_rest {
            return CardTransform::NEUTRAL;
        }
        mix(CardTransform::NEUTRAL, self.from, self.remaining)
    }
}

// ---------------------------------------------------------------------------
// ShuffleAnimator
// ---------------------------------------------------------------------------

/// Slides the current card off-screen after a horizontal commit.
///
/// `delta = +1` (next) exits to the left, `-1` (previous) to the right.
#[derive(Debug, Clone)]
pub struct ShuffleAnimator {
    from: CardTransform,
    to: CardTransform,
    delta: i32,
    duration: Duration,
    elapsed: Duration,
}

impl ShuffleAnimator {
    #[must_use]
    pub fn new(from: CardTransform, delta: i32, screen_width: f32, duration: Duration) -> Self {
        let side = if delta > 0 { -1.0 } else { 1.0 };
        let to = CardTransform {
            offset_x: side * screen_width.abs(),
            offset_y: from.offset_y,
            rotation_deg: side * 20.0,
            alpha: 0.0,
            scale: 1.0,
        };
        Self {
            from,
            to,
            delta,
            duration,
            elapsed: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn delta(&self) -> i32 {
        self.delta
    }

    /// Linear time fraction in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
    }
}

impl CardAnimation for ShuffleAnimator {
    fn tick(&mut self, dt: Duration) {
        self.elapsed = self.elapsed.saturating_add(dt).min(self.duration);
    }

    fn is_complete(&self) -> bool {
        self.elapsed >= self.duration
    }

    fn transform(&self) -> CardTransform {
        mix(self.from, self.to, ease_in_out_cubic(self.progress()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dragged() -> CardTransform {
        CardTransform {
            offset_x: 120.0,
            offset_y: -40.0,
            rotation_deg: 6.0,
            ..CardTransform::NEUTRAL
        }
    }

    #[test]
    fn spring_back_settles_at_neutral() {
        let mut s = SpringBack::new(dragged());
        for _ in 0..120 {
            s.tick(Duration::from_millis(16));
        }
        assert!(s.is_complete());
        assert!(s.transform().is_neutral());
    }

    #[test]
    fn default_spring_is_critically_damped_and_never_overshoots() {
        let mut s = SpringBack::new(dragged());
        assert_eq!(s.critical_damping(), 40.0);
        let mut prev = s.remaining();
        for _ in 0..200 {
            s.tick(Duration::from_millis(8));
            assert!(s.remaining() >= -1e-4, "overshoot: {}", s.remaining());
            assert!(s.remaining() <= prev + 1e-6);
            prev = s.remaining();
        }
    }

    #[test]
    fn spring_survives_large_dt() {
        let mut s = SpringBack::new(dragged()).with_stiffness(2000.0).with_damping(90.0);
        s.tick(Duration::from_secs(2));
        assert!(s.is_complete());
    }

    #[test]
    fn neutral_start_is_already_complete() {
        assert!(SpringBack::new(CardTransform::NEUTRAL).is_complete());
    }

    #[test]
    fn shuffle_next_exits_left() {
        let mut a = ShuffleAnimator::new(dragged(), 1, 1000.0, Duration::from_millis(120));
        assert_eq!(a.transform(), dragged());
        a.tick(Duration::from_millis(60));
        assert!(!a.is_complete());
        a.tick(Duration::from_millis(60));
        assert!(a.is_complete());
        let end = a.transform();
        assert_eq!(end.offset_x, -1000.0);
        assert_eq!(end.alpha, 0.0);
    }

    #[test]
    fn shuffle_previous_exits_right() {
        let mut a = ShuffleAnimator::new(CardTransform::NEUTRAL, -1, 1000.0, Duration::from_millis(120));
        a.tick(Duration::from_secs(1));
        assert_eq!(a.transform().offset_x, 1000.0);
        assert_eq!(a.progress(), 1.0);
    }

    #[test]
    fn zero_duration_shuffle_is_immediately_complete() {
        let a = ShuffleAnimator::new(CardTransform::NEUTRAL, 1, 500.0, Duration::ZERO);
        assert!(a.is_complete());
        assert_eq!(a.progress(), 1.0);
    }
}
