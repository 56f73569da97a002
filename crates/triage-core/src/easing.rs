#![forbid(unsafe_code)]

//! Easing curves and a table-driven sine.
//!
//! Everything here is a pure function of its inputs. Curves take a
//! normalized time `t` and return a normalized value; inputs outside
//! `[0, 1]` are clamped first, so every curve maps `0 -> 0` and `1 -> 1`
//! exactly.
//!
//! The mesh warp evaluates a sine per grid row per frame, so [`fast_sin`]
//! reads a quarter-wave lookup table with linear interpolation instead of
//! calling `f32::sin`. The table is built once on first use.

use std::f32::consts::FRAC_PI_2;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Signature shared by every curve in this module.
pub type EasingFn = fn(f32) -> f32;

#[inline]
fn clamp01(t: f32) -> f32 {
    if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) }
}

/// Linear interpolation. Exact at both endpoints (`t == 0` yields `a`,
/// `t == 1` yields `b`), which the mesh identity/convergence checks rely on.
#[inline]
#[must_use]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// Identity curve.
#[inline]
#[must_use]
pub fn linear(t: f32) -> f32 {
    clamp01(t)
}

/// Cubic Hermite S-curve: `3t² - 2t³`.
#[inline]
#[must_use]
pub fn smoothstep(t: f32) -> f32 {
    let t = clamp01(t);
    t * t * (3.0 - 2.0 * t)
}

/// Quintic S-curve with zero first and second derivatives at both ends.
#[inline]
#[must_use]
pub fn smootherstep(t: f32) -> f32 {
    let t = clamp01(t);
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

/// Fast start, slow arrival.
#[inline]
#[must_use]
pub fn ease_out_cubic(t: f32) -> f32 {
    let inv = 1.0 - clamp01(t);
    1.0 - inv * inv * inv
}

#[inline]
#[must_use]
pub fn ease_in_out_cubic(t: f32) -> f32 {
    let t = clamp01(t);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        let u = -2.0 * t + 2.0;
        1.0 - u * u * u / 2.0
    }
}

/// Curve selector used by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    Smoothstep,
    #[default]
    Smootherstep,
    EaseOutCubic,
    EaseInOutCubic,
}

impl Easing {
    #[must_use]
    pub fn as_fn(self) -> EasingFn {
        match self {
            Self::Linear => linear,
            Self::Smoothstep => smoothstep,
            Self::Smootherstep => smootherstep,
            Self::EaseOutCubic => ease_out_cubic,
            Self::EaseInOutCubic => ease_in_out_cubic,
        }
    }

    #[inline]
    #[must_use]
    pub fn apply(self, t: f32) -> f32 {
        (self.as_fn())(t)
    }
}

// ---------------------------------------------------------------------------
// Table sine
// ---------------------------------------------------------------------------

/// Table resolution per quarter wave.
const QUARTER_STEPS: usize = 256;

static QUARTER_SINE: OnceLock<[f32; QUARTER_STEPS + 1]> = OnceLock::new();

fn quarter_table() -> &'static [f32; QUARTER_STEPS + 1] {
    QUARTER_SINE.get_or_init(|| {
        let mut table = [0.0f32; QUARTER_STEPS + 1];
        for (i, slot) in table.iter_mut().enumerate() {
            let angle = (i as f64 / QUARTER_STEPS as f64) * std::f64::consts::FRAC_PI_2;
            *slot = angle.sin() as f32;
        }
        table[0] = 0.0;
        table[QUARTER_STEPS] = 1.0;
        table
    })
}

/// `sin(t · π/2)` for `t` in `[0, 1]`, read from the table.
///
/// Monotonic non-decreasing, exactly 0 at `t = 0` and exactly 1 at `t = 1`.
#[must_use]
pub fn quarter_sine(t: f32) -> f32 {
    let pos = clamp01(t) * QUARTER_STEPS as f32;
    let idx = pos as usize;
    if idx >= QUARTER_STEPS {
        return 1.0;
    }
    let table = quarter_table();
    let frac = pos - idx as f32;
    lerp(table[idx], table[idx + 1], frac)
}

/// Table-driven sine of an angle in radians. Non-finite input yields 0.
#[must_use]
pub fn fast_sin(radians: f32) -> f32 {
    if !radians.is_finite() {
        return 0.0;
    }
    let quarters = (radians / FRAC_PI_2).rem_euclid(4.0);
    let quadrant = (quarters as u32).min(3);
    let frac = quarters - quadrant as f32;
    match quadrant {
        0 => quarter_sine(frac),
        1 => quarter_sine(1.0 - frac),
        2 => -quarter_sine(frac),
        _ => -quarter_sine(1.0 - frac),
    }
}

/// Table-driven cosine.
#[inline]
#[must_use]
pub fn fast_cos(radians: f32) -> f32 {
    fast_sin(radians + FRAC_PI_2)
}

/// Half-sine ramp `(1 - cos(π·s)) / 2`, computed as `sin²(π·s/2)`.
///
/// Rises from 0 to 1 over `[0, 1]` with zero slope at both ends; used to
/// shape how strongly each mesh row bows toward the sink.
#[inline]
#[must_use]
pub fn half_sine_ramp(s: f32) -> f32 {
    let q = quarter_sine(s);
    q * q
}
