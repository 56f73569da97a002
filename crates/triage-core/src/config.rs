#![forbid(unsafe_code)]

//! Tunable constants.
//!
//! Everything the swipe deck needs to feel right lives in [`TriageConfig`]:
//! thresholds as fractions of the screen, durations in milliseconds, mesh
//! resolution and warp shape. Every field has a default, so a TOML document
//! only needs the keys it changes:
//!
//! ```toml
//! [gesture]
//! velocity_threshold = 650.0
//!
//! [mesh]
//! rows = 16
//! cols = 32
//! ```
//!
//! Screen-relative values become pixels through
//! [`GestureConfig::resolve`], which yields [`SwipeThresholds`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::easing::Easing;
use crate::error::{Result, TriageError};
use crate::mesh::WarpParams;
use crate::raster::PrepareOptions;

const DEFAULT_CONFIG: &str = include_str!("default_config.toml");

/// The embedded default configuration document.
#[must_use]
pub fn default_config_toml() -> &'static str {
    DEFAULT_CONFIG
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub gesture: GestureConfig,
    pub animation: AnimationConfig,
    pub mesh: MeshConfig,
    pub haptics: HapticsConfig,
    pub preload: PreloadConfig,
}

/// Drag interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Horizontal commit distance, fraction of screen width.
    pub swipe_threshold: f32,
    /// Upward commit distance, fraction of screen height.
    pub delete_threshold: f32,
    /// Downward distance entering classify mode, fraction of screen height.
    pub classify_enter: f32,
    /// Downward distance leaving classify mode; must be below `classify_enter`.
    pub classify_exit: f32,
    /// Release speed (px/s) that commits regardless of distance.
    pub velocity_threshold: f32,
    /// Movement (dp) below which a press is still a tap and nothing locks.
    pub touch_slop: f32,
    /// A vertical lock needs `|dy| > lock_ratio · |dx|`.
    pub lock_ratio: f32,
    /// Movement (dp) that locks horizontally when no vertical lock applies.
    pub horizontal_lock_distance: f32,
    /// Horizontal distance (dp) per classify target step.
    pub tag_switch_distance: f32,
    /// Vertical follow factor while horizontally locked.
    pub horizontal_y_damping: f32,
    /// Horizontal follow factor while locked up.
    pub up_x_damping: f32,
    /// Horizontal follow factor while locked down.
    pub down_x_damping: f32,
    /// Card rotation at a full screen-width offset, before clamping.
    pub rotation_per_width: f32,
    pub max_rotation: f32,
    /// How long a classify commit may wait for a fresh tag measurement.
    pub anti_jitter_ms: u64,
    /// Pointer history used for release velocity.
    pub velocity_window_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            swipe_threshold: 0.25,
            delete_threshold: 0.08,
            classify_enter: 0.05,
            classify_exit: 0.03,
            velocity_threshold: 800.0,
            touch_slop: 8.0,
            lock_ratio: 1.5,
            horizontal_lock_distance: 20.0,
            tag_switch_distance: 18.0,
            horizontal_y_damping: 0.2,
            up_x_damping: 0.3,
            down_x_damping: 0.7,
            rotation_per_width: 40.0,
            max_rotation: 20.0,
            anti_jitter_ms: 120,
            velocity_window_ms: 100,
        }
    }
}

/// Physical screen description.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenMetrics {
    /// Pixels.
    pub width: f32,
    /// Pixels.
    pub height: f32,
    /// Pixels per density-independent pixel.
    pub density: f32,
}

impl Default for ScreenMetrics {
    fn default() -> Self {
        Self {
            width: 1080.0,
            height: 2340.0,
            density: 2.75,
        }
    }
}

impl ScreenMetrics {
    #[must_use]
    pub fn new(width: f32, height: f32, density: f32) -> Self {
        Self {
            width,
            height,
            density,
        }
    }
}

/// Gesture thresholds in pixels for one screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwipeThresholds {
    pub screen_width: f32,
    pub screen_height: f32,
    pub swipe: f32,
    pub delete: f32,
    pub classify_enter: f32,
    pub classify_exit: f32,
    /// px/s.
    pub velocity: f32,
    pub touch_slop: f32,
    pub lock_ratio: f32,
    pub horizontal_lock: f32,
    pub tag_switch: f32,
    pub horizontal_y_damping: f32,
    pub up_x_damping: f32,
    pub down_x_damping: f32,
    pub rotation_per_width: f32,
    pub max_rotation: f32,
}

impl Default for SwipeThresholds {
    fn default() -> Self {
        GestureConfig::default().resolve(ScreenMetrics::default())
    }
}

impl GestureConfig {
    /// Convert fractions and dp into pixels for `screen`.
    #[must_use]
    pub fn resolve(&self, screen: ScreenMetrics) -> SwipeThresholds {
        let width = screen.width.max(1.0);
        let height = screen.height.max(1.0);
        let density = if screen.density.is_finite() && screen.density > 0.0 {
            screen.density
        } else {
            1.0
        };
        SwipeThresholds {
            screen_width: width,
            screen_height: height,
            swipe: self.swipe_threshold * width,
            delete: self.delete_threshold * height,
            classify_enter: self.classify_enter * height,
            classify_exit: self.classify_exit * height,
            velocity: self.velocity_threshold,
            touch_slop: self.touch_slop * density,
            lock_ratio: self.lock_ratio,
            horizontal_lock: self.horizontal_lock_distance * density,
            tag_switch: (self.tag_switch_distance * density).max(1.0),
            horizontal_y_damping: self.horizontal_y_damping,
            up_x_damping: self.up_x_damping,
            down_x_damping: self.down_x_damping,
            rotation_per_width: self.rotation_per_width,
            max_rotation: self.max_rotation,
        }
    }

    #[must_use]
    pub fn anti_jitter(&self) -> Duration {
        Duration::from_millis(self.anti_jitter_ms)
    }

    #[must_use]
    pub fn velocity_window(&self) -> Duration {
        Duration::from_millis(self.velocity_window_ms)
    }
}

/// Durations and curves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub shuffle_ms: u64,
    pub genie_ms: u64,
    pub genie_easing: Easing,
    /// Genie progress at which the overlay starts fading out.
    pub overlay_fade_start: f32,
    /// Reset spring stiffness (unit mass).
    pub spring_stiffness: f32,
    /// Reset spring damping; `2·√stiffness` is critical.
    pub spring_damping: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            shuffle_ms: 120,
            genie_ms: 350,
            genie_easing: Easing::EaseOutCubic,
            overlay_fade_start: 0.82,
            spring_stiffness: 400.0,
            spring_damping: 40.0,
        }
    }
}

impl AnimationConfig {
    #[must_use]
    pub fn shuffle_duration(&self) -> Duration {
        Duration::from_millis(self.shuffle_ms)
    }

    #[must_use]
    pub fn genie_duration(&self) -> Duration {
        Duration::from_millis(self.genie_ms)
    }
}

/// Mesh resolution and warp shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub rows: usize,
    pub cols: usize,
    pub warp: WarpParams,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            rows: 12,
            cols: 24,
            warp: WarpParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HapticsConfig {
    pub enabled: bool,
    pub strength: f32,
    pub throttle_ms: u64,
}

impl Default for HapticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 0.7,
            throttle_ms: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    /// Longest side of a prepared raster.
    pub max_dim: u32,
    /// Bounded wait for an in-flight preload at commit time.
    pub await_timeout_ms: u64,
    /// Sources above this pixel count decode at twice the sample factor.
    pub large_source_pixels: u64,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            max_dim: 250,
            await_timeout_ms: 100,
            large_source_pixels: 12_000_000,
        }
    }
}

impl PreloadConfig {
    #[must_use]
    pub fn prepare_options(&self) -> PrepareOptions {
        PrepareOptions {
            max_dim: self.max_dim,
            large_source_pixels: self.large_source_pixels,
        }
    }

    #[must_use]
    pub fn await_timeout(&self) -> Duration {
        Duration::from_millis(self.await_timeout_ms)
    }
}

impl TriageConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TriageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values the state machine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let g = &self.gesture;
        let fractions = [
            ("gesture.swipe_threshold", g.swipe_threshold),
            ("gesture.delete_threshold", g.delete_threshold),
            ("gesture.classify_enter", g.classify_enter),
            ("gesture.classify_exit", g.classify_exit),
        ];
        for (field, v) in fractions {
            if !(v.is_finite() && v > 0.0 && v < 1.0) {
                return Err(TriageError::invalid(field, format!("{v} is not in (0, 1)")));
            }
        }
        if g.classify_exit >= g.classify_enter {
            return Err(TriageError::invalid(
                "gesture.classify_exit",
                format!(
                    "{} must be below classify_enter ({})",
                    g.classify_exit, g.classify_enter
                ),
            ));
        }
        let positive = [
            ("gesture.velocity_threshold", g.velocity_threshold),
            ("gesture.lock_ratio", g.lock_ratio),
            ("gesture.horizontal_lock_distance", g.horizontal_lock_distance),
            ("gesture.tag_switch_distance", g.tag_switch_distance),
            ("animation.spring_stiffness", self.animation.spring_stiffness),
        ];
        for (field, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err(TriageError::invalid(field, format!("{v} must be positive")));
            }
        }
        if !(g.touch_slop.is_finite() && g.touch_slop >= 0.0) {
            return Err(TriageError::invalid("gesture.touch_slop", "must be non-negative"));
        }
        if self.animation.shuffle_ms == 0 {
            return Err(TriageError::invalid("animation.shuffle_ms", "must be positive"));
        }
        if self.animation.genie_ms == 0 {
            return Err(TriageError::invalid("animation.genie_ms", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.animation.overlay_fade_start) {
            return Err(TriageError::invalid(
                "animation.overlay_fade_start",
                "must be within [0, 1]",
            ));
        }
        if self.mesh.rows == 0 || self.mesh.cols == 0 {
            return Err(TriageError::invalid("mesh", "rows and cols must be at least 1"));
        }
        if self.preload.max_dim == 0 {
            return Err(TriageError::invalid("preload.max_dim", "must be positive"));
        }
        Ok(())
    }
}
