#![forbid(unsafe_code)]

//! Haptic feedback policy.
//!
//! The gesture state machine reports state transitions ("threshold crossed",
//! "index changed") to a [`HapticCoordinator`], which decides whether the
//! device should buzz. Two rules apply:
//!
//! 1. [`HapticCoordinator::should_fire`]: fire only when haptics are enabled
//!    and the observed state actually changed.
//! 2. A global throttle (default 60 ms) across all kinds, so a fast drag
//!    through several classify targets does not saturate the motor.
//!
//! User preferences live in [`SharedHapticSettings`], a wait-free
//! `arc-swap` cell. The settings screen holds one clone, every coordinator
//! holds another; a change made anywhere is felt on the next event.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Strength class understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HapticIntensity {
    Light,
    Medium,
    Heavy,
}

/// Why a haptic is being considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HapticKind {
    /// Horizontal drag passed the shuffle threshold (once per session).
    SwipeThreshold,
    /// Upward drag passed the delete threshold.
    DeleteArmed,
    /// Upward drag fell back under the delete threshold.
    DeleteDisarmed,
    ClassifyEntered,
    ClassifyExited,
    /// Classify selection moved to another target.
    ClassifyIndex,
}

impl HapticKind {
    #[must_use]
    pub const fn intensity(self) -> HapticIntensity {
        match self {
            Self::SwipeThreshold | Self::DeleteArmed => HapticIntensity::Heavy,
            Self::ClassifyEntered => HapticIntensity::Medium,
            Self::DeleteDisarmed | Self::ClassifyExited | Self::ClassifyIndex => {
                HapticIntensity::Light
            }
        }
    }
}

/// Vibration capability. Fire-and-forget; implementations ignore calls when
/// no motor is available.
pub trait HapticDevice: Send + Sync {
    /// `strength` is the user preference in `[0, 1]`.
    fn fire(&self, intensity: HapticIntensity, strength: f32);
}

/// Device that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHaptics;

impl HapticDevice for NoHaptics {
    fn fire(&self, _intensity: HapticIntensity, _strength: f32) {}
}

/// Device that records every pulse; used by the replay tool and tests.
#[derive(Debug, Default)]
pub struct RecordingHaptics {
    pulses: Mutex<Vec<HapticIntensity>>,
}

impl RecordingHaptics {
    #[must_use]
    pub fn pulses(&self) -> Vec<HapticIntensity> {
        self.pulses.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.pulses.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl HapticDevice for RecordingHaptics {
    fn fire(&self, intensity: HapticIntensity, _strength: f32) {
        self.pulses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(intensity);
    }
}

/// User preference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HapticSettings {
    pub enabled: bool,
    /// Clamped to `[0, 1]` on store.
    pub strength: f32,
}

impl Default for HapticSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 0.7,
        }
    }
}

/// Shared, read-mostly [`HapticSettings`].
///
/// Clones share one cell. Reads never block writers.
#[derive(Debug, Clone)]
pub struct SharedHapticSettings {
    cell: Arc<ArcSwap<HapticSettings>>,
}

impl Default for SharedHapticSettings {
    fn default() -> Self {
        Self::new(HapticSettings::default())
    }
}

impl SharedHapticSettings {
    #[must_use]
    pub fn new(settings: HapticSettings) -> Self {
        Self {
            cell: Arc::new(ArcSwap::from_pointee(sanitize(settings))),
        }
    }

    #[inline]
    #[must_use]
    pub fn load(&self) -> HapticSettings {
        **self.cell.load()
    }

    pub fn store(&self, settings: HapticSettings) {
        self.cell.store(Arc::new(sanitize(settings)));
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.cell.rcu(|cur| HapticSettings { enabled, ..**cur });
    }

    pub fn set_strength(&self, strength: f32) {
        self.cell
            .rcu(|cur| sanitize(HapticSettings { strength, ..**cur }));
    }
}

fn sanitize(mut s: HapticSettings) -> HapticSettings {
    s.strength = if s.strength.is_finite() {
        s.strength.clamp(0.0, 1.0)
    } else {
        0.0
    };
    s
}

/// Decides and performs haptic pulses.
pub struct HapticCoordinator {
    device: Arc<dyn HapticDevice>,
    settings: SharedHapticSettings,
    throttle: Duration,
    last_fired: Option<Instant>,
    fired: u64,
    throttled: u64,
}

impl std::fmt::Debug for HapticCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HapticCoordinator")
            .field("settings", &self.settings.load())
            .field("throttle", &self.throttle)
            .field("fired", &self.fired)
            .field("throttled", &self.throttled)
            .finish()
    }
}

impl HapticCoordinator {
    /// Default minimum interval between pulses.
    pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(60);

    #[must_use]
    pub fn new(device: Arc<dyn HapticDevice>, settings: SharedHapticSettings) -> Self {
        Self {
            device,
            settings,
            throttle: Self::DEFAULT_THROTTLE,
            last_fired: None,
            fired: 0,
            throttled: 0,
        }
    }

    /// Coordinator that never fires.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(
            Arc::new(NoHaptics),
            SharedHapticSettings::new(HapticSettings {
                enabled: false,
                strength: 0.0,
            }),
        )
    }

    #[must_use]
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &SharedHapticSettings {
        &self.settings
    }

    /// Pulses delivered to the device.
    #[must_use]
    pub fn fired(&self) -> u64 {
        self.fired
    }

    /// Pulses dropped by the throttle.
    #[must_use]
    pub fn throttled(&self) -> u64 {
        self.throttled
    }

    /// Policy check, without side effects.
    #[must_use]
    pub fn should_fire<S: PartialEq>(&self, _kind: HapticKind, previous: S, new: S) -> bool {
        self.settings.load().enabled && previous != new
    }

    /// Fire `kind` if [`should_fire`](Self::should_fire) agrees and the
    /// throttle interval has elapsed. Returns whether the device fired.
    pub fn transition<S: PartialEq>(
        &mut self,
        kind: HapticKind,
        previous: S,
        new: S,
        now: Instant,
    ) -> bool {
        if !self.should_fire(kind, previous, new) {
            return false;
        }
        if let Some(last) = self.last_fired
            && now.saturating_duration_since(last) < self.throttle
        {
            self.throttled += 1;
            trace!(?kind, "haptic throttled");
            return false;
        }
        let settings = self.settings.load();
        self.device.fire(kind.intensity(), settings.strength);
        self.last_fired = Some(now);
        self.fired += 1;
        trace!(?kind, intensity = ?kind.intensity(), "haptic fired");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> (HapticCoordinator, Arc<RecordingHaptics>) {
        let device = Arc::new(RecordingHaptics::default());
        let coord = HapticCoordinator::new(device.clone(), SharedHapticSettings::default());
        (coord, device)
    }

    #[test]
    fn fires_only_on_change() {
        let (mut coord, device) = recording();
        let t = Instant::now();
        assert!(!coord.transition(HapticKind::ClassifyIndex, 2usize, 2usize, t));
        assert!(coord.transition(HapticKind::ClassifyIndex, 2usize, 3usize, t));
        assert_eq!(device.pulses(), vec![HapticIntensity::Light]);
    }

    #[test]
    fn throttle_applies_across_kinds() {
        let (mut coord, device) = recording();
        let t = Instant::now();
        assert!(coord.transition(HapticKind::ClassifyEntered, false, true, t));
        assert!(!coord.transition(
            HapticKind::ClassifyIndex,
            1usize,
            2usize,
            t + Duration::from_millis(30)
        ));
        assert!(coord.transition(
            HapticKind::ClassifyIndex,
            2usize,
            3usize,
            t + Duration::from_millis(61)
        ));
        assert_eq!(device.pulses().len(), 2);
        assert_eq!(coord.throttled(), 1);
    }

    #[test]
    fn disabling_through_shared_handle_is_felt_immediately() {
        let (mut coord, device) = recording();
        let handle = coord.settings().clone();
        handle.set_enabled(false);
        assert!(!coord.transition(HapticKind::DeleteArmed, false, true, Instant::now()));
        assert!(device.pulses().is_empty());
        handle.set_enabled(true);
        assert!(coord.transition(HapticKind::DeleteArmed, false, true, Instant::now()));
    }

    #[test]
    fn strength_is_clamped() {
        let s = SharedHapticSettings::default();
        s.set_strength(4.0);
        assert_eq!(s.load().strength, 1.0);
        s.set_strength(f32::NAN);
        assert_eq!(s.load().strength, 0.0);
        s.store(HapticSettings {
            enabled: true,
            strength: -1.0,
        });
        assert_eq!(s.load().strength, 0.0);
    }

    #[test]
    fn disabled_coordinator_never_fires() {
        let mut coord = HapticCoordinator::disabled();
        assert!(!coord.transition(HapticKind::SwipeThreshold, false, true, Instant::now()));
        assert_eq!(coord.fired(), 0);
    }

    #[test]
    fn settings_visible_across_threads() {
        let s = SharedHapticSettings::default();
        let writer = s.clone();
        std::thread::spawn(move || writer.set_strength(0.25))
            .join()
            .unwrap();
        assert_eq!(s.load().strength, 0.25);
    }
}
