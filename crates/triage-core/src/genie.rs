#![forbid(unsafe_code)]

//! Genie animation lifecycle.
//!
//! [`GenieAnimationController`] runs one animation at a time:
//!
//! ```text
//! Idle ──start / start_fallback──▶ Running ──progress reaches 1──▶ Idle
//!                                     └──────cancel / drop──────▶ Idle
//! ```
//!
//! A mesh run owns the [`Raster`] it draws. The raster is released (dropped)
//! exactly once: after the completion callback on normal completion, or
//! without calling it on cancellation. Ownership makes a double release
//! impossible.
//!
//! When no raster could be prepared the caller uses
//! [`GenieAnimationController::start_fallback`]: the card scales down, fades
//! and moves to the destination, and the same completion contract holds.
//!
//! # Invariants
//!
//! 1. `on_complete` runs at most once per run, and exactly once if the run
//!    reaches progress 1.
//! 2. Progress is non-decreasing within a run.
//! 3. The overlay is fully opaque before `overlay_fade_start` and fully
//!    transparent at progress 1.

use std::fmt;
use std::time::Duration;

use tracing::{debug, trace};

use crate::easing::{Easing, lerp, smoothstep};
use crate::error::{Result, TriageError};
use crate::geometry::{Point, Rect};
use crate::mesh::{MeshGrid, MeshWarpEngine, SuctionDirection};
use crate::raster::Raster;

/// Completion callback.
pub type OnComplete = Box<dyn FnOnce() + Send>;

/// Timeline shape shared by every run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenieTiming {
    pub easing: Easing,
    /// Eased progress at which the overlay starts fading.
    pub overlay_fade_start: f32,
    /// Scale reached by the fallback animation at progress 1.
    pub fallback_end_scale: f32,
}

impl Default for GenieTiming {
    fn default() -> Self {
        Self {
            easing: Easing::EaseOutCubic,
            overlay_fade_start: 0.82,
            fallback_end_scale: 0.2,
        }
    }
}

/// What the renderer draws for the current frame.
#[derive(Debug)]
pub enum GenieFrame<'a> {
    Mesh {
        raster: &'a Raster,
        grid: &'a MeshGrid,
        overlay_alpha: f32,
        progress: f32,
    },
    Fallback {
        /// Where the card's centre is drawn.
        center: Point,
        /// Card size at scale 1.
        size: (f32, f32),
        scale: f32,
        alpha: f32,
        progress: f32,
    },
}

/// Outcome of one [`GenieAnimationController::tick`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GenieTick {
    Idle,
    Running { progress: f32 },
    /// The run finished during this tick; `on_complete` has been called.
    Completed,
}

struct Run {
    raster: Option<Raster>,
    source: Rect,
    destination: Point,
    direction: SuctionDirection,
    duration: Duration,
    elapsed: Duration,
    on_complete: Option<OnComplete>,
}

/// Owns and drives at most one genie animation.
pub struct GenieAnimationController {
    engine: MeshWarpEngine,
    timing: GenieTiming,
    grid: MeshGrid,
    run: Option<Run>,
}

impl fmt::Debug for GenieAnimationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenieAnimationController")
            .field("running", &self.is_running())
            .field("progress", &self.progress())
            .field("resolution", &self.engine.resolution())
            .finish()
    }
}

impl GenieAnimationController {
    #[must_use]
    pub fn new(engine: MeshWarpEngine, timing: GenieTiming) -> Self {
        let (rows, cols) = engine.resolution();
        Self {
            engine,
            timing,
            grid: MeshGrid::new(rows, cols),
            run: None,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &MeshWarpEngine {
        &self.engine
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Whether the current run draws a mesh (false for fallback or idle).
    #[must_use]
    pub fn is_mesh(&self) -> bool {
        self.run.as_ref().is_some_and(|r| r.raster.is_some())
    }

    /// Eased progress of the current run, 0 when idle.
    #[must_use]
    pub fn progress(&self) -> f32 {
        self.run
            .as_ref()
            .map_or(0.0, |r| self.timing.easing.apply(time_fraction(r)))
    }

    /// Start a mesh run. The controller takes ownership of `raster`.
    ///
    /// Fails with [`TriageError::AnimationRunning`] if a run is in progress;
    /// the rejected raster is released.
    pub fn start(
        &mut self,
        raster: Raster,
        source: Rect,
        destination: Point,
        direction: SuctionDirection,
        duration: Duration,
        on_complete: OnComplete,
    ) -> Result<()> {
        self.begin(Some(raster), source, destination, direction, duration, on_complete)
    }

    /// Start the non-mesh scale/fade/translate run.
    pub fn start_fallback(
        &mut self,
        source: Rect,
        destination: Point,
        duration: Duration,
        on_complete: OnComplete,
    ) -> Result<()> {
        self.begin(
            None,
            source,
            destination,
            SuctionDirection::TowardBottom,
            duration,
            on_complete,
        )
    }

    fn begin(
        &mut self,
        raster: Option<Raster>,
        source: Rect,
        destination: Point,
        direction: SuctionDirection,
        duration: Duration,
        on_complete: OnComplete,
    ) -> Result<()> {
        if self.run.is_some() {
            return Err(TriageError::AnimationRunning);
        }
        debug!(
            mesh = raster.is_some(),
            ?direction,
            duration_ms = duration.as_millis() as u64,
            "genie started"
        );
        self.run = Some(Run {
            raster,
            source,
            destination,
            direction,
            duration,
            elapsed: Duration::ZERO,
            on_complete: Some(on_complete),
        });
        Ok(())
    }

    /// Advance the timeline. On reaching the end, calls `on_complete`,
    /// releases the raster and returns to idle.
    pub fn tick(&mut self, dt: Duration) -> GenieTick {
        let Some(run) = self.run.as_mut() else {
            return GenieTick::Idle;
        };
        run.elapsed = run.elapsed.saturating_add(dt).min(run.duration);
        if run.elapsed < run.duration {
            let progress = self.timing.easing.apply(time_fraction(run));
            trace!(progress, "genie tick");
            return GenieTick::Running { progress };
        }

        if let Some(mut run) = self.run.take() {
            if let Some(done) = run.on_complete.take() {
                done();
            }
            drop(run.raster.take());
        }
        debug!("genie completed");
        GenieTick::Completed
    }

    /// Stop the current run without calling its callback. The raster is
    /// released. Returns whether a run was cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.run.take() {
            Some(_) => {
                debug!("genie cancelled");
                true
            }
            None => false,
        }
    }

    /// Geometry for the current frame.
    pub fn frame(&mut self) -> Option<GenieFrame<'_>> {
        let run = self.run.as_ref()?;
        let progress = self.timing.easing.apply(time_fraction(run));
        match &run.raster {
            Some(raster) => {
                self.engine.warp_into(
                    &mut self.grid,
                    run.source,
                    run.destination,
                    progress,
                    run.direction,
                );
                Some(GenieFrame::Mesh {
                    raster,
                    grid: &self.grid,
                    overlay_alpha: overlay_alpha(progress, self.timing.overlay_fade_start),
                    progress,
                })
            }
            None => {
                let from = run.source.center();
                Some(GenieFrame::Fallback {
                    center: Point::new(
                        lerp(from.x, run.destination.x, progress),
                        lerp(from.y, run.destination.y, progress),
                    ),
                    size: (run.source.width, run.source.height),
                    scale: lerp(1.0, self.timing.fallback_end_scale, progress),
                    alpha: 1.0 - progress,
                    progress,
                })
            }
        }
    }
}

fn time_fraction(run: &Run) -> f32 {
    if run.duration.is_zero() {
        return 1.0;
    }
    (run.elapsed.as_secs_f32() / run.duration.as_secs_f32()).clamp(0.0, 1.0)
}

/// Overlay opacity: 1 until `fade_start`, then an S-curve down to 0 at 1.
#[must_use]
pub fn overlay_alpha(progress: f32, fade_start: f32) -> f32 {
    if progress <= fade_start {
        return 1.0;
    }
    let span = (1.0 - fade_start).max(f32::EPSILON);
    1.0 - smoothstep((progress - fade_start) / span)
}
