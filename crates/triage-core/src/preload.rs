#![forbid(unsafe_code)]

//! Best-effort background raster preparation ahead of a commit.
//!
//! When a drag locks toward delete or enters classify mode, the deck asks
//! the [`PreloadScheduler`] to prepare a small raster of the current image
//! so the genie animation can start without waiting for a decode.
//!
//! # Invariants
//!
//! 1. At most one request is in flight per [`PreloadSlot`]. A second request
//!    for a busy slot is a no-op.
//! 2. A result is kept only if, when it is collected, the slot still matches
//!    the active slot passed to [`PreloadScheduler::poll`]. Otherwise it is
//!    dropped on the spot, which releases its pixel memory.
//! 3. Every request carries a generation number; results from a cancelled
//!    or superseded request never land in a slot.
//!
//! # Failure Modes
//!
//! - Decode failure: the slot is cleared and the caller falls back to a
//!   synchronous [`prepare_raster`] or the non-mesh animation.
//! - Worker thread cannot be spawned: logged, treated as a failed request.
//! - [`PreloadScheduler::await_ready`] times out: the request is cancelled
//!   and `None` returned; the commit is never blocked longer than the
//!   timeout.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::cancellation::{CancellationSource, CancellationToken};
use crate::raster::{ImageRef, PrepareOptions, Raster, RasterSource, prepare_raster};

/// Which commit a preload is speculating on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreloadSlot {
    /// Swipe up: delete.
    Delete,
    /// Swipe down into classify mode.
    Classify,
}

impl PreloadSlot {
    const ALL: [PreloadSlot; 2] = [PreloadSlot::Delete, PreloadSlot::Classify];

    #[inline]
    const fn index(self) -> usize {
        match self {
            Self::Delete => 0,
            Self::Classify => 1,
        }
    }
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadStats {
    pub requested: u64,
    pub accepted: u64,
    /// Results dropped because their slot was no longer active.
    pub discarded: u64,
    pub failed: u64,
    pub cancelled: u64,
}

struct Outcome {
    slot: PreloadSlot,
    generation: u64,
    raster: Option<Raster>,
}

struct Pending {
    generation: u64,
    image_id: u64,
    cancel: CancellationSource,
}

struct Ready {
    image_id: u64,
    raster: Raster,
}

/// Background raster preparation keyed by [`PreloadSlot`].
pub struct PreloadScheduler {
    source: Arc<dyn RasterSource>,
    options: PrepareOptions,
    pending: [Option<Pending>; 2],
    ready: [Option<Ready>; 2],
    tx: Sender<Outcome>,
    rx: Receiver<Outcome>,
    next_generation: u64,
    stats: PreloadStats,
}

impl std::fmt::Debug for PreloadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreloadScheduler")
            .field("pending_delete", &self.is_pending(PreloadSlot::Delete))
            .field("pending_classify", &self.is_pending(PreloadSlot::Classify))
            .field("stats", &self.stats)
            .finish()
    }
}

impl PreloadScheduler {
    #[must_use]
    pub fn new(source: Arc<dyn RasterSource>, options: PrepareOptions) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            source,
            options,
            pending: [None, None],
            ready: [None, None],
            tx,
            rx,
            next_generation: 1,
            stats: PreloadStats::default(),
        }
    }

    /// The raster source, for synchronous fallback preparation.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn RasterSource> {
        &self.source
    }

    #[must_use]
    pub fn options(&self) -> PrepareOptions {
        self.options
    }

    #[must_use]
    pub fn stats(&self) -> PreloadStats {
        self.stats
    }

    #[must_use]
    pub fn is_pending(&self, slot: PreloadSlot) -> bool {
        self.pending[slot.index()].is_some()
    }

    #[must_use]
    pub fn has_ready(&self, slot: PreloadSlot) -> bool {
        self.ready[slot.index()].is_some()
    }

    /// Start preparing `image` for `slot` on a worker thread.
    ///
    /// Returns `false` (and does nothing) if the slot already has a request
    /// in flight or already holds a raster for the same image.
    pub fn request(&mut self, image: &ImageRef, slot: PreloadSlot) -> bool {
        let i = slot.index();
        if self.pending[i].is_some() {
            trace!(?slot, "preload already pending");
            return false;
        }
        if let Some(ready) = &self.ready[i] {
            if ready.image_id == image.id {
                return false;
            }
            self.ready[i] = None;
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let cancel = CancellationSource::new();
        let token = cancel.token();
        let source = Arc::clone(&self.source);
        let options = self.options;
        let tx = self.tx.clone();
        let job_image = image.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("triage-preload-{}", generation))
            .spawn(move || run_job(source.as_ref(), &job_image, options, slot, generation, &token, &tx));
        if let Err(err) = spawned {
            warn!(?slot, error = %err, "preload worker spawn failed");
            self.stats.failed += 1;
            return false;
        }

        debug!(?slot, id = image.id, generation, "preload requested");
        self.stats.requested += 1;
        self.pending[i] = Some(Pending {
            generation,
            image_id: image.id,
            cancel,
        });
        true
    }

    /// Cancel any in-flight request for `slot` and release its raster.
    pub fn cancel(&mut self, slot: PreloadSlot) {
        let i = slot.index();
        if let Some(pending) = self.pending[i].take() {
            pending.cancel.cancel();
            self.stats.cancelled += 1;
            debug!(?slot, generation = pending.generation, "preload cancelled");
        }
        if self.ready[i].take().is_some() {
            trace!(?slot, "preloaded raster released");
        }
    }

    pub fn cancel_all(&mut self) {
        for slot in PreloadSlot::ALL {
            self.cancel(slot);
        }
    }

    /// Collect finished work. Results whose slot differs from `active` are
    /// released instead of stored.
    pub fn poll(&mut self, active: Option<PreloadSlot>) {
        while let Ok(outcome) = self.rx.try_recv() {
            self.apply(outcome, active);
        }
    }

    /// Take the prepared raster for `slot`, if `image_id` matches.
    pub fn take_ready(&mut self, slot: PreloadSlot, image_id: u64) -> Option<Raster> {
        let i = slot.index();
        match self.ready[i].take() {
            Some(ready) if ready.image_id == image_id => Some(ready.raster),
            Some(_) => {
                debug!(?slot, "preloaded raster belongs to another image");
                None
            }
            None => None,
        }
    }

    /// Wait up to `timeout` for the slot's result.
    ///
    /// Returns the raster when it is (or becomes) available for `image_id`.
    /// On timeout the request is cancelled so a late result is released.
    pub fn await_ready(
        &mut self,
        slot: PreloadSlot,
        image_id: u64,
        timeout: Duration,
    ) -> Option<Raster> {
        self.poll(Some(slot));
        if !self.is_pending(slot) {
            return self.take_ready(slot, image_id);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(outcome) => {
                    self.apply(outcome, Some(slot));
                    if !self.is_pending(slot) {
                        return self.take_ready(slot, image_id);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(?slot, timeout_ms = timeout.as_millis() as u64, "preload wait timed out");
                    self.cancel(slot);
                    return None;
                }
                // Unreachable while `self.tx` is alive; handled for completeness.
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn apply(&mut self, outcome: Outcome, active: Option<PreloadSlot>) {
        let Outcome {
            slot,
            generation,
            raster,
        } = outcome;
        let i = slot.index();
        let current = self.pending[i]
            .as_ref()
            .filter(|p| p.generation == generation)
            .map(|p| p.image_id);
        let Some(image_id) = current else {
            if raster.is_some() {
                self.stats.discarded += 1;
                trace!(?slot, generation, "superseded preload result released");
            }
            return;
        };
        self.pending[i] = None;

        match raster {
            None => {
                self.stats.failed += 1;
                debug!(?slot, generation, "preload produced no raster");
            }
            Some(raster) if active == Some(slot) => {
                self.stats.accepted += 1;
                debug!(?slot, generation, "preload ready");
                self.ready[i] = Some(Ready { image_id, raster });
            }
            Some(raster) => {
                self.stats.discarded += 1;
                warn!(?slot, ?active, "stale preload discarded");
                drop(raster);
            }
        }
    }
}

impl Drop for PreloadScheduler {
    fn drop(&mut self) {
        for pending in self.pending.iter().flatten() {
            pending.cancel.cancel();
        }
    }
}

fn run_job(
    source: &dyn RasterSource,
    image: &ImageRef,
    options: PrepareOptions,
    slot: PreloadSlot,
    generation: u64,
    token: &CancellationToken,
    tx: &Sender<Outcome>,
) {
    if token.is_cancelled() {
        return;
    }
    let raster = prepare_raster(source, image, options);
    if token.is_cancelled() {
        // Dropping here releases the raster without a round-trip.
        return;
    }
    // A closed channel means the scheduler is gone; the raster drops with the
    // unsent message.
    let _ = tx.send(Outcome {
        slot,
        generation,
        raster,
    });
}
