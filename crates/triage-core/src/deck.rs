#![forbid(unsafe_code)]

//! The swipe deck: gesture machine, preloads, animations and the card stack
//! wired together.
//!
//! [`SwipeDeck`] is what a host UI talks to. It takes pointer input and
//! frame ticks, and reports finished actions through [`TriageActions`].
//!
//! ```text
//! pointer ──▶ SwipeGestureStateMachine ──effects──▶ PreloadScheduler
//!                       │
//!                    Commit ──▶ ShuffleAnimator | GenieAnimationController
//!                                                 │ (tick)
//!                                          completion ──▶ TriageActions
//! ```
//!
//! # Commit paths
//!
//! - **Shuffle**: the card slides out, then the stack advances (or enters
//!   "batch complete").
//! - **Delete / classify**: the raster comes from the preload if ready,
//!   otherwise from a bounded wait on the in-flight preload, otherwise from
//!   a synchronous decode. With no raster at all the fallback animation
//!   runs. The domain action fires when the animation completes.
//! - **Classify anti-jitter**: a commit shortly after classify entry may
//!   wait (up to `anti_jitter_ms` after entry) for a tag position measured
//!   after entry before aiming. On expiry the layout estimate is used.
//!
//! # Failure Modes
//!
//! Nothing here returns an error. Failed decodes degrade to the fallback
//! animation and stale tag positions to estimates. A genie that refuses to
//! start abandons the commit with a warning; no action fires.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::{ScreenMetrics, TriageConfig};
use crate::genie::{GenieAnimationController, GenieFrame, GenieTick, GenieTiming, OnComplete};
use crate::geometry::{Point, Rect};
use crate::gesture::{
    CardTransform, CommitAction, GestureContext, GesturePhase, PointerInput,
    SwipeGestureStateMachine, SwipeEffect, VelocityTracker,
};
use crate::haptics::HapticCoordinator;
use crate::mesh::{MeshWarpEngine, SuctionDirection};
use crate::motion::{CardAnimation, ShuffleAnimator, SpringBack};
use crate::preload::{PreloadScheduler, PreloadSlot, PreloadStats};
use crate::raster::{ImageRef, Raster, RasterSource, prepare_raster};
use crate::stack::{AdvanceOutcome, CardStack};
use crate::tags::{TagBarGeometry, TagLayout, fresh_position, resolve_tag_destination};

/// Domain actions, invoked when a commit's animation has finished.
pub trait TriageActions {
    /// The stack moved by `delta` cards.
    fn on_advance(&mut self, delta: i32);
    fn on_remove(&mut self, image: &ImageRef);
    /// Classify into existing target `target_index` (1-based).
    fn on_classify(&mut self, image: &ImageRef, target_index: usize);
    /// Create a new target and classify into it.
    fn on_create_and_classify(&mut self, image: &ImageRef);
    /// Every card has been handled.
    fn on_batch_complete(&mut self) {}
    /// Release without a drag.
    fn on_tap(&mut self, _image: &ImageRef) {}
}

/// Screen-space positions the deck animates between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeckLayout {
    /// Resting bounds of the current card.
    pub card: Rect,
    /// Where deleted cards are sucked into.
    pub trash: Point,
    pub tag_bar: TagBarGeometry,
}

impl DeckLayout {
    /// A layout derived from screen size: card centred in the upper 80 %,
    /// trash icon near the top, tag bar along the bottom.
    #[must_use]
    pub fn for_screen(screen: ScreenMetrics) -> Self {
        let (w, h) = (screen.width, screen.height);
        let card = Rect::new(w * 0.08, h * 0.1, w * 0.84, h * 0.62);
        Self {
            card,
            trash: Point::new(w * 0.5, h * 0.04),
            tag_bar: TagBarGeometry {
                origin_x: w * 0.03,
                center_y: h * 0.9,
                chip_width: w * 0.22,
                spacing: w * 0.02,
                visible_width: w * 0.94,
            },
        }
    }
}

enum Completion {
    Removed(ImageRef),
    Classified(ImageRef, usize),
}

enum CardMotion {
    Shuffle(ShuffleAnimator),
    Spring(SpringBack),
}

impl CardMotion {
    fn as_animation(&self) -> &dyn CardAnimation {
        match self {
            Self::Shuffle(a) => a,
            Self::Spring(s) => s,
        }
    }
}

/// A classify commit waiting for a fresh tag measurement.
struct DeferredClassify {
    image: ImageRef,
    target_index: usize,
    entered_at: Instant,
    source: Rect,
    raster: Option<Raster>,
}

/// Interactive triage deck.
pub struct SwipeDeck<A: TriageActions> {
    config: TriageConfig,
    screen: ScreenMetrics,
    layout: DeckLayout,
    machine: SwipeGestureStateMachine,
    velocity: VelocityTracker,
    preload: PreloadScheduler,
    genie: GenieAnimationController,
    motion: Option<CardMotion>,
    stack: CardStack,
    tags: TagLayout,
    target_count: usize,
    deferred: Option<DeferredClassify>,
    done_tx: Sender<Completion>,
    done_rx: Receiver<Completion>,
    last_tick: Option<Instant>,
    actions: A,
}

impl<A: TriageActions> std::fmt::Debug for SwipeDeck<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwipeDeck")
            .field("phase", &self.machine.phase())
            .field("index", &self.stack.current_index())
            .field("complete", &self.stack.is_complete())
            .field("genie", &self.genie.is_running())
            .field("deferred", &self.deferred.is_some())
            .finish()
    }
}

impl<A: TriageActions> SwipeDeck<A> {
    /// Build a deck from a validated configuration.
    #[must_use]
    pub fn new(
        config: TriageConfig,
        screen: ScreenMetrics,
        source: Arc<dyn RasterSource>,
        haptics: HapticCoordinator,
        actions: A,
    ) -> Self {
        let haptics = haptics.with_throttle(Duration::from_millis(config.haptics.throttle_ms));
        let machine =
            SwipeGestureStateMachine::new(config.gesture.resolve(screen), haptics);
        let engine = MeshWarpEngine::new(config.mesh.rows, config.mesh.cols)
            .with_params(config.mesh.warp);
        let genie = GenieAnimationController::new(
            engine,
            GenieTiming {
                easing: config.animation.genie_easing,
                overlay_fade_start: config.animation.overlay_fade_start,
                ..GenieTiming::default()
            },
        );
        let (done_tx, done_rx) = mpsc::channel();
        Self {
            preload: PreloadScheduler::new(source, config.preload.prepare_options()),
            velocity: VelocityTracker::new(config.gesture.velocity_window()),
            layout: DeckLayout::for_screen(screen),
            config,
            screen,
            machine,
            genie,
            motion: None,
            stack: CardStack::default(),
            tags: TagLayout::new(),
            target_count: 0,
            deferred: None,
            done_tx,
            done_rx,
            last_tick: None,
            actions,
        }
    }

    #[must_use]
    pub fn with_layout(mut self, layout: DeckLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Replace the batch. Any gesture or animation in progress is dropped.
    pub fn load_batch(&mut self, images: Vec<ImageRef>) {
        self.reset();
        self.motion = None;
        self.stack.load(images);
    }

    /// Number of existing classification targets.
    pub fn set_target_count(&mut self, count: usize) {
        self.target_count = count;
    }

    /// Record a tag bar measurement.
    pub fn update_tag_position(&mut self, index: usize, bounds: Rect, measured_at: Instant) {
        self.tags.update(index, bounds, measured_at);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn actions(&self) -> &A {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut A {
        &mut self.actions
    }

    #[must_use]
    pub fn stack(&self) -> &CardStack {
        &self.stack
    }

    #[must_use]
    pub fn machine(&self) -> &SwipeGestureStateMachine {
        &self.machine
    }

    #[must_use]
    pub fn phase(&self) -> GesturePhase {
        self.machine.phase()
    }

    #[must_use]
    pub fn preload_stats(&self) -> PreloadStats {
        self.preload.stats()
    }

    #[must_use]
    pub fn has_preloaded(&self, slot: PreloadSlot) -> bool {
        self.preload.has_ready(slot)
    }

    #[must_use]
    pub fn is_genie_running(&self) -> bool {
        self.genie.is_running()
    }

    /// Whether a classify commit is waiting for a tag measurement.
    #[must_use]
    pub fn is_awaiting_tag(&self) -> bool {
        self.deferred.is_some()
    }

    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.genie.is_running() || self.motion.is_some() || self.deferred.is_some()
    }

    /// Transform the current card is drawn with.
    #[must_use]
    pub fn card_transform(&self) -> CardTransform {
        match &self.motion {
            Some(m) => m.as_animation().transform(),
            None => self.machine.transform(),
        }
    }

    /// Genie geometry for this frame, if one is running.
    pub fn genie_frame(&mut self) -> Option<GenieFrame<'_>> {
        self.genie.frame()
    }

    // -----------------------------------------------------------------------
    // Input
    // -----------------------------------------------------------------------

    pub fn pointer_down(&mut self, position: Point, now: Instant) {
        self.velocity.clear();
        self.velocity.push(position, now);
        self.feed(PointerInput::Down { position }, now);
    }

    pub fn pointer_move(&mut self, position: Point, now: Instant) {
        self.velocity.push(position, now);
        self.feed(PointerInput::Move { position }, now);
    }

    /// Release; velocity comes from the recent pointer samples.
    pub fn pointer_up(&mut self, position: Point, now: Instant) {
        self.velocity.push(position, now);
        let velocity = self.velocity.velocity();
        self.feed(PointerInput::Up { position, velocity }, now);
    }

    pub fn pointer_cancel(&mut self, now: Instant) {
        self.feed(PointerInput::Cancel, now);
    }

    /// Feed pre-built input (e.g. with a platform-supplied velocity).
    pub fn feed(&mut self, input: PointerInput, now: Instant) {
        if self.stack.is_complete() {
            trace!("input ignored: batch complete");
            return;
        }
        // A new touch abandons the spring-back.
        if matches!(input, PointerInput::Down { .. })
            && matches!(self.motion, Some(CardMotion::Spring(_)))
        {
            self.motion = None;
        }
        let was_animating = self.is_animating();
        let ctx = GestureContext {
            target_count: self.target_count,
            has_previous: self.stack.has_previous(),
        };
        let effects = self.machine.process(&input, &ctx, now);
        for effect in effects {
            self.apply_effect(effect, now);
        }
        self.preload.poll(self.machine.active_preload_slot());
        // A run started from idle measures its first frame from this input,
        // not from whenever the host last ticked.
        if !was_animating && self.is_animating() {
            self.last_tick = Some(now);
        }
    }

    /// Abandon any gesture, animation, deferred commit and preload. Pending
    /// completions are cancelled; their actions never fire.
    pub fn reset(&mut self) {
        self.genie.cancel();
        self.deferred = None;
        self.preload.cancel_all();
        let effects = self.machine.reset();
        self.machine.complete_commit();
        self.motion = None;
        for effect in effects {
            if let SwipeEffect::Reset { from } = effect {
                self.start_spring(from);
            }
        }
        while self.done_rx.try_recv().is_ok() {}
        self.last_tick = None;
    }

    // -----------------------------------------------------------------------
    // Frame tick
    // -----------------------------------------------------------------------

    /// Advance animations to `now` and deliver finished actions.
    pub fn tick(&mut self, now: Instant) {
        let dt = self
            .last_tick
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last_tick = Some(now);

        self.preload.poll(self.machine.active_preload_slot());

        if self.genie.tick(dt) == GenieTick::Completed {
            self.drain_completions();
        }
        // After the genie tick, so a resumed run starts at zero elapsed.
        self.resume_deferred(now);

        if let Some(motion) = self.motion.as_mut() {
            let done = match motion {
                CardMotion::Shuffle(a) => {
                    a.tick(dt);
                    a.is_complete().then_some(Some(a.delta()))
                }
                CardMotion::Spring(s) => {
                    s.tick(dt);
                    s.is_complete().then_some(None)
                }
            };
            if let Some(shuffle_delta) = done {
                self.motion = None;
                if let Some(delta) = shuffle_delta {
                    self.finish_shuffle(delta);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn apply_effect(&mut self, effect: SwipeEffect, now: Instant) {
        match effect {
            SwipeEffect::RequestPreload(slot) => {
                if let Some(image) = self.stack.current().cloned() {
                    self.preload.request(&image, slot);
                }
            }
            SwipeEffect::CancelPreload(slot) => self.preload.cancel(slot),
            SwipeEffect::Tap => {
                if let Some(image) = self.stack.current().cloned() {
                    self.actions.on_tap(&image);
                }
            }
            SwipeEffect::Reset { from } => {
                self.preload.cancel_all();
                self.start_spring(from);
            }
            SwipeEffect::Commit(action) => self.commit(action, now),
            SwipeEffect::Locked(direction) => trace!(?direction, "deck locked"),
            SwipeEffect::ClassifyEntered { .. }
            | SwipeEffect::ClassifyExited
            | SwipeEffect::ClassifySelection { .. } => {}
        }
    }

    fn start_spring(&mut self, from: CardTransform) {
        let a = &self.config.animation;
        let spring = SpringBack::new(from)
            .with_stiffness(a.spring_stiffness)
            .with_damping(a.spring_damping);
        self.motion = (!spring.is_complete()).then_some(CardMotion::Spring(spring));
    }

    fn card_bounds(&self) -> Rect {
        let tr = self.machine.transform();
        self.layout.card.translated(tr.offset_x, tr.offset_y)
    }

    fn commit(&mut self, action: CommitAction, now: Instant) {
        let Some(image) = self.stack.current().cloned() else {
            self.machine.complete_commit();
            return;
        };
        match action {
            CommitAction::Advance { delta } => {
                self.preload.cancel_all();
                self.motion = Some(CardMotion::Shuffle(ShuffleAnimator::new(
                    self.machine.transform(),
                    delta,
                    self.screen.width,
                    self.config.animation.shuffle_duration(),
                )));
            }
            CommitAction::Delete => {
                self.preload.cancel(PreloadSlot::Classify);
                let raster = self.obtain_raster(PreloadSlot::Delete, &image);
                let source = self.card_bounds();
                let destination = self.layout.trash;
                self.launch_genie(
                    raster,
                    source,
                    destination,
                    SuctionDirection::TowardTop,
                    Completion::Removed(image),
                );
            }
            CommitAction::Classify {
                target_index,
                entered_at,
            } => {
                self.preload.cancel(PreloadSlot::Delete);
                let raster = self.obtain_raster(PreloadSlot::Classify, &image);
                let source = self.card_bounds();
                let window = self.config.gesture.anti_jitter();
                let fresh = fresh_position(&self.tags, target_index, entered_at).is_some();
                if !fresh && now.saturating_duration_since(entered_at) < window {
                    debug!(target_index, "classify deferred for tag measurement");
                    self.deferred = Some(DeferredClassify {
                        image,
                        target_index,
                        entered_at,
                        source,
                        raster,
                    });
                    return;
                }
                self.launch_classify(image, target_index, entered_at, source, raster);
            }
        }
    }

    fn resume_deferred(&mut self, now: Instant) {
        let Some(pending) = self.deferred.as_ref() else {
            return;
        };
        let fresh = fresh_position(&self.tags, pending.target_index, pending.entered_at).is_some();
        let expired =
            now.saturating_duration_since(pending.entered_at) >= self.config.gesture.anti_jitter();
        if !(fresh || expired) {
            return;
        }
        if let Some(d) = self.deferred.take() {
            self.launch_classify(d.image, d.target_index, d.entered_at, d.source, d.raster);
        }
    }

    fn launch_classify(
        &mut self,
        image: ImageRef,
        target_index: usize,
        entered_at: Instant,
        source: Rect,
        raster: Option<Raster>,
    ) {
        let target = resolve_tag_destination(&self.tags, &self.layout.tag_bar, target_index, entered_at);
        if !target.measured {
            warn!(target_index, "classify aiming at estimated tag position");
        }
        self.launch_genie(
            raster,
            source,
            target.point,
            SuctionDirection::TowardBottom,
            Completion::Classified(image, target_index),
        );
    }

    /// Preloaded raster, else a bounded wait, else a synchronous decode.
    fn obtain_raster(&mut self, slot: PreloadSlot, image: &ImageRef) -> Option<Raster> {
        if let Some(raster) = self.preload.take_ready(slot, image.id) {
            trace!(?slot, "using preloaded raster");
            return Some(raster);
        }
        if self.preload.is_pending(slot) {
            let timeout = self.config.preload.await_timeout();
            if let Some(raster) = self.preload.await_ready(slot, image.id, timeout) {
                return Some(raster);
            }
        }
        let raster = prepare_raster(
            self.preload.source().as_ref(),
            image,
            self.preload.options(),
        );
        if raster.is_none() {
            warn!(id = image.id, "no raster for genie; using fallback animation");
        }
        raster
    }

    fn launch_genie(
        &mut self,
        raster: Option<Raster>,
        source: Rect,
        destination: Point,
        direction: SuctionDirection,
        completion: Completion,
    ) {
        let tx = self.done_tx.clone();
        let on_complete: OnComplete = Box::new(move || {
            let _ = tx.send(completion);
        });
        let duration = self.config.animation.genie_duration();
        let started = match raster {
            Some(raster) => {
                self.genie
                    .start(raster, source, destination, direction, duration, on_complete)
            }
            None => self
                .genie
                .start_fallback(source, destination, duration, on_complete),
        };
        if let Err(err) = started {
            // The rejected callback was dropped unsent; nothing will fire.
            warn!(error = %err, "genie refused to start");
            self.machine.complete_commit();
        }
    }

    fn drain_completions(&mut self) {
        while let Ok(done) = self.done_rx.try_recv() {
            match done {
                Completion::Removed(image) => {
                    self.actions.on_remove(&image);
                }
                Completion::Classified(image, 0) => self.actions.on_create_and_classify(&image),
                Completion::Classified(image, index) => self.actions.on_classify(&image, index),
            }
            self.stack.remove_current();
            if self.stack.is_complete() {
                self.actions.on_batch_complete();
            }
            self.machine.complete_commit();
        }
    }

    fn finish_shuffle(&mut self, delta: i32) {
        match self.stack.advance(delta) {
            AdvanceOutcome::Moved { index } => {
                debug!(delta, index, "shuffled");
                self.actions.on_advance(delta);
            }
            AdvanceOutcome::BatchComplete => {
                self.actions.on_advance(delta);
                self.actions.on_batch_complete();
            }
            AdvanceOutcome::Ignored => {}
        }
        self.machine.complete_commit();
    }
}

// ---------------------------------------------------------------------------
// RecordingActions
// ---------------------------------------------------------------------------

/// One delivered domain action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeckEvent {
    Advanced { delta: i32 },
    Removed { id: u64 },
    Classified { id: u64, target_index: usize },
    CreatedAndClassified { id: u64 },
    BatchComplete,
    Tapped { id: u64 },
}

/// [`TriageActions`] that only records what happened.
#[derive(Debug, Clone, Default)]
pub struct RecordingActions {
    events: Vec<DeckEvent>,
}

impl RecordingActions {
    #[must_use]
    pub fn events(&self) -> &[DeckEvent] {
        &self.events
    }

    /// Take the recorded events, leaving the log empty.
    pub fn drain(&mut self) -> Vec<DeckEvent> {
        std::mem::take(&mut self.events)
    }
}

impl TriageActions for RecordingActions {
    fn on_advance(&mut self, delta: i32) {
        self.events.push(DeckEvent::Advanced { delta });
    }

    fn on_remove(&mut self, image: &ImageRef) {
        self.events.push(DeckEvent::Removed { id: image.id });
    }

    fn on_classify(&mut self, image: &ImageRef, target_index: usize) {
        self.events.push(DeckEvent::Classified {
            id: image.id,
            target_index,
        });
    }

    fn on_create_and_classify(&mut self, image: &ImageRef) {
        self.events
            .push(DeckEvent::CreatedAndClassified { id: image.id });
    }

    fn on_batch_complete(&mut self) {
        self.events.push(DeckEvent::BatchComplete);
    }

    fn on_tap(&mut self, image: &ImageRef) {
        self.events.push(DeckEvent::Tapped { id: image.id });
    }
}
