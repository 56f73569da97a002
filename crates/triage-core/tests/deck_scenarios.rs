//! End-to-end deck scenarios: pointer input in, domain actions out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::Level;
use triage_core::deck::{DeckEvent, RecordingActions, SwipeDeck};
use triage_core::haptics::{HapticCoordinator, RecordingHaptics, SharedHapticSettings};
use triage_core::preload::PreloadSlot;
use triage_core::raster::{DecodeOptions, ImageRef, Raster, RasterInfo, RasterRecycler, RasterSource};
use triage_core::thumbnail_cache::MemoryRasterSource;
use triage_core::{GesturePhase, Point, PointerInput, ScreenMetrics, TriageConfig};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::DEBUG)
        .try_init();
}

// 1000 × 2000 px at density 1: swipe 250, velocity 800, tag switch 18.
fn screen() -> ScreenMetrics {
    ScreenMetrics::new(1000.0, 2000.0, 1.0)
}

fn images(n: u64) -> Vec<ImageRef> {
    (0..n).map(|i| ImageRef::new(i, format!("mem://{i}"))).collect()
}

fn memory_source(n: u64) -> Arc<MemoryRasterSource> {
    let mut src = MemoryRasterSource::new(16);
    for i in 0..n {
        src = src.with_image(i, 1600, 1200);
    }
    Arc::new(src)
}

fn deck_on(
    config: TriageConfig,
    source: Arc<dyn RasterSource>,
    haptics: HapticCoordinator,
    n: u64,
) -> SwipeDeck<RecordingActions> {
    let mut deck = SwipeDeck::new(config, screen(), source, haptics, RecordingActions::default());
    deck.load_batch(images(n));
    deck
}

fn deck(n: u64) -> SwipeDeck<RecordingActions> {
    init_tracing();
    deck_on(
        TriageConfig::default(),
        memory_source(n),
        HapticCoordinator::disabled(),
        n,
    )
}

fn ms(t0: Instant, n: u64) -> Instant {
    t0 + Duration::from_millis(n)
}

fn run_for(deck: &mut SwipeDeck<RecordingActions>, from: Instant, millis: u64) -> Instant {
    let mut now = from;
    deck.tick(now);
    for _ in 0..millis / 16 + 1 {
        now += Duration::from_millis(16);
        deck.tick(now);
    }
    now
}

/// Horizontal release at `offset_x` with a platform-reported velocity.
fn fling(deck: &mut SwipeDeck<RecordingActions>, t0: Instant, offset_x: f32, vx: f32) {
    let origin = Point::new(500.0, 1000.0);
    let end = Point::new(origin.x + offset_x, origin.y);
    deck.feed(PointerInput::Down { position: origin }, t0);
    deck.feed(PointerInput::Move { position: end }, ms(t0, 40));
    deck.feed(
        PointerInput::Up {
            position: end,
            velocity: Point::new(vx, 0.0),
        },
        ms(t0, 60),
    );
}

// ── Velocity OR-gate ────────────────────────────────────────────────────

#[test]
fn short_fast_fling_commits() {
    let mut d = deck(3);
    let t0 = Instant::now();
    fling(&mut d, t0, -100.0, -900.0);
    assert_eq!(d.phase(), GesturePhase::Committing);
    run_for(&mut d, ms(t0, 60), 300);
    assert_eq!(d.actions().events(), &[DeckEvent::Advanced { delta: 1 }]);
}

#[test]
fn short_slow_fling_springs_back() {
    let mut d = deck(3);
    let t0 = Instant::now();
    fling(&mut d, t0, -100.0, -500.0);
    assert_eq!(d.phase(), GesturePhase::Idle);
    run_for(&mut d, ms(t0, 60), 1000);
    assert!(d.actions().events().is_empty());
    assert!(d.card_transform().is_neutral());
    assert_eq!(d.stack().current_index(), 0);
}

// ── Batch completion ────────────────────────────────────────────────────

#[test]
fn next_from_last_card_completes_batch() {
    let mut d = deck(3);
    let mut now = Instant::now();
    for _ in 0..3 {
        fling(&mut d, now, -300.0, 0.0);
        now = run_for(&mut d, ms(now, 60), 300);
    }
    assert_eq!(
        d.actions().events(),
        &[
            DeckEvent::Advanced { delta: 1 },
            DeckEvent::Advanced { delta: 1 },
            DeckEvent::Advanced { delta: 1 },
            DeckEvent::BatchComplete,
        ]
    );
    assert!(d.stack().is_complete());
    assert_eq!(d.stack().visible(), [None, None, None]);
}

#[test]
fn previous_on_first_card_springs_back() {
    let mut d = deck(2);
    let t0 = Instant::now();
    fling(&mut d, t0, 300.0, 0.0);
    assert_eq!(d.phase(), GesturePhase::Idle);
    run_for(&mut d, ms(t0, 60), 1000);
    assert!(d.actions().events().is_empty());
}

// ── Classify selection ──────────────────────────────────────────────────

#[test]
fn tag_switch_counts_steps_from_entry_and_clamps() {
    let mut d = deck(2);
    d.set_target_count(3);
    let t0 = Instant::now();
    d.pointer_down(Point::new(100.0, 500.0), t0);
    d.pointer_move(Point::new(100.0, 530.0), ms(t0, 30));
    d.pointer_move(Point::new(100.0, 650.0), ms(t0, 60));
    assert!(d.machine().classify().active);
    assert_eq!(d.machine().classify().selected_index, 1);
    // 54 px right of entry at 18 px per step: 1 + 3, clamped to 3 targets.
    d.pointer_move(Point::new(154.0, 650.0), ms(t0, 90));
    assert_eq!(d.machine().classify().selected_index, 3);
    d.pointer_move(Point::new(82.0, 650.0), ms(t0, 120));
    assert_eq!(d.machine().classify().selected_index, 0);
}

// ── Haptics ─────────────────────────────────────────────────────────────

#[test]
fn swipe_threshold_pulses_once_and_respects_settings() {
    let device = Arc::new(RecordingHaptics::default());
    let settings = SharedHapticSettings::default();
    let haptics = HapticCoordinator::new(device.clone(), settings.clone());
    let mut d = deck_on(TriageConfig::default(), memory_source(3), haptics, 3);
    let t0 = Instant::now();
    d.pointer_down(Point::new(600.0, 1000.0), t0);
    d.pointer_move(Point::new(300.0, 1000.0), ms(t0, 200));
    d.pointer_move(Point::new(250.0, 1000.0), ms(t0, 400));
    d.pointer_move(Point::new(320.0, 1000.0), ms(t0, 600));
    assert_eq!(device.pulses().len(), 1);
    d.pointer_cancel(ms(t0, 700));

    settings.set_enabled(false);
    let t1 = ms(t0, 2000);
    d.pointer_down(Point::new(600.0, 1000.0), t1);
    d.pointer_move(Point::new(300.0, 1000.0), ms(t1, 200));
    assert_eq!(device.pulses().len(), 1);
}

// ── Configuration ───────────────────────────────────────────────────────

#[test]
fn configured_threshold_changes_commit_distance() {
    let config = TriageConfig::from_toml_str("[gesture]\nswipe_threshold = 0.1\n").unwrap();
    let mut d = deck_on(config, memory_source(3), HapticCoordinator::disabled(), 3);
    let t0 = Instant::now();
    fling(&mut d, t0, -150.0, 0.0);
    assert_eq!(d.phase(), GesturePhase::Committing);
}

// ── Stale preloads ──────────────────────────────────────────────────────

#[derive(Default)]
struct Released(AtomicUsize);

impl RasterRecycler for Released {
    fn recycle(&self, _info: RasterInfo) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Decodes only when the test opens the gate.
struct GatedSource {
    gate: Mutex<Receiver<()>>,
    released: Arc<Released>,
}

impl RasterSource for GatedSource {
    fn lookup(&self, _key: &str, _max_dim: u32) -> Option<Raster> {
        None
    }

    fn probe(&self, _image: &ImageRef) -> Option<(u32, u32)> {
        Some((200, 200))
    }

    fn decode(&self, _image: &ImageRef, options: DecodeOptions) -> Option<Raster> {
        let _ = self.gate.lock().unwrap().recv();
        Some(
            Raster::solid(200, 200, options.depth, 0)?
                .with_recycler(self.released.clone() as Arc<dyn RasterRecycler>),
        )
    }
}

fn gated() -> (Arc<GatedSource>, SyncSender<()>, Arc<Released>) {
    init_tracing();
    let (tx, rx) = mpsc::sync_channel(4);
    let released = Arc::new(Released::default());
    let src = Arc::new(GatedSource {
        gate: Mutex::new(rx),
        released: Arc::clone(&released),
    });
    (src, tx, released)
}

fn wait_for<F: FnMut() -> bool>(mut f: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !f() {
        assert!(Instant::now() < deadline, "condition not reached");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn abandoned_preload_is_released_and_never_assigned() {
    let (src, gate, released) = gated();
    let mut d = deck_on(TriageConfig::default(), src, HapticCoordinator::disabled(), 2);
    let t0 = Instant::now();

    d.pointer_down(Point::new(500.0, 1200.0), t0);
    d.pointer_move(Point::new(500.0, 1100.0), ms(t0, 50));
    assert_eq!(d.preload_stats().requested, 1);
    d.pointer_cancel(ms(t0, 60));

    gate.send(()).unwrap();
    let mut now = ms(t0, 60);
    wait_for(|| {
        now += Duration::from_millis(16);
        d.tick(now);
        released.0.load(Ordering::SeqCst) == 1
    });
    d.tick(now + Duration::from_millis(16));
    assert!(!d.has_preloaded(PreloadSlot::Delete));
    assert_eq!(d.preload_stats().accepted, 0);
    assert_eq!(d.preload_stats().cancelled, 1);
}

#[test]
fn preload_for_a_direction_left_mid_gesture_is_released() {
    let (src, gate, released) = gated();
    let mut d = deck_on(TriageConfig::default(), src, HapticCoordinator::disabled(), 2);
    d.set_target_count(2);
    let t0 = Instant::now();

    // Enter classify (requests the classify preload), then back out.
    d.pointer_down(Point::new(500.0, 500.0), t0);
    d.pointer_move(Point::new(500.0, 530.0), ms(t0, 30));
    d.pointer_move(Point::new(500.0, 650.0), ms(t0, 60));
    assert_eq!(d.preload_stats().requested, 1);
    d.pointer_move(Point::new(500.0, 540.0), ms(t0, 90));
    assert!(!d.machine().classify().active);

    gate.send(()).unwrap();
    let mut now = ms(t0, 90);
    wait_for(|| {
        now += Duration::from_millis(16);
        d.tick(now);
        released.0.load(Ordering::SeqCst) == 1
    });
    assert!(!d.has_preloaded(PreloadSlot::Classify));
    assert_eq!(d.preload_stats().accepted, 0);
}

#[test]
fn classify_preload_resolving_after_up_lock_is_released_not_assigned() {
    let (src, gate, released) = gated();
    let mut d = deck_on(TriageConfig::default(), src, HapticCoordinator::disabled(), 2);
    d.set_target_count(2);
    let t0 = Instant::now();

    // Session 1: classify entered, then backed out and released.
    d.pointer_down(Point::new(500.0, 500.0), t0);
    d.pointer_move(Point::new(500.0, 530.0), ms(t0, 30));
    d.pointer_move(Point::new(500.0, 650.0), ms(t0, 60));
    d.pointer_move(Point::new(500.0, 520.0), ms(t0, 90));
    d.pointer_up(Point::new(500.0, 520.0), ms(t0, 300));
    assert_eq!(d.phase(), GesturePhase::Idle);

    // Session 2 locks upward while the classify decode is still blocked.
    let t1 = ms(t0, 400);
    d.pointer_down(Point::new(500.0, 1200.0), t1);
    d.pointer_move(Point::new(500.0, 1100.0), ms(t1, 30));
    assert_eq!(d.preload_stats().requested, 2);

    gate.send(()).unwrap();
    gate.send(()).unwrap();
    let mut now = ms(t1, 30);
    wait_for(|| {
        now += Duration::from_millis(16);
        d.tick(now);
        d.has_preloaded(PreloadSlot::Delete)
    });
    wait_for(|| released.0.load(Ordering::SeqCst) == 1);
    assert!(!d.has_preloaded(PreloadSlot::Classify));
    assert_eq!(d.preload_stats().accepted, 1);
}
