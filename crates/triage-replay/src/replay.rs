//! Drive a [`SwipeDeck`] from a [`Script`] on a virtual clock.
//!
//! Frames are ticked every 16 ms of script time between events, and after
//! the last event until every animation has settled (bounded by
//! [`SETTLE_LIMIT`]). Each delivered action is written as one JSON line,
//! stamped with the script time of the frame that delivered it.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};
use triage_core::deck::{DeckEvent, RecordingActions, SwipeDeck};
use triage_core::haptics::{HapticCoordinator, RecordingHaptics, SharedHapticSettings};
use triage_core::preload::PreloadStats;
use triage_core::thumbnail_cache::MemoryRasterSource;
use triage_core::{ImageRef, Point, PointerInput, Rect, TriageConfig};

use crate::error::Result;
use crate::script::{Script, ScriptAction};

pub const FRAME: Duration = Duration::from_millis(16);
pub const SETTLE_LIMIT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct ActionLine {
    t_ms: u64,
    #[serde(flatten)]
    event: DeckEvent,
}

/// Totals printed after the last action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub actions: usize,
    pub remaining: usize,
    pub batch_complete: bool,
    pub haptic_pulses: usize,
    pub preload_requested: u64,
    pub preload_accepted: u64,
    pub preload_discarded: u64,
    pub preload_cancelled: u64,
    pub end_ms: u64,
}

struct Clock {
    origin: Instant,
    now_ms: u64,
}

impl Clock {
    fn at(&self, ms: u64) -> Instant {
        self.origin + Duration::from_millis(ms)
    }
}

/// Replay `script`, writing one JSON line per action to `out`.
pub fn replay<W: Write>(script: &Script, config: TriageConfig, out: &mut W) -> Result<ReplaySummary> {
    let source = build_source(script);
    let device = Arc::new(RecordingHaptics::default());
    let settings = SharedHapticSettings::default();
    settings.set_enabled(config.haptics.enabled);
    settings.set_strength(config.haptics.strength);
    let haptics = HapticCoordinator::new(device.clone(), settings);

    let mut deck = SwipeDeck::new(
        config,
        script.screen,
        Arc::new(source),
        haptics,
        RecordingActions::default(),
    );
    deck.load_batch(
        script
            .images
            .iter()
            .map(|img| ImageRef::new(img.id, format!("mem://{}", img.id)))
            .collect(),
    );
    deck.set_target_count(script.target_count);

    let mut clock = Clock {
        origin: Instant::now(),
        now_ms: 0,
    };
    let mut actions = 0;
    deck.tick(clock.at(0));

    for event in &script.events {
        advance_to(&mut deck, &mut clock, event.t_ms, out, &mut actions)?;
        let now = clock.at(event.t_ms);
        apply(&mut deck, &event.action, now);
        actions += flush(&mut deck, event.t_ms, out)?;
    }

    let deadline = clock.now_ms + SETTLE_LIMIT.as_millis() as u64;
    while deck.is_animating() && clock.now_ms < deadline {
        let next = clock.now_ms + FRAME.as_millis() as u64;
        advance_to(&mut deck, &mut clock, next, out, &mut actions)?;
    }
    if deck.is_animating() {
        info!(end_ms = clock.now_ms, "replay ended with an animation still running");
    }

    let stats: PreloadStats = deck.preload_stats();
    let stack = deck.stack();
    let summary = ReplaySummary {
        actions,
        remaining: if stack.is_complete() {
            0
        } else {
            stack.len() - stack.current_index()
        },
        batch_complete: stack.is_complete(),
        haptic_pulses: device.pulses().len(),
        preload_requested: stats.requested,
        preload_accepted: stats.accepted,
        preload_discarded: stats.discarded,
        preload_cancelled: stats.cancelled,
        end_ms: clock.now_ms,
    };
    debug!(?summary, "replay finished");
    Ok(summary)
}

fn build_source(script: &Script) -> MemoryRasterSource {
    script
        .images
        .iter()
        .fold(MemoryRasterSource::new(32), |src, img| {
            if img.broken {
                src.with_broken_image(img.id, img.width, img.height)
            } else {
                src.with_image(img.id, img.width, img.height)
            }
        })
}

/// Tick frames up to (and including) `target_ms`.
fn advance_to<W: Write>(
    deck: &mut SwipeDeck<RecordingActions>,
    clock: &mut Clock,
    target_ms: u64,
    out: &mut W,
    actions: &mut usize,
) -> Result<()> {
    let frame = FRAME.as_millis() as u64;
    while clock.now_ms + frame <= target_ms {
        clock.now_ms += frame;
        deck.tick(clock.at(clock.now_ms));
        *actions += flush(deck, clock.now_ms, out)?;
    }
    if clock.now_ms < target_ms {
        clock.now_ms = target_ms;
        deck.tick(clock.at(target_ms));
        *actions += flush(deck, target_ms, out)?;
    }
    Ok(())
}

fn apply(deck: &mut SwipeDeck<RecordingActions>, action: &ScriptAction, now: Instant) {
    match *action {
        ScriptAction::Down { x, y } => deck.pointer_down(Point::new(x, y), now),
        ScriptAction::Move { x, y } => deck.pointer_move(Point::new(x, y), now),
        ScriptAction::Up { x, y, vx: None, vy: None } => deck.pointer_up(Point::new(x, y), now),
        ScriptAction::Up { x, y, vx, vy } => deck.feed(
            PointerInput::Up {
                position: Point::new(x, y),
                velocity: Point::new(vx.unwrap_or(0.0), vy.unwrap_or(0.0)),
            },
            now,
        ),
        ScriptAction::Cancel => deck.pointer_cancel(now),
        ScriptAction::Tag {
            index,
            x,
            y,
            width,
            height,
        } => deck.update_tag_position(index, Rect::new(x, y, width, height), now),
        ScriptAction::Targets { count } => deck.set_target_count(count),
        ScriptAction::Reset => deck.reset(),
    }
}

fn flush<W: Write>(deck: &mut SwipeDeck<RecordingActions>, t_ms: u64, out: &mut W) -> Result<usize> {
    let events = deck.actions_mut().drain();
    for event in &events {
        serde_json::to_writer(&mut *out, &ActionLine { t_ms, event: *event })?;
        out.write_all(b"\n")?;
    }
    Ok(events.len())
}
