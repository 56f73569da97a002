//! Recorded pointer scripts.
//!
//! A script is a JSON document:
//!
//! ```json
//! {
//!   "screen": { "width": 1080, "height": 2340, "density": 2.75 },
//!   "images": [ { "id": 1, "width": 4000, "height": 3000 } ],
//!   "target_count": 3,
//!   "events": [
//!     { "t_ms": 0,   "kind": "down", "x": 540, "y": 1200 },
//!     { "t_ms": 16,  "kind": "move", "x": 500, "y": 1200 },
//!     { "t_ms": 120, "kind": "up",   "x": 200, "y": 1200 }
//!   ]
//! }
//! ```
//!
//! `up` may carry `vx`/`vy` (px/s) to override the tracked release velocity.
//! Event times must be non-decreasing.

use std::path::Path;

use serde::{Deserialize, Serialize};
use triage_core::ScreenMetrics;

use crate::error::{ReplayError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub screen: ScreenMetrics,
    pub images: Vec<ScriptImage>,
    #[serde(default)]
    pub target_count: usize,
    pub events: Vec<ScriptEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptImage {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    /// Decoding always fails (exercises the fallback animation).
    #[serde(default)]
    pub broken: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptEvent {
    pub t_ms: u64,
    #[serde(flatten)]
    pub action: ScriptAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptAction {
    Down {
        x: f32,
        y: f32,
    },
    Move {
        x: f32,
        y: f32,
    },
    Up {
        x: f32,
        y: f32,
        #[serde(default)]
        vx: Option<f32>,
        #[serde(default)]
        vy: Option<f32>,
    },
    Cancel,
    /// A tag bar layout pass measured chip `index`.
    Tag {
        index: usize,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Targets {
        count: usize,
    },
    Reset,
}

impl Script {
    pub fn from_json(text: &str) -> Result<Self> {
        let script: Self = serde_json::from_str(text)?;
        script.validate()?;
        Ok(script)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.images.is_empty() {
            return Err(ReplayError::script("no images"));
        }
        if let Some(pair) = self.events.windows(2).find(|w| w[1].t_ms < w[0].t_ms) {
            return Err(ReplayError::script(format!(
                "event at {} ms follows event at {} ms",
                pair[1].t_ms, pair[0].t_ms
            )));
        }
        let s = self.screen;
        if !(s.width > 0.0 && s.height > 0.0 && s.density > 0.0) {
            return Err(ReplayError::script("screen dimensions must be positive"));
        }
        Ok(())
    }
}
