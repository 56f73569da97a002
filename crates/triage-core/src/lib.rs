#![forbid(unsafe_code)]

//! Core: swipe gesture resolution, genie mesh warp and raster preloading
//! for a card-stack photo triage UI.
//!
//! # Role
//! `triage-core` is everything behind the card stack except drawing. A host
//! feeds it pointer input and frame ticks; it answers with card transforms,
//! genie mesh frames and finished domain actions.
//!
//! # Primary responsibilities
//! - **SwipeGestureStateMachine**: direction locking, thresholds, classify
//!   sub-mode with hysteresis, commit/reset decisions.
//! - **MeshWarpEngine**: the genie deformation of a card into a point.
//! - **GenieAnimationController**: one timed mesh (or fallback) run with a
//!   single completion callback.
//! - **PreloadScheduler**: background raster preparation with cancellation.
//! - **HapticCoordinator**: state-change-only, throttled feedback pulses.
//! - **SwipeDeck**: the glue a UI talks to.
//!
//! # How it fits together
//! [`deck::SwipeDeck`] routes [`gesture::SwipeEffect`]s to the preload
//! scheduler and the animators, and reports completions through
//! [`deck::TriageActions`]. Everything below the deck is usable on its own;
//! the mesh engine in particular is pure.

pub mod cancellation;
pub mod config;
pub mod deck;
pub mod easing;
pub mod error;
pub mod genie;
pub mod geometry;
pub mod gesture;
pub mod haptics;
pub mod mesh;
pub mod motion;
pub mod preload;
pub mod raster;
pub mod stack;
pub mod tags;
pub mod thumbnail_cache;

pub use config::{ScreenMetrics, SwipeThresholds, TriageConfig};
pub use deck::{DeckEvent, DeckLayout, RecordingActions, SwipeDeck, TriageActions};
pub use error::{Result, TriageError};
pub use geometry::{Point, Rect};
pub use gesture::{
    CardTransform, CommitAction, GestureContext, GesturePhase, LockedDirection, PointerInput,
    SwipeEffect, SwipeGestureStateMachine,
};
pub use mesh::{MeshGrid, MeshWarpEngine, SuctionDirection, WarpParams};
pub use raster::{ImageRef, Raster};
