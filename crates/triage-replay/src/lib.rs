#![forbid(unsafe_code)]

//! Deterministic replay harness for the triage card deck.
//!
//! Reads a recorded pointer [`script`], drives a
//! [`SwipeDeck`](triage_core::SwipeDeck) on a virtual clock with synthetic
//! rasters, and prints the resulting domain actions as JSON lines.

pub mod cli;
pub mod error;
pub mod replay;
pub mod script;

pub use cli::{run, run_from_env};
pub use error::{ReplayError, Result};
