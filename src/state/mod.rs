//! State management module
//!
//! Handles harvest checkpointing and resumability.
//! State is persisted between runs so an interrupted harvest can pick up
//! where its last flush left off.
//!
//! # Overview
//!
//! The state module provides:
//! - `HarvestState` - per-endpoint record of finished targets and resume cursors
//! - `StateManager` - File-based state persistence with atomic writes
//!
//! Progress is only recorded together with the rows it covers: the harvester
//! writes the checkpoint right after a successful flush.

mod manager;
mod types;

pub use manager::StateManager;
pub use types::{EndpointState, HarvestState, TargetCheckpoint};
