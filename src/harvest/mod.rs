//! Harvest module
//!
//! Runs one endpoint over a list of targets and writes the rows out.
//!
//! # Overview
//!
//! The harvest module provides:
//! - `Harvester` - Per-target state machine with batched, append-only flushes
//! - `HarvestConfig` - Batch size, destination and token re-probe interval
//! - `HarvestReport` - Per-target outcomes and run totals
//!
//! Each target moves `Pending → Fetching → Paginating → Done | Skipped | Failed`.
//! A failing target never stops the run; failures are listed at the end.

mod harvester;
mod types;

pub use harvester::Harvester;
pub use types::{
    HarvestConfig, HarvestReport, TargetOutcome, TargetState, DEFAULT_BATCH_SIZE, DEFAULT_SYNC_WINDOW,
};

#[cfg(test)]
mod tests;
