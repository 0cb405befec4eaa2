//! CLI module
//!
//! Command-line interface for running harvests.
//!
//! # Commands
//!
//! - `harvest` - Run an endpoint over a targets file
//! - `limits` - Probe and print per-token rate limits
//! - `endpoints` - List the built-in endpoint catalog

mod commands;
mod runner;

pub use commands::{Cli, Commands};
pub use runner::{format_limits, parse_targets, read_targets, Runner};
