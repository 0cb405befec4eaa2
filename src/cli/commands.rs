//! CLI commands and argument parsing

use crate::output::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Harvest GitHub API data across a pool of tokens
#[derive(Parser, Debug)]
#[command(name = "gh-harvest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (YAML)
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one endpoint over a list of targets
    Harvest {
        /// Endpoint name (see `endpoints`)
        #[arg(short, long)]
        endpoint: String,

        /// Targets file: one identifier per line, or CSV with a `repository` column
        #[arg(short, long)]
        targets: PathBuf,

        /// Output file (default: <endpoint>.<format>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Checkpoint file; completed targets are skipped on the next run
        #[arg(long)]
        state: Option<PathBuf>,

        /// Finished targets per flush
        #[arg(long)]
        batch_size: Option<usize>,

        /// Output format (csv, jsonl)
        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Skip the initial token probe
        #[arg(long)]
        no_probe: bool,
    },

    /// Show remaining limits of every configured token
    Limits,

    /// List built-in endpoints
    Endpoints,
}
