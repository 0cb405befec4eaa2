//! gh-harvest CLI
//!
//! Command-line interface for harvesting GitHub API data

use clap::Parser;
use gh_harvest::cli::{Cli, Runner};
use gh_harvest::shutdown::{install_ctrl_c_handler, ShutdownCoordinator};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG directives still apply on top
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let shutdown = ShutdownCoordinator::shared();
    install_ctrl_c_handler(shutdown.clone());

    Runner::new(cli).with_shutdown(shutdown).run().await?;
    Ok(())
}
