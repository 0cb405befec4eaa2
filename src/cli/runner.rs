//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands};
use crate::config::Settings;
use crate::endpoint::{catalog, find};
use crate::error::{Error, Result, ResultExt};
use crate::harvest::{HarvestReport, Harvester};
use crate::http::{HttpClient, RequestExecutor};
use crate::output::OutputFormat;
use crate::shutdown::{ShutdownCoordinator, SharedShutdown};
use crate::state::StateManager;
use crate::token::{renews_in, TokenSnapshot};
use crate::types::{unix_now, ApiClass, UnixTime};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Column read from CSV targets files
const TARGET_COLUMN: &str = "repository";

/// CLI runner
pub struct Runner {
    cli: Cli,
    shutdown: SharedShutdown,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self {
            cli,
            shutdown: ShutdownCoordinator::shared(),
        }
    }

    /// Share a shutdown signal with the harvest
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Harvest {
                endpoint,
                targets,
                output,
                state,
                batch_size,
                format,
                no_probe,
            } => {
                let settings = self.settings()?;
                let format = format.unwrap_or(settings.format);
                let output = output
                    .clone()
                    .or_else(|| settings.output.clone())
                    .unwrap_or_else(|| PathBuf::from(format!("{endpoint}.{}", format.extension())));
                let state = state.clone().or_else(|| settings.state.clone());
                self.harvest(
                    &settings,
                    HarvestArgs {
                        endpoint,
                        targets,
                        output,
                        state,
                        batch_size: *batch_size,
                        format,
                        probe: !*no_probe,
                    },
                )
                .await
            }
            Commands::Limits => {
                let settings = self.settings()?;
                self.limits(&settings).await
            }
            Commands::Endpoints => {
                self.endpoints();
                Ok(())
            }
        }
    }

    fn settings(&self) -> Result<Settings> {
        let settings = Settings::load(self.cli.settings.as_deref())?;
        settings.validate()?;
        if settings.tokens.is_empty() {
            warn!("no GitHub tokens configured, requests are limited to 60 per hour");
        }
        Ok(settings)
    }

    fn executor(&self, settings: &Settings) -> Result<Arc<RequestExecutor>> {
        let client = HttpClient::with_config(settings.http_config())?;
        let executor = RequestExecutor::new(client, Arc::new(settings.token_pool()))
            .with_policy(settings.retry_policy())
            .with_shutdown(self.shutdown.clone());
        Ok(Arc::new(executor))
    }

    async fn harvest(&self, settings: &Settings, args: HarvestArgs<'_>) -> Result<()> {
        let descriptor = find(args.endpoint)?;
        let targets = read_targets(args.targets)?;
        if targets.is_empty() {
            return Err(Error::config(format!(
                "no targets in {}",
                args.targets.display()
            )));
        }

        let mut config = settings
            .harvest_config(&args.output)
            .with_probe_on_start(args.probe);
        if let Some(size) = args.batch_size {
            config = config.with_batch_size(size);
        }

        let mut harvester = Harvester::new(self.executor(settings)?, args.format.sink(), config)
            .with_shutdown(self.shutdown.clone());
        if let Some(path) = &args.state {
            info!(path = %path.display(), "using checkpoint");
            harvester = harvester.with_state(StateManager::from_file(path)?);
        }

        let report = harvester.run(&descriptor, &targets).await?;
        print_report(&report, &args.output);
        Ok(())
    }

    async fn limits(&self, settings: &Settings) -> Result<()> {
        let executor = self.executor(settings)?;
        let probed = executor.probe_all().await;
        print!("{}", format_limits(&executor.pool().snapshot(), unix_now()));
        probed
    }

    fn endpoints(&self) {
        let endpoints = catalog();
        let width = endpoints.iter().map(|e| e.name.len()).max().unwrap_or(0);
        for endpoint in endpoints {
            println!(
                "{:<width$}  {:<10}  {:<8}  {}",
                endpoint.name,
                endpoint.target.as_str(),
                endpoint.class().as_str(),
                endpoint.description
            );
        }
    }
}

struct HarvestArgs<'a> {
    endpoint: &'a str,
    targets: &'a Path,
    output: PathBuf,
    state: Option<PathBuf>,
    batch_size: Option<usize>,
    format: OutputFormat,
    probe: bool,
}

fn print_report(report: &HarvestReport, output: &Path) {
    let failed: Vec<_> = report
        .failed()
        .map(|o| {
            json!({
                "target": o.target,
                "error": o.error.as_ref().map(ToString::to_string),
            })
        })
        .collect();
    let summary = json!({
        "endpoint": report.endpoint,
        "output": output.display().to_string(),
        "done": report.done().count(),
        "skipped": report.skipped().count(),
        "failed": failed,
        "resumed": report.resumed,
        "rows_written": report.rows_written,
        "cancelled": report.cancelled,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).unwrap_or_default()
    );
}

// ============================================================================
// Targets
// ============================================================================

/// Read targets from a file
pub fn read_targets(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(Error::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read targets from {}", path.display()))?;
    parse_targets(&contents)
}

/// Parse a targets listing
///
/// A first line naming a `repository` column (or containing a comma) marks a
/// CSV file; otherwise every non-empty line not starting with `#` is a target.
pub fn parse_targets(contents: &str) -> Result<Vec<String>> {
    let Some(first) = contents.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(Vec::new());
    };

    if !first.contains(',') && !first.eq_ignore_ascii_case(TARGET_COLUMN) {
        return Ok(contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(String::from)
            .collect());
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(contents.as_bytes());
    let column = reader
        .headers()?
        .iter()
        .position(|h| h.eq_ignore_ascii_case(TARGET_COLUMN))
        .ok_or_else(|| Error::config(format!("targets CSV has no '{TARGET_COLUMN}' column")))?;

    let mut targets = Vec::new();
    for record in reader.records() {
        if let Some(value) = record?.get(column).filter(|v| !v.is_empty()) {
            targets.push(value.to_string());
        }
    }
    Ok(targets)
}

// ============================================================================
// Limits table
// ============================================================================

/// Render token snapshots as an aligned table
pub fn format_limits(snapshots: &[TokenSnapshot], now: UnixTime) -> String {
    let mut columns = vec!["token".to_string()];
    for class in ApiClass::ALL {
        for suffix in ["limit", "remaining", "renews_in"] {
            columns.push(format!("{}_{suffix}", class.as_str()));
        }
    }
    columns.push("status".to_string());

    let rows: Vec<Vec<String>> = snapshots
        .iter()
        .map(|snapshot| {
            let mut row = vec![if snapshot.anonymous {
                "anonymous".to_string()
            } else {
                format!("#{}", snapshot.index)
            }];
            for (_, limit) in &snapshot.limits {
                row.push(show(limit.limit));
                row.push(show(limit.remaining));
                row.push(renews_in(limit.reset, now));
            }
            row.push(if snapshot.invalid { "invalid" } else { "ok" }.to_string());
            row
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(String::len)
                .chain(std::iter::once(c.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };

    let mut table = line(&columns);
    for row in &rows {
        table.push_str(&line(row));
    }
    table
}

fn show(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::RateLimit;
    use tempfile::tempdir;

    #[test]
    fn test_parse_plain_targets() {
        let targets = parse_targets("\n# seed list\nrust-lang/cargo\n  tokio-rs/tokio  \n\n").unwrap();
        assert_eq!(targets, vec!["rust-lang/cargo", "tokio-rs/tokio"]);
    }

    #[test]
    fn test_parse_csv_targets() {
        let csv = "id,Repository,stars\n1,rust-lang/cargo,10\n2,,3\n3, tokio-rs/tokio ,5\n";
        let targets = parse_targets(csv).unwrap();
        assert_eq!(targets, vec!["rust-lang/cargo", "tokio-rs/tokio"]);
    }

    #[test]
    fn test_parse_single_column_csv() {
        let targets = parse_targets("repository\na/b\nc/d\n").unwrap();
        assert_eq!(targets, vec!["a/b", "c/d"]);
    }

    #[test]
    fn test_csv_without_repository_column() {
        assert!(matches!(
            parse_targets("name,stars\na,1\n"),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_read_targets_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("targets.txt");
        std::fs::write(&path, "a/b\n").unwrap();
        assert_eq!(read_targets(&path).unwrap(), vec!["a/b"]);
        assert!(matches!(
            read_targets(&dir.path().join("missing.txt")),
            Err(Error::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_format_limits() {
        let snapshots = vec![
            TokenSnapshot {
                index: 0,
                anonymous: false,
                invalid: false,
                limits: vec![
                    (ApiClass::Core, RateLimit::new(4990, 1_125, 5000)),
                    (ApiClass::Search, RateLimit::new(30, 1_060, 30)),
                    (ApiClass::Graphql, RateLimit::unknown()),
                ],
            },
            TokenSnapshot {
                index: 1,
                anonymous: false,
                invalid: true,
                limits: vec![
                    (ApiClass::Core, RateLimit::unknown()),
                    (ApiClass::Search, RateLimit::unknown()),
                    (ApiClass::Graphql, RateLimit::unknown()),
                ],
            },
        ];

        let table = format_limits(&snapshots, 1_000);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("token"));
        assert!(lines[0].contains("core_remaining"));
        assert!(lines[0].contains("graphql_renews_in"));
        assert!(lines[1].starts_with("#0"));
        assert!(lines[1].contains("4990"));
        assert!(lines[1].contains("2m5s"));
        assert!(lines[1].contains("1m0s"));
        assert!(lines[1].contains("never"));
        assert!(lines[2].ends_with("invalid"));
    }
}
