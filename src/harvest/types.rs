//! Harvest types
//!
//! Configuration, per-target state and the run report.

use crate::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Flush after this many finished targets by default
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Re-probe every token after this long by default
pub const DEFAULT_SYNC_WINDOW: Duration = Duration::from_secs(3600);

/// Configuration for a harvest run
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Finished targets per flush
    pub batch_size: usize,
    /// Where rows are appended
    pub destination: PathBuf,
    /// Interval between token re-probes
    pub sync_window: Duration,
    /// Probe every token before the first target
    pub probe_on_start: bool,
}

impl HarvestConfig {
    /// Create a config writing to `destination`
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            destination: destination.into(),
            sync_window: DEFAULT_SYNC_WINDOW,
            probe_on_start: true,
        }
    }

    /// Set batch size (minimum 1)
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the re-probe interval
    #[must_use]
    pub fn with_sync_window(mut self, window: Duration) -> Self {
        self.sync_window = window;
        self
    }

    /// Enable or disable the initial probe
    #[must_use]
    pub fn with_probe_on_start(mut self, probe: bool) -> Self {
        self.probe_on_start = probe;
        self
    }
}

/// Where a target is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    /// Queued, not yet requested
    Pending,
    /// First request in flight
    Fetching,
    /// At least one page received, more may follow
    Paginating,
    /// All pages received (possibly none)
    Done,
    /// The entity does not exist
    Skipped,
    /// Gave up after the retry budget or on a malformed payload
    Failed,
}

impl TargetState {
    /// Whether no further transition can happen
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Failed)
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Paginating => "paginating",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one target
#[derive(Debug)]
pub struct TargetOutcome {
    /// Canonical target identifier (raw input when it could not be parsed)
    pub target: String,
    /// Last state reached; non-terminal when the run was interrupted
    pub state: TargetState,
    /// Rows kept for this target
    pub rows: usize,
    /// Pages received
    pub pages: u32,
    /// Rows are an incomplete view of the target
    pub partial: bool,
    /// Why the target failed
    pub error: Option<Error>,
}

impl TargetOutcome {
    pub(crate) fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            state: TargetState::Pending,
            rows: 0,
            pages: 0,
            partial: false,
            error: None,
        }
    }

    pub(crate) fn failed(target: impl Into<String>, error: Error) -> Self {
        Self {
            state: TargetState::Failed,
            error: Some(error),
            ..Self::new(target)
        }
    }
}

/// Summary of a harvest run
#[derive(Debug, Default)]
pub struct HarvestReport {
    /// Endpoint that was harvested
    pub endpoint: String,
    /// Per-target outcomes in input order
    pub outcomes: Vec<TargetOutcome>,
    /// Rows handed to the sink
    pub rows_written: usize,
    /// Non-empty appends
    pub flushes: usize,
    /// The run stopped early on a shutdown request
    pub cancelled: bool,
    /// Targets skipped because an earlier run completed them
    pub resumed: usize,
}

impl HarvestReport {
    pub(crate) fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Targets that finished normally
    pub fn done(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.in_state(TargetState::Done)
    }

    /// Targets that do not exist
    pub fn skipped(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.in_state(TargetState::Skipped)
    }

    /// Targets that failed
    pub fn failed(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.in_state(TargetState::Failed)
    }

    /// Whether every attempted target reached Done or Skipped
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.failed().next().is_none()
    }

    /// Log every failed target in one block
    pub fn log_failures(&self) {
        let failed: Vec<_> = self.failed().collect();
        if failed.is_empty() {
            return;
        }
        warn!(
            endpoint = %self.endpoint,
            count = failed.len(),
            "some targets failed"
        );
        for outcome in failed {
            let cause = outcome
                .error
                .as_ref()
                .map_or_else(|| "unknown".to_string(), ToString::to_string);
            warn!(
                endpoint = %self.endpoint,
                id = %outcome.target,
                rows = outcome.rows,
                %cause,
                "failed target"
            );
        }
    }

    fn in_state(&self, state: TargetState) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(move |o| o.state == state)
    }
}
