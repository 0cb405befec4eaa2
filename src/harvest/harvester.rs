//! Harvest loop
//!
//! Drives one endpoint across a list of targets, one target at a time.

use super::types::{HarvestConfig, HarvestReport, TargetOutcome, TargetState};
use crate::endpoint::EndpointDescriptor;
use crate::error::{Error, Result};
use crate::http::{PageFetcher, RequestExecutor};
use crate::output::RecordSink;
use crate::pagination::{EndReason, PageStream, Step};
use crate::shutdown::SharedShutdown;
use crate::state::StateManager;
use crate::types::Row;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs an endpoint over many targets, flushing rows in batches
pub struct Harvester {
    fetcher: Arc<dyn PageFetcher>,
    prober: Option<Arc<RequestExecutor>>,
    sink: Arc<dyn RecordSink>,
    config: HarvestConfig,
    state: Option<StateManager>,
    shutdown: Option<SharedShutdown>,
}

/// Rows and checkpoint entries waiting for the next flush
#[derive(Default)]
struct Batch {
    rows: Vec<Row>,
    completed: Vec<String>,
    cursors: Vec<(String, String)>,
    finished: usize,
}

/// Result of driving a single target
struct TargetRun {
    outcome: TargetOutcome,
    rows: Vec<Row>,
    /// Cursor that continues after the last received page
    resume: Option<String>,
    /// Set when the target stopped on cancellation or a run-level error
    interrupted: Option<Error>,
}

impl TargetRun {
    fn finished(outcome: TargetOutcome, rows: Vec<Row>, resume: Option<String>) -> Self {
        Self {
            outcome,
            rows,
            resume,
            interrupted: None,
        }
    }
}

impl Harvester {
    /// Harvester backed by a request executor, which also re-probes tokens
    pub fn new(executor: Arc<RequestExecutor>, sink: Arc<dyn RecordSink>, config: HarvestConfig) -> Self {
        Self {
            fetcher: executor.clone(),
            prober: Some(executor),
            sink,
            config,
            state: None,
            shutdown: None,
        }
    }

    /// Harvester over any page fetcher; tokens are never probed
    pub fn with_fetcher(
        fetcher: Arc<dyn PageFetcher>,
        sink: Arc<dyn RecordSink>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            fetcher,
            prober: None,
            sink,
            config,
            state: None,
            shutdown: None,
        }
    }

    /// Record progress in a checkpoint and skip already completed targets
    #[must_use]
    pub fn with_state(mut self, state: StateManager) -> Self {
        self.state = Some(state);
        self
    }

    /// Stop between targets and pages once shutdown is requested
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// The configuration
    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Harvest `descriptor` for every target
    ///
    /// Per-target failures are recorded in the report and do not stop the
    /// run. Running out of usable tokens or failing to write output does:
    /// whatever is buffered is flushed and checkpointed first.
    pub async fn run(&self, descriptor: &EndpointDescriptor, targets: &[String]) -> Result<HarvestReport> {
        let started = Instant::now();
        let endpoint = descriptor.name.as_str();
        let mut report = HarvestReport::new(endpoint);
        let mut batch = Batch::default();
        let mut seen = HashSet::new();

        if self.config.probe_on_start {
            self.sync_tokens().await?;
        }
        let mut last_sync = Instant::now();

        info!(
            endpoint,
            targets = targets.len(),
            destination = %self.config.destination.display(),
            "harvest started"
        );

        for raw in targets {
            if self.is_cancelled() {
                info!(endpoint, "shutdown requested, stopping before the next target");
                report.cancelled = true;
                break;
            }

            let canonical = match descriptor.args_for(raw) {
                Ok((canonical, _)) => canonical,
                Err(e) => {
                    warn!(endpoint, id = %raw, error = %e, "invalid target");
                    report.outcomes.push(TargetOutcome::failed(raw.trim(), e));
                    continue;
                }
            };
            if !seen.insert(canonical.clone()) {
                debug!(endpoint, id = %canonical, "duplicate target ignored");
                continue;
            }
            if let Some(state) = &self.state {
                if state.is_target_completed(endpoint, &canonical).await {
                    debug!(endpoint, id = %canonical, "completed in an earlier run");
                    report.resumed += 1;
                    continue;
                }
            }

            if last_sync.elapsed() >= self.config.sync_window {
                if let Err(e) = self.sync_tokens().await {
                    self.flush(endpoint, &mut batch, &mut report).await?;
                    report.log_failures();
                    return Err(e);
                }
                last_sync = Instant::now();
            }

            let run = self.harvest_target(descriptor, raw, canonical).await;
            let canonical = run.outcome.target.clone();

            match run.interrupted {
                None => {
                    let mut outcome = run.outcome;
                    match outcome.state {
                        TargetState::Done | TargetState::Skipped => batch.completed.push(canonical),
                        _ => {
                            if let Some(cursor) = run.resume {
                                batch.cursors.push((canonical, cursor));
                            }
                        }
                    }
                    outcome.rows = run.rows.len();
                    batch.rows.extend(run.rows);
                    batch.finished += 1;
                    report.outcomes.push(outcome);

                    if batch.finished >= self.config.batch_size {
                        self.flush(endpoint, &mut batch, &mut report).await?;
                    }
                }
                Some(error) => {
                    let mut outcome = run.outcome;
                    match run.resume {
                        Some(cursor) if descriptor.paging.is_resumable() => {
                            outcome.partial = true;
                            outcome.rows = run.rows.len();
                            batch.rows.extend(run.rows);
                            batch.cursors.push((canonical, cursor));
                        }
                        _ => {
                            if !run.rows.is_empty() {
                                debug!(
                                    endpoint,
                                    id = %outcome.target,
                                    rows = run.rows.len(),
                                    "discarding rows of an interrupted target"
                                );
                            }
                            outcome.rows = 0;
                        }
                    }
                    report.outcomes.push(outcome);
                    self.flush(endpoint, &mut batch, &mut report).await?;

                    if matches!(error, Error::Cancelled) {
                        info!(endpoint, "shutdown requested, stopped between pages");
                        report.cancelled = true;
                        break;
                    }
                    report.log_failures();
                    return Err(error);
                }
            }
        }

        self.flush(endpoint, &mut batch, &mut report).await?;

        info!(
            endpoint,
            done = report.done().count(),
            skipped = report.skipped().count(),
            failed = report.failed().count(),
            resumed = report.resumed,
            rows = report.rows_written,
            cancelled = report.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "harvest finished"
        );
        report.log_failures();
        Ok(report)
    }

    async fn harvest_target(&self, descriptor: &EndpointDescriptor, raw: &str, canonical: String) -> TargetRun {
        let endpoint = descriptor.name.as_str();
        let mut outcome = TargetOutcome::new(canonical);
        let mut rows = Vec::new();
        let mut resume = None;

        let mut stream = match PageStream::for_target(&*self.fetcher, descriptor, raw) {
            Ok(stream) => stream,
            Err(e) => {
                transition(endpoint, &mut outcome, TargetState::Failed);
                outcome.error = Some(e);
                return TargetRun::finished(outcome, rows, None);
            }
        };

        if let Some(cursor) = self.saved_cursor(descriptor, &outcome.target).await {
            info!(endpoint, id = %outcome.target, %cursor, "resuming after checkpointed cursor");
            stream = match stream.resume_from(cursor.clone()) {
                Ok(stream) => stream,
                Err(e) => {
                    transition(endpoint, &mut outcome, TargetState::Failed);
                    outcome.error = Some(e);
                    return TargetRun::finished(outcome, rows, None);
                }
            };
            resume = Some(cursor);
        }

        transition(endpoint, &mut outcome, TargetState::Fetching);

        loop {
            if outcome.pages > 0 && self.is_cancelled() {
                return TargetRun {
                    outcome,
                    rows,
                    resume,
                    interrupted: Some(Error::Cancelled),
                };
            }

            match stream.next().await {
                Ok(Step::Page(page)) => {
                    if outcome.state == TargetState::Fetching {
                        transition(endpoint, &mut outcome, TargetState::Paginating);
                    }
                    outcome.pages += 1;
                    rows.extend(page.rows);
                    if page.cursor.is_some() {
                        resume = page.cursor;
                    }
                }
                Ok(Step::End(reason)) => {
                    let next = match reason {
                        EndReason::Exhausted | EndReason::Empty => TargetState::Done,
                        EndReason::NotFound => TargetState::Skipped,
                        EndReason::Vanished { pages } => {
                            warn!(
                                endpoint,
                                id = %outcome.target,
                                pages,
                                "target disappeared mid-harvest, keeping the pages already fetched"
                            );
                            outcome.partial = true;
                            TargetState::Done
                        }
                    };
                    transition(endpoint, &mut outcome, next);
                    return TargetRun::finished(outcome, rows, None);
                }
                Err(e) if e.is_target_local() => {
                    warn!(endpoint, id = %outcome.target, error = %e, "target failed");
                    outcome.partial = outcome.pages > 0;
                    transition(endpoint, &mut outcome, TargetState::Failed);
                    outcome.error = Some(e);
                    return TargetRun::finished(outcome, rows, resume);
                }
                Err(e) => {
                    return TargetRun {
                        outcome,
                        rows,
                        resume,
                        interrupted: Some(e),
                    };
                }
            }
        }
    }

    async fn saved_cursor(&self, descriptor: &EndpointDescriptor, target: &str) -> Option<String> {
        if !descriptor.paging.is_resumable() {
            return None;
        }
        self.state.as_ref()?.get_cursor(&descriptor.name, target).await
    }

    /// Append buffered rows, then record what they cover
    async fn flush(&self, endpoint: &str, batch: &mut Batch, report: &mut HarvestReport) -> Result<()> {
        let batch = std::mem::take(batch);

        if !batch.rows.is_empty() {
            self.sink.append(&batch.rows, &self.config.destination)?;
            report.rows_written += batch.rows.len();
            report.flushes += 1;
        }
        if let Some(state) = &self.state {
            state
                .record_flush(endpoint, &batch.completed, &batch.cursors)
                .await?;
        }

        debug!(
            endpoint,
            rows = batch.rows.len(),
            targets = batch.finished,
            checkpoints = batch.completed.len() + batch.cursors.len(),
            "batch flushed"
        );
        Ok(())
    }

    async fn sync_tokens(&self) -> Result<()> {
        match &self.prober {
            Some(executor) => executor.probe_all().await,
            None => Ok(()),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|s| s.is_shutdown_requested())
    }
}

fn transition(endpoint: &str, outcome: &mut TargetOutcome, next: TargetState) {
    debug!(
        endpoint,
        id = %outcome.target,
        from = %outcome.state,
        to = %next,
        "target state"
    );
    outcome.state = next;
}
