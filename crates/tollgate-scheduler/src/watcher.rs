//! Completion watching for dispatched runs.
//!
//! A watcher polls one run until the engine reports a terminal status, then
//! pushes the completed check-run report exactly once and, unless the run
//! succeeded, closes the originating review request. Watchers share nothing
//! with each other; each owns its report and run handle.

use crate::shutdown::wait_for_shutdown;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tollgate_core::checkrun::{CheckRunReport, CheckRunResult};
use tollgate_core::ids::AppId;
use tollgate_core::ports::{PipelineEngine, ReviewSystem};
use tracing::{debug, error, info, warn};

/// Shortest delay a backoff ever yields.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Poll interval schedule: starts at a base interval and grows by a fixed
/// ratio per attempt up to a cap. Never shrinks, never drops below
/// [`MIN_INTERVAL`].
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    ratio: f64,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, ratio: f64, max: Duration) -> Self {
        let max = max.max(MIN_INTERVAL);
        Self {
            next: base.clamp(MIN_INTERVAL, max),
            ratio: if ratio.is_finite() { ratio.max(1.0) } else { 1.0 },
            max,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let current = self.next;
        // Saturate at the cap when the product overflows a Duration
        self.next = Duration::try_from_secs_f64(self.next.as_secs_f64() * self.ratio)
            .map_or(self.max, |next| next.min(self.max));
        current
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}

/// One run to watch and where its outcome goes.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pub app_id: AppId,
    /// The in-progress report created at dispatch time.
    pub report: CheckRunReport,
    /// User the completed report is pushed as.
    pub reporter_id: String,
    /// User the review request is closed as.
    pub closer_id: String,
}

/// How a watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    Completed(CheckRunResult),
    /// The completed report could not be pushed.
    ReportFailed,
    /// The report was pushed but the review request could not be closed.
    CloseFailed,
    Shutdown,
}

/// Spawns and runs completion watches.
#[derive(Clone)]
pub struct CompletionWatcher {
    engine: Arc<dyn PipelineEngine>,
    reviews: Arc<dyn ReviewSystem>,
    backoff: Backoff,
}

impl CompletionWatcher {
    pub fn new(engine: Arc<dyn PipelineEngine>, reviews: Arc<dyn ReviewSystem>, backoff: Backoff) -> Self {
        Self {
            engine,
            reviews,
            backoff,
        }
    }

    /// Watch `target` on its own task. The caller never has to await it.
    pub fn spawn(&self, target: WatchTarget, shutdown: watch::Receiver<bool>) -> JoinHandle<WatchOutcome> {
        let watcher = self.clone();
        tokio::spawn(async move { watcher.watch(target, shutdown).await })
    }

    /// Poll until a terminal status or shutdown.
    pub async fn watch(&self, target: WatchTarget, mut shutdown: watch::Receiver<bool>) -> WatchOutcome {
        let run = target.report.run;
        let mut backoff = self.backoff.clone();

        info!(app_id = %target.app_id, run = %run, check = %target.report.name, "Watching pipeline run");

        loop {
            if *shutdown.borrow() {
                info!(run = %run, "Watcher shutting down");
                return WatchOutcome::Shutdown;
            }

            match self.engine.get_run_status(run).await {
                Ok(summary) => match CheckRunResult::from_run_status(summary.status) {
                    Some(result) => return self.finish(&target, result).await,
                    None => debug!(run = %run, status = %summary.status, "Pipeline run not finished"),
                },
                Err(e) => warn!(run = %run, error = %e, "Failed to poll pipeline run status"),
            }

            let delay = backoff.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!(run = %run, "Watcher shutting down");
                    return WatchOutcome::Shutdown;
                }
            }
        }
    }

    async fn finish(&self, target: &WatchTarget, result: CheckRunResult) -> WatchOutcome {
        let run = target.report.run;
        let completed = target.report.completed(result);

        if let Err(e) = self
            .reviews
            .create_or_update_check_run(target.app_id, &completed, &target.reporter_id)
            .await
        {
            error!(run = %run, check = %completed.name, error = %e, "Failed to report check run result");
            return WatchOutcome::ReportFailed;
        }
        info!(run = %run, check = %completed.name, result = ?result, "Check run completed");

        if result != CheckRunResult::Success {
            let review_request = target.report.review_request_id;
            if let Err(e) = self
                .reviews
                .close_review_request(target.app_id, review_request, &target.closer_id)
                .await
            {
                error!(run = %run, review_request = %review_request, error = %e, "Failed to close review request");
                return WatchOutcome::CloseFailed;
            }
            info!(run = %run, review_request = %review_request, "Closed review request after unsuccessful run");
        }

        WatchOutcome::Completed(result)
    }
}
