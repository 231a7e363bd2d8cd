//! # Redrive Worker
//!
//! Re-submits documents whose last attempt failed for a retryable reason.
//!
//! ## Redrive Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Redrive Worker Flow                             │
//! │                                                                         │
//! │  every interval_secs:                                                  │
//! │    1. Poll:   status = error AND last_error_retryable                  │
//! │               AND finalized AND tenant enabled                         │
//! │               AND attempts < max_attempts                              │
//! │               ORDER BY last_attempt_at LIMIT batch_size                │
//! │                                                                         │
//! │    2. Submit: orchestrator.submit(doc, Manual)                         │
//! │               identity already present, so never re-allocated          │
//! │                                                                         │
//! │    3. Refusal: a document the orchestrator refuses before any attempt  │
//! │               (tenant disabled since the poll, ...) is skipped and     │
//! │               does not count as a failure                              │
//! │                                                                         │
//! │    4. Backoff: a sweep with failures adds an exponential wait          │
//! │                (initial_backoff_ms .. max_backoff_secs); a clean       │
//! │                sweep resets it                                         │
//! │                                                                         │
//! │  Endpoint rejections (incl. duplicate counter) are not retryable and   │
//! │  are never picked up here.                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use fotara_core::SubmissionMode;

use crate::config::RedriveSettings;
use crate::error::{SubmitError, SubmitResult};
use crate::orchestrator::SubmissionOrchestrator;

/// Counts of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub picked: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Refused before an attempt; retried only once the refusal clears.
    pub skipped: usize,
}

pub struct RedriveWorker {
    orchestrator: Arc<SubmissionOrchestrator>,
    settings: RedriveSettings,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the redrive worker.
#[derive(Clone)]
pub struct RedriveHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl RedriveHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SubmitResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SubmitError::InvalidConfig("Redrive worker already stopped".into()))
    }
}

impl RedriveWorker {
    pub fn new(
        orchestrator: Arc<SubmissionOrchestrator>,
        settings: RedriveSettings,
    ) -> (Self, RedriveHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = RedriveWorker {
            orchestrator,
            settings,
            shutdown_rx,
        };

        (worker, RedriveHandle { shutdown_tx })
    }

    /// Runs the redrive loop until shut down.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.settings.interval_secs,
            max_attempts = self.settings.max_attempts,
            "Redrive worker starting"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(self.settings.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut backoff = self.create_backoff();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let failed = match self.sweep().await {
                        Ok(stats) => stats.failed > 0,
                        Err(e) => {
                            error!(error = %e, "Redrive sweep failed");
                            true
                        }
                    };

                    if !failed {
                        backoff.reset();
                        continue;
                    }

                    if let Some(wait) = backoff.next_backoff() {
                        debug!(?wait, "Backing off before next sweep");
                        tokio::select! {
                            _ = tokio::time::sleep(wait) => {}
                            _ = self.shutdown_rx.recv() => break,
                        }
                    }
                }

                _ = self.shutdown_rx.recv() => break,
            }
        }

        info!("Redrive worker stopped");
    }

    /// Re-drives one batch. Public so operators and tests can force a sweep.
    pub async fn sweep(&self) -> SubmitResult<SweepStats> {
        let candidates = self
            .orchestrator
            .store()
            .list_redrivable(self.settings.max_attempts, self.settings.batch_size as i64)
            .await?;

        let mut stats = SweepStats {
            picked: candidates.len(),
            ..Default::default()
        };

        if candidates.is_empty() {
            debug!("Nothing to redrive");
            return Ok(stats);
        }

        info!(count = candidates.len(), "Redriving documents");

        for candidate in candidates {
            match self
                .orchestrator
                .submit(&candidate.document_ref, SubmissionMode::Manual)
                .await
            {
                Ok(report) if report.is_success() => stats.succeeded += 1,
                Ok(report) => {
                    stats.failed += 1;
                    debug!(
                        document_ref = %candidate.document_ref,
                        attempts = candidate.attempts + 1,
                        kind = report.error.as_ref().map(|e| e.kind.as_str()).unwrap_or(""),
                        "Redrive attempt failed"
                    );
                }
                Err(e) if is_refusal(&e) => {
                    stats.skipped += 1;
                    debug!(
                        document_ref = %candidate.document_ref,
                        kind = e.kind(),
                        "Redrive skipped"
                    );
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(
                        document_ref = %candidate.document_ref,
                        error = %e,
                        "Redrive refused"
                    );
                }
            }
        }

        info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            skipped = stats.skipped,
            "Redrive sweep done"
        );
        Ok(stats)
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        let initial = Duration::from_millis(self.settings.initial_backoff_ms);
        ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            max_interval: Duration::from_secs(self.settings.max_backoff_secs),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Refusals that no amount of retrying clears on its own.
fn is_refusal(err: &SubmitError) -> bool {
    matches!(
        err,
        SubmitError::TenantDisabled { .. }
            | SubmitError::DocumentNotFinalized { .. }
            | SubmitError::NotFound { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::transport::MockTransport;
    use chrono::FixedOffset;
    use fotara_db::MemoryStore;

    fn worker(settings: RedriveSettings) -> (RedriveWorker, RedriveHandle) {
        let orchestrator = SubmissionOrchestrator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MockTransport::new()),
            Arc::new(SystemClock::new(FixedOffset::east_opt(0).unwrap())),
            Duration::from_secs(1),
        );
        RedriveWorker::new(Arc::new(orchestrator), settings)
    }

    #[test]
    fn test_backoff_grows_to_cap() {
        let settings = RedriveSettings {
            initial_backoff_ms: 100,
            max_backoff_secs: 1,
            ..Default::default()
        };
        let (worker, _handle) = worker(settings);
        let backoff = worker.create_backoff();
        assert_eq!(backoff.initial_interval, Duration::from_millis(100));
        assert_eq!(backoff.max_interval, Duration::from_secs(1));
        assert!(backoff.max_elapsed_time.is_none());
    }

    #[test]
    fn test_refusals_are_not_failures() {
        assert!(is_refusal(&SubmitError::TenantDisabled {
            tenant_ref: "t1".into()
        }));
        assert!(is_refusal(&SubmitError::not_found("Document", "SINV-1")));
        assert!(!is_refusal(&SubmitError::LockTimeout {
            resource: "tenant t1".into()
        }));
    }

    #[tokio::test]
    async fn test_empty_sweep() {
        let (worker, _handle) = worker(RedriveSettings::default());
        assert_eq!(worker.sweep().await.unwrap(), SweepStats::default());
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let (worker, handle) = worker(RedriveSettings::default());
        let task = tokio::spawn(worker.run());
        handle.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
