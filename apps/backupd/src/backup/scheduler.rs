use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backup_catalog::Catalog;
use backup_core::{Classify, ErrorClass};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::error::BackupError;
use super::orchestrator::{BackupOutcome, Orchestrator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Processing,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub stored: usize,
    /// Instances with nobody online.
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("stopping after a fatal error: {0}")]
    Fatal(#[source] BackupError),
}

/// Walks every active instance once per interval, one at a time.
pub struct Scheduler {
    catalog: Catalog,
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(catalog: Catalog, orchestrator: Arc<Orchestrator>, interval: Duration) -> Self {
        Self {
            catalog,
            orchestrator,
            interval,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// One pass over the active instances. Only a process-fatal error ends
    /// the pass early.
    pub async fn run_pass(&mut self) -> Result<PassReport, SchedulerError> {
        let mut report = PassReport::default();
        let instances = match self.catalog.active_instances().await {
            Ok(instances) => instances,
            Err(err) => {
                error!("could not read instances, skipping this pass: {}", err);
                return Ok(report);
            }
        };

        self.state = SchedulerState::Processing;
        debug!("backup pass over {} instances", instances.len());
        for instance in &instances {
            let span = info_span!("instance", container = %instance.container);
            let result = self
                .orchestrator
                .run_backup(instance)
                .instrument(span)
                .await;
            match result {
                Ok(BackupOutcome::Stored {
                    save,
                    archive_attempts,
                }) => {
                    info!(
                        container = %instance.container,
                        size = save.size,
                        attempts = archive_attempts,
                        "stored {}",
                        save.filename
                    );
                    report.stored += 1;
                }
                Ok(BackupOutcome::NoPlayers) => report.skipped += 1,
                Err(err) if err.class() == ErrorClass::ProcessFatal => {
                    error!(container = %instance.container, "{}", err);
                    self.state = SchedulerState::Idle;
                    return Err(SchedulerError::Fatal(err));
                }
                Err(err) => {
                    warn!(container = %instance.container, "backup failed: {}", err);
                    report.failed += 1;
                }
            }
        }
        self.state = SchedulerState::Idle;

        info!(
            stored = report.stored,
            skipped = report.skipped,
            failed = report.failed,
            "backup pass finished"
        );
        Ok(report)
    }

    /// Runs passes until `shutdown` resolves. The first pass starts right away;
    /// shutdown is only observed between passes.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), SchedulerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            self.run_pass().await?;
            debug!(state = ?self.state(), "next backup pass in {:?}", self.interval);
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, scheduler stopping");
                    return Ok(());
                }
                _ = sleep(self.interval) => {}
            }
        }
    }
}
