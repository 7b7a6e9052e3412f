//! Migration executor
//!
//! Drains the queue one task per tick and runs the stop -> snapshot ->
//! relaunch sequence against the runtime. Every attempt resolves to an
//! explicit tagged outcome; the retry policy sits on top of the attempt,
//! never inside it, and never goes back through the queue.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::MigrationConf;
use crate::health::HealthTracker;
use crate::models::MigrationTask;
use crate::queue::MigrationQueue;
use crate::registry::HostRegistry;
use crate::runtime::WorkloadRuntime;

/// Step of the migration sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    Stop,
    Snapshot,
    Launch,
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStep::Stop => write!(f, "stop"),
            MigrationStep::Snapshot => write!(f, "snapshot"),
            MigrationStep::Launch => write!(f, "launch"),
        }
    }
}

/// Terminal result of one migration attempt.
#[derive(Debug)]
pub enum MigrationOutcome {
    Success { new_name: String },
    Failed { step: MigrationStep, reason: String },
}

pub struct MigrationExecutor {
    runtime: Arc<dyn WorkloadRuntime>,
    registry: Arc<HostRegistry>,
    queue: Arc<MigrationQueue>,
    health: HealthTracker,
    conf: MigrationConf,
}

impl MigrationExecutor {
    pub fn new(
        runtime: Arc<dyn WorkloadRuntime>,
        registry: Arc<HostRegistry>,
        queue: Arc<MigrationQueue>,
        health: HealthTracker,
        conf: MigrationConf,
    ) -> Self {
        Self { runtime, registry, queue, health, conf }
    }

    /// Ticked loop; runs until the shutdown signal flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.conf.interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.drain_one().await;
                }
                _ = shutdown.changed() => {
                    info!("migration executor stopping");
                    return;
                }
            }
        }
    }

    /// Pops at most one task and drives it to a terminal outcome.
    pub async fn drain_one(&self) -> Option<MigrationOutcome> {
        let task = self.queue.try_pop()?;
        Some(self.handle(task).await)
    }

    /// Retry layer: bounded attempts with exponential backoff. Retries stay
    /// inside the executor; a dequeued task never re-enters the queue.
    async fn handle(&self, task: MigrationTask) -> MigrationOutcome {
        let max_attempts = self.conf.max_attempts.max(1);
        let mut backoff = Duration::from_millis(self.conf.backoff_base_ms);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt(&task).await {
                MigrationOutcome::Success { new_name } => {
                    info!(
                        workload = %task.workload.name,
                        new = %new_name,
                        host = %task.source_host,
                        "migration complete"
                    );
                    self.registry.clear_pending(&task.source_host);
                    self.health.mark_migration_completed();
                    return MigrationOutcome::Success { new_name };
                }
                MigrationOutcome::Failed { step, reason } => {
                    warn!(
                        workload = %task.workload.name,
                        step = %step,
                        %reason,
                        attempt,
                        "migration step failed"
                    );
                    if attempt >= max_attempts {
                        error!(
                            workload = %task.workload.name,
                            step = %step,
                            %reason,
                            attempts = attempt,
                            "migration abandoned"
                        );
                        if self.conf.recover_source && step != MigrationStep::Stop {
                            self.recover(&task).await;
                        }
                        self.registry.clear_pending(&task.source_host);
                        self.health.mark_migration_failed();
                        return MigrationOutcome::Failed { step, reason };
                    }
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    /// One pass through stop -> snapshot -> relaunch. No retry, no rollback.
    async fn attempt(&self, task: &MigrationTask) -> MigrationOutcome {
        let source = &task.workload;

        if let Err(e) = self.runtime.stop(source).await {
            return MigrationOutcome::Failed { step: MigrationStep::Stop, reason: e.to_string() };
        }
        info!(workload = %source.name, "stopped workload for migration");

        let image_name = format!("migrated-{}", source.name);
        let image = match self.runtime.snapshot(source, &image_name).await {
            Ok(image) => image,
            Err(e) => {
                return MigrationOutcome::Failed {
                    step: MigrationStep::Snapshot,
                    reason: e.to_string(),
                }
            }
        };
        info!(workload = %source.name, image = %image, "snapshotted workload state");

        // Relaunch on the source host until cross-host placement lands.
        let hint = task.target_host.as_deref().or(Some(task.source_host.as_str()));
        let relaunched = match self.runtime.launch(&image, &image_name, hint).await {
            Ok(workload) => workload,
            Err(e) => {
                return MigrationOutcome::Failed {
                    step: MigrationStep::Launch,
                    reason: e.to_string(),
                }
            }
        };
        info!(
            workload = %source.name,
            new = %relaunched.name,
            host = %task.source_host,
            "relaunched workload from snapshot"
        );

        MigrationOutcome::Success { new_name: relaunched.name }
    }

    /// The stop succeeded but a later step failed for good; bring the
    /// source back up so it is not left stopped and unrecoverable.
    async fn recover(&self, task: &MigrationTask) {
        match self.runtime.start(&task.workload).await {
            Ok(()) => {
                info!(workload = %task.workload.name, "restarted source workload after failed migration")
            }
            Err(e) => {
                error!(
                    workload = %task.workload.name,
                    error = %e,
                    "could not restart source workload, left stopped"
                )
            }
        }
    }
}
