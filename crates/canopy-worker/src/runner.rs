//! Repair runner: main loop that polls for repair tickets and retries them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing;

use canopy_core::config::RepairConfig;
use canopy_core::result::AppResult;
use canopy_service::{RepairReport, RepairService};

/// Polls the repair queue until shut down.
#[derive(Debug)]
pub struct RepairRunner {
    /// Repair service doing the actual work
    repairs: Arc<RepairService>,
    /// Worker configuration
    config: RepairConfig,
    /// Worker identifier
    worker_id: String,
}

impl RepairRunner {
    /// Create a new repair runner
    pub fn new(repairs: Arc<RepairService>, config: RepairConfig, worker_id: String) -> Self {
        Self {
            repairs,
            config,
            worker_id,
        }
    }

    /// Process one batch of tickets
    pub async fn run_once(&self) -> AppResult<RepairReport> {
        self.repairs
            .process_repairs(self.config.batch_size, self.config.max_attempts)
            .await
    }

    /// Start the runner. Runs until the cancel signal is received.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        if !self.config.enabled {
            tracing::info!("Repair worker '{}' is disabled", self.worker_id);
            return;
        }

        tracing::info!(
            "Repair worker '{}' started with poll_interval={}s, batch_size={}",
            self.worker_id,
            self.config.poll_interval_seconds,
            self.config.batch_size
        );

        let poll_interval = Duration::from_secs(self.config.poll_interval_seconds.max(1));

        loop {
            if *cancel.borrow() {
                break;
            }
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        tracing::info!("Repair worker '{}' received shutdown signal", self.worker_id);
                        break;
                    }
                }
                _ = self.poll() => {
                    tokio::select! {
                        changed = cancel.changed() => {
                            if changed.is_err() || *cancel.borrow() {
                                tracing::info!("Repair worker '{}' shutting down", self.worker_id);
                                break;
                            }
                        }
                        _ = time::sleep(poll_interval) => {}
                    }
                }
            }
        }

        tracing::info!("Repair worker '{}' shut down complete", self.worker_id);
    }

    async fn poll(&self) {
        match self.run_once().await {
            Ok(report) if report.attempted > 0 => {
                tracing::info!(
                    worker_id = %self.worker_id,
                    attempted = report.attempted,
                    resolved = report.resolved,
                    failed = report.failed,
                    "Repair pass finished"
                );
            }
            Ok(_) => tracing::trace!("No repair tickets pending"),
            Err(e) => tracing::error!(worker_id = %self.worker_id, error = %e, "Repair pass failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::config::AppConfig;
    use canopy_core::traits::storage::ObjectStore;
    use canopy_database::{MemoryTreeStore, TreeStore};
    use canopy_entity::NodeRef;
    use canopy_entity::repair::{RepairAction, RepairTicket};
    use canopy_service::Services;
    use canopy_storage::LocalStorageProvider;
    use uuid::Uuid;

    async fn runner() -> (RepairRunner, Arc<MemoryTreeStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let objects = Arc::new(LocalStorageProvider::new(dir.path()).await.unwrap());
        objects.create_dir("stale/leftover").await.unwrap();
        let store = Arc::new(MemoryTreeStore::new());
        let services = Services::new(store.clone(), objects, &AppConfig::default());
        let runner = RepairRunner::new(
            Arc::new(services.repairs),
            RepairConfig::default(),
            "test".into(),
        );
        (runner, store, dir)
    }

    #[tokio::test]
    async fn test_run_once_closes_resolved_tickets() {
        let (runner, store, dir) = runner().await;
        let node = NodeRef::Folder(Uuid::new_v4());
        store
            .open_repair(RepairTicket::open(
                node,
                RepairAction::RemoveDirectory {
                    address: "stale".into(),
                },
                "disk busy",
            ))
            .await
            .unwrap();

        let report = runner.run_once().await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.resolved, 1);
        assert!(store.pending_repairs(10, 10).await.unwrap().is_empty());
        assert!(!dir.path().join("stale").exists());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (runner, _store, _dir) = runner().await;
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { runner.run(rx).await });
        tx.send(true).unwrap();
        time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("runner should stop")
            .unwrap();
    }
}
