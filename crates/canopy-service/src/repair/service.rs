//! Retries storage effects recorded in repair tickets.
//!
//! Directory creation and relocation are re-resolved against the live tree
//! when the ticket is processed, so a ticket stays correct even if the node
//! was moved or deleted since it was opened.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use canopy_core::{AppError, ErrorKind};
use canopy_core::result::AppResult;
use canopy_core::traits::storage::ObjectStore;
use canopy_database::TreeStore;
use canopy_entity::NodeRef;
use canopy_entity::repair::{RepairAction, RepairTicket};

use crate::effects::StorageEffects;
use crate::path::PathVirtualizer;

/// Result of one repair pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Tickets picked up.
    pub attempted: u64,
    /// Tickets closed.
    pub resolved: u64,
    /// Tickets that failed again.
    pub failed: u64,
}

/// Drains open repair tickets.
#[derive(Debug, Clone)]
pub struct RepairService {
    store: Arc<dyn TreeStore>,
    objects: Arc<dyn ObjectStore>,
    effects: Arc<StorageEffects>,
    paths: Arc<PathVirtualizer>,
}

impl RepairService {
    /// Creates a new repair service.
    pub fn new(
        store: Arc<dyn TreeStore>,
        objects: Arc<dyn ObjectStore>,
        effects: Arc<StorageEffects>,
        paths: Arc<PathVirtualizer>,
    ) -> Self {
        Self {
            store,
            objects,
            effects,
            paths,
        }
    }

    /// Process up to `batch_size` tickets with fewer than `max_attempts` attempts.
    pub async fn process_repairs(
        &self,
        batch_size: usize,
        max_attempts: i32,
    ) -> AppResult<RepairReport> {
        let tickets = self
            .store
            .pending_repairs(batch_size as i64, max_attempts)
            .await?;
        let mut report = RepairReport::default();
        for ticket in tickets {
            report.attempted += 1;
            match self.repair(&ticket).await {
                Ok(()) => {
                    self.store.close_repair(ticket.id).await?;
                    report.resolved += 1;
                    info!(
                        ticket_id = %ticket.id,
                        node = %ticket.node(),
                        action = ticket.action.label(),
                        "Repair ticket resolved"
                    );
                }
                Err(e) => {
                    self.store
                        .record_repair_failure(ticket.id, &e.to_string())
                        .await?;
                    report.failed += 1;
                    warn!(
                        ticket_id = %ticket.id,
                        node = %ticket.node(),
                        action = ticket.action.label(),
                        attempts = ticket.attempts + 1,
                        error = %e,
                        "Repair attempt failed"
                    );
                }
            }
        }
        Ok(report)
    }

    async fn repair(&self, ticket: &RepairTicket) -> AppResult<()> {
        let node = ticket.node();
        match &ticket.action.0 {
            RepairAction::EnsureDirectory { .. } => {
                let Some(address) = self.current_address(node).await? else {
                    return Ok(());
                };
                self.effects
                    .execute(&RepairAction::EnsureDirectory { address })
                    .await
            }
            RepairAction::Relocate { from, .. } => {
                let Some(address) = self.current_address(node).await? else {
                    return Ok(());
                };
                if self.objects.exists(&address).await? {
                    return Ok(());
                }
                if !self.objects.exists(from).await? {
                    return Err(AppError::inconsistent(format!(
                        "Neither {from} nor {address} exists for {node}"
                    )));
                }
                self.effects
                    .execute(&RepairAction::Relocate {
                        from: from.clone(),
                        to: address,
                    })
                    .await
            }
            action @ (RepairAction::RemoveDirectory { .. } | RepairAction::RemoveObject { .. }) => {
                self.effects.execute(action).await
            }
        }
    }

    /// Live storage address of a node, or `None` once it is gone.
    async fn current_address(&self, node: NodeRef) -> AppResult<Option<String>> {
        match self.paths.storage_address(node).await {
            Ok(address) => Ok(Some(address)),
            Err(e) if e.is(ErrorKind::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
