//! Post-commit storage effects.
//!
//! Effects run after the relational commit. A failed effect does not undo
//! the commit: it is recorded as a repair ticket and reported back on the
//! [`MutationOutcome`] as an `InconsistentState` warning.

use std::sync::Arc;

use tracing::{debug, error, warn};
use uuid::Uuid;

use canopy_core::AppError;
use canopy_core::result::AppResult;
use canopy_core::traits::storage::ObjectStore;
use canopy_database::TreeStore;
use canopy_entity::NodeRef;
use canopy_entity::repair::{RepairAction, RepairTicket};

use crate::outcome::MutationOutcome;

/// Applies storage effects and turns failures into repair tickets.
#[derive(Debug, Clone)]
pub struct StorageEffects {
    objects: Arc<dyn ObjectStore>,
    store: Arc<dyn TreeStore>,
}

impl StorageEffects {
    /// Creates a new effect runner.
    pub fn new(objects: Arc<dyn ObjectStore>, store: Arc<dyn TreeStore>) -> Self {
        Self { objects, store }
    }

    /// The underlying object store.
    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    /// Run one effect against the object store.
    pub async fn execute(&self, action: &RepairAction) -> AppResult<()> {
        debug!(action = action.label(), "Applying storage effect");
        match action {
            RepairAction::EnsureDirectory { address } => self.objects.create_dir(address).await,
            RepairAction::RemoveDirectory { address } => self.objects.delete_dir(address).await,
            RepairAction::RemoveObject { address } => self.objects.delete(address).await,
            RepairAction::Relocate { from, to } => self.objects.rename(from, to).await,
        }
    }

    /// Run an effect; on failure open a repair ticket and degrade `outcome`.
    pub async fn apply<T>(
        &self,
        node: NodeRef,
        action: RepairAction,
        outcome: &mut MutationOutcome<T>,
    ) {
        if let Err(e) = self.execute(&action).await {
            let (warning, ticket) = self.defer(node, action, e).await;
            outcome.degrade(warning, ticket);
        }
    }

    /// Record a failed effect for the repair worker.
    ///
    /// Returns the warning to report and the ticket ID, if the ticket could
    /// be stored.
    pub async fn defer(
        &self,
        node: NodeRef,
        action: RepairAction,
        cause: AppError,
    ) -> (AppError, Option<Uuid>) {
        let label = action.label();
        warn!(
            node = %node,
            action = label,
            error = %cause,
            "Storage effect failed after commit"
        );
        let ticket = RepairTicket::open(node, action, cause.to_string());
        let ticket_id = ticket.id;
        let stored = match self.store.open_repair(ticket).await {
            Ok(()) => Some(ticket_id),
            Err(e) => {
                error!(node = %node, action = label, error = %e, "Failed to open repair ticket");
                None
            }
        };
        let warning = AppError::inconsistent(format!(
            "Storage effect '{label}' on {node} failed and was scheduled for repair: {}",
            cause.message
        ));
        (warning, stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use canopy_core::ErrorKind;
    use canopy_core::traits::storage::StoredObjectMeta;
    use canopy_database::MemoryTreeStore;

    #[derive(Debug)]
    struct Offline;

    fn offline<T>() -> AppResult<T> {
        Err(AppError::storage("backend offline"))
    }

    #[async_trait]
    impl ObjectStore for Offline {
        fn provider_type(&self) -> &str {
            "offline"
        }
        async fn health_check(&self) -> AppResult<bool> {
            Ok(false)
        }
        async fn put(&self, _: &str, _: Bytes) -> AppResult<()> {
            offline()
        }
        async fn read_bytes(&self, _: &str) -> AppResult<Bytes> {
            offline()
        }
        async fn exists(&self, _: &str) -> AppResult<bool> {
            offline()
        }
        async fn delete(&self, _: &str) -> AppResult<()> {
            offline()
        }
        async fn delete_dir(&self, _: &str) -> AppResult<()> {
            offline()
        }
        async fn create_dir(&self, _: &str) -> AppResult<()> {
            offline()
        }
        async fn rename(&self, _: &str, _: &str) -> AppResult<()> {
            offline()
        }
        async fn size(&self, _: &str) -> AppResult<u64> {
            offline()
        }
        async fn mime_type(&self, _: &str) -> AppResult<String> {
            offline()
        }
        async fn metadata(&self, _: &str) -> AppResult<StoredObjectMeta> {
            offline()
        }
    }

    #[tokio::test]
    async fn test_failed_effect_opens_ticket() {
        let store = Arc::new(MemoryTreeStore::new());
        let effects = StorageEffects::new(Arc::new(Offline), store.clone());
        let node = NodeRef::Folder(Uuid::new_v4());

        let mut outcome = MutationOutcome::clean(());
        effects
            .apply(
                node,
                RepairAction::EnsureDirectory {
                    address: "abc".into(),
                },
                &mut outcome,
            )
            .await;

        assert!(outcome.is_degraded());
        assert_eq!(outcome.warnings[0].kind, ErrorKind::InconsistentState);
        let pending = store.pending_repairs(10, 5).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, outcome.repair_tickets[0]);
        assert_eq!(pending[0].node(), node);
    }
}
