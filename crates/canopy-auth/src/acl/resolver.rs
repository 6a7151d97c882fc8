//! Effective permission resolver over the folder tree.
//!
//! Resolution order:
//! 1. Existence: a missing node is `NotFound` before anything else.
//! 2. Ownership of the node (or of a file's folder).
//! 3. Administrative scope.
//! 4. The nearest grant row, walking file → folder → ancestors.
//! 5. Deny.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use canopy_core::AppError;
use canopy_core::result::AppResult;
use canopy_database::TreeStore;
use canopy_entity::NodeRef;
use canopy_entity::file::File;
use canopy_entity::folder::Folder;
use canopy_entity::permission::PermissionLevel;
use canopy_entity::user::Principal;

use super::checker::{Decision, EffectiveAccess};
use super::inheritance::{index_grants, resolve_access};

/// Resolves what a principal may do on a folder or file.
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    /// Tree store for node, ancestor and grant lookups.
    store: Arc<dyn TreeStore>,
}

impl PermissionResolver {
    /// Creates a new resolver.
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self { store }
    }

    /// Answer allow or deny for `required` on `target`.
    ///
    /// Fails with `NotFound` only when the node does not exist.
    pub async fn check(
        &self,
        principal: &Principal,
        target: NodeRef,
        required: PermissionLevel,
    ) -> AppResult<Decision> {
        let access = self.access(principal, target).await?;
        let decision = access.decide(required);
        debug!(
            user_id = %principal.user_id,
            target = %target,
            required = %required,
            ?decision,
            "Resolved permission"
        );
        Ok(decision)
    }

    /// The caller's effective access on `target`.
    pub async fn access(&self, principal: &Principal, target: NodeRef) -> AppResult<EffectiveAccess> {
        match target {
            NodeRef::Folder(id) => {
                let folder = self
                    .store
                    .find_folder(id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("Folder {id} not found")))?;
                self.folder_access(principal, &folder).await
            }
            NodeRef::File(id) => {
                let file = self
                    .store
                    .find_file(id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("File {id} not found")))?;
                self.file_access(principal, &file).await
            }
        }
    }

    /// Effective access on an already loaded folder.
    pub async fn folder_access(
        &self,
        principal: &Principal,
        folder: &Folder,
    ) -> AppResult<EffectiveAccess> {
        if folder.owner_id == principal.user_id {
            return Ok(EffectiveAccess::owner(NodeRef::Folder(folder.id)));
        }
        let chain = self.store.ancestors(folder.id).await?;
        self.walk(principal, None, &chain).await
    }

    /// Effective access on an already loaded file.
    pub async fn file_access(&self, principal: &Principal, file: &File) -> AppResult<EffectiveAccess> {
        if file.owner_id == principal.user_id {
            return Ok(EffectiveAccess::owner(NodeRef::File(file.id)));
        }
        let chain = self.store.ancestors(file.folder_id).await?;
        if chain.is_empty() {
            return Err(AppError::inconsistent(format!(
                "File {} references missing folder {}",
                file.id, file.folder_id
            )));
        }
        self.walk(principal, Some(file), &chain).await
    }

    async fn walk(
        &self,
        principal: &Principal,
        file: Option<&File>,
        chain: &[Folder],
    ) -> AppResult<EffectiveAccess> {
        let needs_grants = !principal.is_unrestricted_admin() && !principal.is_restricted_admin();
        let grants = if needs_grants {
            let mut ids: Vec<Uuid> = chain.iter().map(|f| f.id).collect();
            if let Some(file) = file {
                ids.push(file.id);
            }
            index_grants(self.store.grants_for_user(principal.user_id, &ids).await?)
        } else {
            Default::default()
        };
        Ok(resolve_access(principal, file, chain, &grants))
    }

    /// Require `required` on a folder, applying the existence policy: callers
    /// that cannot even read the folder get `NotFound`, callers that can read
    /// it but lack the level get `PermissionDenied`.
    pub async fn require_folder(
        &self,
        principal: &Principal,
        folder: &Folder,
        required: PermissionLevel,
    ) -> AppResult<EffectiveAccess> {
        let access = self.folder_access(principal, folder).await?;
        enforce(access, NodeRef::Folder(folder.id), required)
    }

    /// Require `required` on a file, with the same existence policy.
    pub async fn require_file(
        &self,
        principal: &Principal,
        file: &File,
        required: PermissionLevel,
    ) -> AppResult<EffectiveAccess> {
        let access = self.file_access(principal, file).await?;
        enforce(access, NodeRef::File(file.id), required)
    }
}

fn enforce(
    access: EffectiveAccess,
    node: NodeRef,
    required: PermissionLevel,
) -> AppResult<EffectiveAccess> {
    if access.allows(required) {
        return Ok(access);
    }
    if access.allows(PermissionLevel::Read) {
        return Err(AppError::permission_denied(format!(
            "{required} access required on {node}"
        )));
    }
    Err(AppError::not_found(format!("{node} not found")))
}
