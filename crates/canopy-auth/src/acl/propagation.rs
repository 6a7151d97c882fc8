//! Grant propagation across a subtree.
//!
//! Grant rows are materialized on every node below the one where a grant
//! was made, tagged with that node as their lineage (`source_id`). A node
//! that already holds its own row is a customization and is left alone by
//! grant, change and revoke alike. Nothing here commits: every helper stages
//! into the caller's [`ChangeSet`].
//!
//! Each helper pins the version of the folder it reads from (the target
//! folder, or a file's containing folder) before reading, and bumps it.
//! A concurrent create, delete or move under that folder then fails one of
//! the two commits instead of leaving rows on nodes that no longer exist.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use canopy_core::AppError;
use canopy_core::result::AppResult;
use canopy_database::{Change, ChangeSet, Precondition, SubtreeSnapshot, TreeStore};
use canopy_entity::NodeRef;
use canopy_entity::permission::{PermissionGrant, PermissionLevel};

/// Counts of staged grant rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    /// Rows inserted.
    pub created: u64,
    /// Rows whose level or lineage changed.
    pub updated: u64,
    /// Rows deleted.
    pub removed: u64,
    /// Nodes left untouched because they hold a customization.
    pub skipped: u64,
}

/// A node in a propagation scope together with its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeNode {
    /// The node.
    pub node: NodeRef,
    /// The node's owner; owners never receive grant rows.
    pub owner_id: Uuid,
}

/// Every node in a folder subtree, the folder first, each folder followed
/// by its files.
pub fn subtree_scope(snapshot: &SubtreeSnapshot) -> Vec<ScopeNode> {
    let mut scope = Vec::new();
    for (folder, _) in snapshot.pre_order() {
        scope.push(ScopeNode {
            node: NodeRef::Folder(folder.id),
            owner_id: folder.owner_id,
        });
        for file in snapshot.files_in(folder.id) {
            scope.push(ScopeNode {
                node: NodeRef::File(file.id),
                owner_id: file.owner_id,
            });
        }
    }
    scope
}

/// Stages grant, change and revoke across subtrees.
#[derive(Debug, Clone)]
pub struct PermissionPropagator {
    store: Arc<dyn TreeStore>,
}

impl PermissionPropagator {
    /// Creates a new propagator.
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self { store }
    }

    /// The target followed by everything below it.
    pub async fn scope(&self, target: NodeRef) -> AppResult<Vec<ScopeNode>> {
        match target {
            NodeRef::Folder(id) => {
                let snapshot = self
                    .store
                    .subtree(id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("Folder {id} not found")))?;
                Ok(subtree_scope(&snapshot))
            }
            NodeRef::File(id) => {
                let file = self
                    .store
                    .find_file(id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("File {id} not found")))?;
                Ok(vec![ScopeNode {
                    node: target,
                    owner_id: file.owner_id,
                }])
            }
        }
    }

    /// Require the anchoring folder's current version and bump it.
    async fn pin(&self, target: NodeRef, changes: &mut ChangeSet) -> AppResult<()> {
        let folder_id = match target {
            NodeRef::Folder(id) => id,
            NodeRef::File(id) => {
                self.store
                    .find_file(id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("File {id} not found")))?
                    .folder_id
            }
        };
        let folder = self
            .store
            .find_folder(folder_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder {folder_id} not found")))?;
        changes.require(Precondition::FolderVersion {
            folder_id,
            version: folder.version,
        });
        if !changes.changes().contains(&Change::BumpVersion(folder_id)) {
            changes.push(Change::BumpVersion(folder_id));
        }
        Ok(())
    }

    async fn user_rows(
        &self,
        user_id: Uuid,
        scope: &[ScopeNode],
    ) -> AppResult<HashMap<Uuid, PermissionGrant>> {
        let ids: Vec<Uuid> = scope.iter().map(|n| n.node.id()).collect();
        Ok(self
            .store
            .grants_for_user(user_id, &ids)
            .await?
            .into_iter()
            .map(|g| (g.target_id, g))
            .collect())
    }

    /// Create an explicit grant on `target` and copy it onto every node
    /// below that has no row of its own.
    pub async fn grant(
        &self,
        target: NodeRef,
        user_id: Uuid,
        level: PermissionLevel,
        granted_by: Uuid,
        changes: &mut ChangeSet,
    ) -> AppResult<PropagationReport> {
        self.pin(target, changes).await?;
        let scope = self.scope(target).await?;
        let existing = self.user_rows(user_id, &scope).await?;
        if existing.contains_key(&target.id()) {
            return Err(AppError::conflict(format!(
                "User {user_id} already has a grant on {target}"
            )));
        }

        let mut report = PropagationReport::default();
        changes.push(Change::InsertGrant(PermissionGrant::explicit(
            user_id, target, level, granted_by,
        )));
        report.created += 1;

        for node in scope.iter().skip(1) {
            if node.owner_id == user_id || existing.contains_key(&node.node.id()) {
                report.skipped += 1;
                continue;
            }
            changes.push(Change::InsertGrant(PermissionGrant::propagated(
                user_id,
                node.node,
                level,
                target.id(),
                granted_by,
            )));
            report.created += 1;
        }
        Ok(report)
    }

    /// Change the level of the grant on `target`, making it explicit, and
    /// re-propagate through its lineage.
    pub async fn change(
        &self,
        target: NodeRef,
        user_id: Uuid,
        level: PermissionLevel,
        granted_by: Uuid,
        changes: &mut ChangeSet,
    ) -> AppResult<PropagationReport> {
        self.pin(target, changes).await?;
        let scope = self.scope(target).await?;
        let existing = self.user_rows(user_id, &scope).await?;
        let own = existing.get(&target.id()).ok_or_else(|| {
            AppError::not_found(format!("User {user_id} has no grant on {target}"))
        })?;
        let lineage: HashSet<Uuid> = [target.id(), own.source_id].into_iter().collect();

        let mut report = PropagationReport::default();
        changes.push(Change::UpdateGrant {
            id: own.id,
            level,
            source_id: target.id(),
        });
        report.updated += 1;

        for node in scope.iter().skip(1) {
            match existing.get(&node.node.id()) {
                Some(row) if lineage.contains(&row.source_id) => {
                    if row.level != level || row.source_id != target.id() {
                        changes.push(Change::UpdateGrant {
                            id: row.id,
                            level,
                            source_id: target.id(),
                        });
                        report.updated += 1;
                    } else {
                        report.skipped += 1;
                    }
                }
                Some(_) => report.skipped += 1,
                None if node.owner_id == user_id => report.skipped += 1,
                None => {
                    changes.push(Change::InsertGrant(PermissionGrant::propagated(
                        user_id,
                        node.node,
                        level,
                        target.id(),
                        granted_by,
                    )));
                    report.created += 1;
                }
            }
        }
        Ok(report)
    }

    /// Remove the grant on `target` and every row below that shares its
    /// lineage. A missing grant is a no-op.
    pub async fn revoke(
        &self,
        target: NodeRef,
        user_id: Uuid,
        changes: &mut ChangeSet,
    ) -> AppResult<PropagationReport> {
        let scope = self.scope(target).await?;
        let existing = self.user_rows(user_id, &scope).await?;
        let mut report = PropagationReport::default();
        if !existing.contains_key(&target.id()) {
            return Ok(report);
        }
        self.pin(target, changes).await?;
        let scope = self.scope(target).await?;
        let existing = self.user_rows(user_id, &scope).await?;
        let Some(own) = existing.get(&target.id()) else {
            return Ok(report);
        };
        let lineage: HashSet<Uuid> = [target.id(), own.source_id].into_iter().collect();

        changes.push(Change::DeleteGrant(own.id));
        report.removed += 1;

        for node in scope.iter().skip(1) {
            match existing.get(&node.node.id()) {
                Some(row) if lineage.contains(&row.source_id) => {
                    changes.push(Change::DeleteGrant(row.id));
                    report.removed += 1;
                }
                Some(_) => report.skipped += 1,
                None => {}
            }
        }
        Ok(report)
    }

    /// Copy the grants held on `parent_id` onto a newly created node.
    pub async fn inherit(
        &self,
        node: ScopeNode,
        parent_id: Uuid,
        changes: &mut ChangeSet,
    ) -> AppResult<PropagationReport> {
        self.pin(NodeRef::Folder(parent_id), changes).await?;
        let parent_rows = self.store.grants_on(parent_id).await?;
        let mut report = PropagationReport::default();
        for row in parent_rows {
            if row.user_id == node.owner_id {
                report.skipped += 1;
                continue;
            }
            changes.push(Change::InsertGrant(PermissionGrant::propagated(
                row.user_id,
                node.node,
                row.level,
                row.source_id,
                row.granted_by,
            )));
            report.created += 1;
        }
        Ok(report)
    }

    /// Rewire lineages after `scope` moved under `new_parent_id`.
    ///
    /// Rows inherited from the old ancestors are dropped; rows whose lineage
    /// starts inside the moved subtree stay. The new parent's grants are then
    /// copied onto every node that is left without a row for that user.
    pub async fn reattach(
        &self,
        scope: &[ScopeNode],
        new_parent_id: Uuid,
        changes: &mut ChangeSet,
    ) -> AppResult<PropagationReport> {
        let inside: HashSet<Uuid> = scope.iter().map(|n| n.node.id()).collect();
        let ids: Vec<Uuid> = inside.iter().copied().collect();
        let rows = self.store.grants_on_many(&ids).await?;

        let mut report = PropagationReport::default();
        let mut kept: HashSet<(Uuid, Uuid)> = HashSet::new();
        for row in rows {
            if inside.contains(&row.source_id) {
                kept.insert((row.user_id, row.target_id));
            } else {
                changes.push(Change::DeleteGrant(row.id));
                report.removed += 1;
            }
        }

        for parent_row in self.store.grants_on(new_parent_id).await? {
            for node in scope {
                let key = (parent_row.user_id, node.node.id());
                if node.owner_id == parent_row.user_id || kept.contains(&key) {
                    report.skipped += 1;
                    continue;
                }
                changes.push(Change::InsertGrant(PermissionGrant::propagated(
                    parent_row.user_id,
                    node.node,
                    parent_row.level,
                    parent_row.source_id,
                    parent_row.granted_by,
                )));
                report.created += 1;
            }
        }
        Ok(report)
    }
}
