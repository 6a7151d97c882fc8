//! Folder mutations and reads with ACL enforcement.
//!
//! Every mutation plans its relational writes into one [`ChangeSet`],
//! commits it, and only then touches the object store.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use canopy_auth::acl::propagation::{ScopeNode, subtree_scope};
use canopy_auth::{EffectiveAccess, PermissionPropagator, PermissionResolver};
use canopy_core::AppError;
use canopy_core::config::TreeConfig;
use canopy_core::result::AppResult;
use canopy_core::types::{PageRequest, PageResponse};
use canopy_database::{Change, ChangeSet, Precondition, TreeStore};
use canopy_entity::NodeRef;
use canopy_entity::file::File;
use canopy_entity::folder::{Folder, SubtreeStats};
use canopy_entity::permission::PermissionLevel;
use canopy_entity::repair::RepairAction;

use crate::context::RequestContext;
use crate::effects::StorageEffects;
use crate::lookup;
use crate::outcome::MutationOutcome;
use crate::path::PathVirtualizer;
use crate::size::{AggregateDelta, RecomputeReport, SizeAggregator};
use crate::validation::validate_name;

/// One entry of a folder listing. Folders sort before files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChildEntry {
    /// A child folder.
    Folder(Folder),
    /// A file in the folder.
    File(File),
}

impl ChildEntry {
    /// Display name of the entry.
    pub fn name(&self) -> &str {
        match self {
            Self::Folder(f) => &f.name,
            Self::File(f) => &f.name,
        }
    }

    /// Reference to the entry.
    pub fn node(&self) -> NodeRef {
        match self {
            Self::Folder(f) => NodeRef::Folder(f.id),
            Self::File(f) => NodeRef::File(f.id),
        }
    }
}

/// What a delete removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    /// Folders removed, selected roots included.
    pub folders: u64,
    /// Files removed.
    pub files: u64,
    /// Bytes released.
    pub bytes: u64,
}

/// Creates, renames, moves and deletes folders.
#[derive(Debug, Clone)]
pub struct FolderService {
    /// Relational tree store.
    store: Arc<dyn TreeStore>,
    /// Permission resolver.
    resolver: Arc<PermissionResolver>,
    /// Grant propagator.
    propagator: Arc<PermissionPropagator>,
    /// Key and path computation.
    paths: Arc<PathVirtualizer>,
    /// Subtree statistics.
    sizes: Arc<SizeAggregator>,
    /// Post-commit storage effects.
    effects: Arc<StorageEffects>,
    /// Tree limits.
    limits: TreeConfig,
}

impl FolderService {
    /// Creates a new folder service.
    pub fn new(
        store: Arc<dyn TreeStore>,
        resolver: Arc<PermissionResolver>,
        propagator: Arc<PermissionPropagator>,
        paths: Arc<PathVirtualizer>,
        sizes: Arc<SizeAggregator>,
        effects: Arc<StorageEffects>,
        limits: TreeConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            propagator,
            paths,
            sizes,
            effects,
            limits,
        }
    }

    /// Create the root folder of a newly provisioned user.
    pub async fn provision_root(&self, user_id: Uuid) -> AppResult<MutationOutcome<Folder>> {
        if self.store.find_root(user_id).await?.is_some() {
            return Err(AppError::conflict(format!(
                "User {user_id} already has a root folder"
            )));
        }

        let root = Folder::new(None, user_id, "", self.paths.new_storage_key());
        let mut changes = ChangeSet::new();
        changes.push(Change::InsertFolder(root.clone()));
        self.store.commit(changes).await?;

        info!(user_id = %user_id, folder_id = %root.id, "Root folder provisioned");

        let mut outcome = MutationOutcome::clean(root);
        let address = outcome.value.storage_key.clone();
        self.effects
            .apply(
                NodeRef::Folder(outcome.value.id),
                RepairAction::EnsureDirectory { address },
                &mut outcome,
            )
            .await;
        Ok(outcome)
    }

    /// A user's root folder.
    pub async fn root_of(&self, ctx: &RequestContext, user_id: Uuid) -> AppResult<Folder> {
        let root = self
            .store
            .find_root(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("User {user_id} has no root folder")))?;
        self.resolver
            .require_folder(&ctx.principal, &root, PermissionLevel::Read)
            .await?;
        Ok(root)
    }

    /// Gets a folder by ID.
    pub async fn get_folder(&self, ctx: &RequestContext, folder_id: Uuid) -> AppResult<Folder> {
        let folder = lookup::folder(self.store.as_ref(), folder_id).await?;
        self.resolver
            .require_folder(&ctx.principal, &folder, PermissionLevel::Read)
            .await?;
        Ok(folder)
    }

    /// Lists the child folders and files of a folder.
    pub async fn list_children(
        &self,
        ctx: &RequestContext,
        folder_id: Uuid,
        page: PageRequest,
    ) -> AppResult<PageResponse<ChildEntry>> {
        let folder = self.get_folder(ctx, folder_id).await?;
        let mut entries: Vec<ChildEntry> = self
            .store
            .child_folders(folder.id)
            .await?
            .into_iter()
            .map(ChildEntry::Folder)
            .collect();
        entries.extend(
            self.store
                .files_in(folder.id)
                .await?
                .into_iter()
                .map(ChildEntry::File),
        );
        Ok(page.slice(entries))
    }

    /// Creates a new folder under `parent_id`, owned by the caller.
    pub async fn create_folder(
        &self,
        ctx: &RequestContext,
        parent_id: Uuid,
        name: &str,
    ) -> AppResult<MutationOutcome<Folder>> {
        let parent = lookup::folder(self.store.as_ref(), parent_id).await?;
        let access = self
            .resolver
            .require_folder(&ctx.principal, &parent, PermissionLevel::Write)
            .await?;
        validate_name(name, self.limits.max_name_length)?;

        let chain = self.paths.chain(parent.id).await?;
        let depth = PathVirtualizer::depth(&chain) + 1;
        if depth >= self.limits.max_subfolder_depth {
            return Err(AppError::depth_limit(format!(
                "A folder at depth {depth} would exceed the limit of {}",
                self.limits.max_subfolder_depth
            )));
        }
        self.ensure_folder_name_free(parent.id, name, None).await?;

        let folder = Folder::new(
            Some(parent.id),
            ctx.user_id(),
            name,
            self.paths.new_storage_key(),
        );

        let mut changes = ChangeSet::new();
        changes.require(Precondition::DepthBelow {
            folder_id: parent.id,
            additional: 1,
            limit: self.limits.max_subfolder_depth,
        });
        if let Some(pinned) = Precondition::chain_of(&chain) {
            changes.require(pinned);
        }
        lookup::hold_access(&mut changes, &ctx.principal, &access, PermissionLevel::Write);
        changes.push(Change::InsertFolder(folder.clone()));
        AggregateDelta::folder().stage(&mut changes, chain.iter().map(|f| f.id));
        changes.push(Change::BumpVersion(parent.id));
        self.propagator
            .inherit(
                ScopeNode {
                    node: NodeRef::Folder(folder.id),
                    owner_id: folder.owner_id,
                },
                parent.id,
                &mut changes,
            )
            .await?;
        self.store.commit(changes).await?;

        info!(
            user_id = %ctx.user_id(),
            folder_id = %folder.id,
            parent_id = %parent.id,
            depth,
            "Folder created"
        );

        let mut full_chain = chain;
        full_chain.push(folder.clone());
        let address = PathVirtualizer::folder_address(&full_chain);

        let mut outcome = MutationOutcome::clean(folder);
        self.effects
            .apply(
                NodeRef::Folder(outcome.value.id),
                RepairAction::EnsureDirectory { address },
                &mut outcome,
            )
            .await;
        Ok(outcome)
    }

    /// Renames a folder. Only the display name changes.
    pub async fn rename_folder(
        &self,
        ctx: &RequestContext,
        folder_id: Uuid,
        new_name: &str,
    ) -> AppResult<Folder> {
        let folder = lookup::folder(self.store.as_ref(), folder_id).await?;
        lookup::require_mutable_folder(&self.resolver, &ctx.principal, &folder).await?;
        validate_name(new_name, self.limits.max_name_length)?;
        if folder.name == new_name {
            return Ok(folder);
        }
        if let Some(parent_id) = folder.parent_id {
            self.ensure_folder_name_free(parent_id, new_name, Some(folder.id))
                .await?;
        }

        let mut changes = ChangeSet::new();
        changes.require(Precondition::FolderVersion {
            folder_id: folder.id,
            version: folder.version,
        });
        changes.push(Change::RenameFolder {
            id: folder.id,
            name: new_name.to_string(),
        });
        changes.push(Change::BumpVersion(folder.id));
        self.store.commit(changes).await?;

        info!(
            user_id = %ctx.user_id(),
            folder_id = %folder.id,
            old_name = %folder.name,
            new_name = %new_name,
            "Folder renamed"
        );

        lookup::folder(self.store.as_ref(), folder.id).await
    }

    /// Moves a folder and its subtree under a new parent.
    pub async fn move_folder(
        &self,
        ctx: &RequestContext,
        folder_id: Uuid,
        new_parent_id: Uuid,
    ) -> AppResult<MutationOutcome<Folder>> {
        let folder = lookup::folder(self.store.as_ref(), folder_id).await?;
        let access =
            lookup::require_mutable_folder(&self.resolver, &ctx.principal, &folder).await?;
        let dest = lookup::folder(self.store.as_ref(), new_parent_id).await?;
        let dest_access = self
            .resolver
            .require_folder(&ctx.principal, &dest, PermissionLevel::Write)
            .await?;

        if dest.id == folder.id {
            return Err(AppError::cycle("Cannot move a folder into itself"));
        }
        if folder.parent_id == Some(dest.id) {
            return Ok(MutationOutcome::clean(folder));
        }

        let dest_chain = self.paths.chain(dest.id).await?;
        if dest_chain.iter().any(|f| f.id == folder.id) {
            return Err(AppError::cycle(
                "Cannot move a folder into one of its descendants",
            ));
        }

        let snapshot = self
            .store
            .subtree(folder.id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder {folder_id} not found")))?;
        let height = snapshot.height();
        let deepest = PathVirtualizer::depth(&dest_chain) + 1 + height;
        if deepest >= self.limits.max_subfolder_depth {
            return Err(AppError::depth_limit(format!(
                "Moving here puts a folder at depth {deepest}, the limit is {}",
                self.limits.max_subfolder_depth
            )));
        }
        self.ensure_folder_name_free(dest.id, &folder.name, Some(folder.id))
            .await?;

        let old_chain = self.paths.chain(folder.id).await?;
        let old_address = PathVirtualizer::folder_address(&old_chain);
        let old_ancestors: Vec<Uuid> = old_chain[..old_chain.len() - 1]
            .iter()
            .map(|f| f.id)
            .collect();
        let new_ancestors: Vec<Uuid> = dest_chain.iter().map(|f| f.id).collect();

        let mut changes = ChangeSet::new();
        changes
            .require(Precondition::FolderVersion {
                folder_id: folder.id,
                version: folder.version,
            })
            .require(Precondition::FolderVersion {
                folder_id: dest.id,
                version: dest.version,
            })
            .require(Precondition::OutsideSubtree {
                candidate: dest.id,
                root: folder.id,
            })
            .require(Precondition::DepthBelow {
                folder_id: dest.id,
                additional: 1 + height,
                limit: self.limits.max_subfolder_depth,
            })
            .require(Precondition::totals_of(&folder));
        for chain in [&old_chain, &dest_chain] {
            if let Some(pinned) = Precondition::chain_of(chain) {
                changes.require(pinned);
            }
        }
        lookup::hold_access(&mut changes, &ctx.principal, &access, PermissionLevel::Write);
        lookup::hold_access(&mut changes, &ctx.principal, &dest_access, PermissionLevel::Write);
        changes.push(Change::ReparentFolder {
            id: folder.id,
            parent_id: dest.id,
        });

        let delta = AggregateDelta::subtree(&snapshot);
        delta.negate().stage(
            &mut changes,
            old_ancestors
                .iter()
                .copied()
                .filter(|id| !new_ancestors.contains(id)),
        );
        delta.stage(
            &mut changes,
            new_ancestors
                .iter()
                .copied()
                .filter(|id| !old_ancestors.contains(id)),
        );

        changes.push(Change::BumpVersion(folder.id));
        changes.push(Change::BumpVersion(dest.id));
        if let Some(old_parent) = folder.parent_id {
            changes.push(Change::BumpVersion(old_parent));
        }

        let scope = subtree_scope(&snapshot);
        let rewired = self
            .propagator
            .reattach(&scope, dest.id, &mut changes)
            .await?;
        self.store.commit(changes).await?;

        info!(
            user_id = %ctx.user_id(),
            folder_id = %folder.id,
            new_parent_id = %dest.id,
            grants_removed = rewired.removed,
            grants_created = rewired.created,
            "Folder moved"
        );

        let new_address = format!(
            "{}/{}",
            PathVirtualizer::folder_address(&dest_chain),
            folder.storage_key
        );
        let moved = lookup::folder(self.store.as_ref(), folder.id).await?;
        let mut outcome = MutationOutcome::clean(moved);
        self.effects
            .apply(
                NodeRef::Folder(folder.id),
                RepairAction::Relocate {
                    from: old_address,
                    to: new_address,
                },
                &mut outcome,
            )
            .await;
        Ok(outcome)
    }

    /// Deletes a folder with everything below it.
    pub async fn delete_folder(
        &self,
        ctx: &RequestContext,
        folder_id: Uuid,
    ) -> AppResult<MutationOutcome<DeleteReport>> {
        self.delete_folders(ctx, &[folder_id]).await
    }

    /// Deletes several folders in one transaction.
    ///
    /// Selections nested inside other selections are folded into their
    /// ancestor. Any failure before the commit leaves every folder in place.
    pub async fn delete_folders(
        &self,
        ctx: &RequestContext,
        folder_ids: &[Uuid],
    ) -> AppResult<MutationOutcome<DeleteReport>> {
        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        for &id in folder_ids {
            if !seen.insert(id) {
                continue;
            }
            let folder = lookup::folder(self.store.as_ref(), id).await?;
            let access =
                lookup::require_mutable_folder(&self.resolver, &ctx.principal, &folder).await?;
            let chain = self.paths.chain(id).await?;
            selected.push((folder, chain, access));
        }

        let roots: Vec<(Folder, Vec<Folder>, EffectiveAccess)> = selected
            .iter()
            .filter(|(_, chain, _)| {
                !chain[..chain.len() - 1]
                    .iter()
                    .any(|ancestor| seen.contains(&ancestor.id))
            })
            .cloned()
            .collect();

        let mut report = DeleteReport::default();
        let mut changes = ChangeSet::new();
        let mut addresses = Vec::with_capacity(roots.len());
        for (folder, chain, access) in &roots {
            let snapshot = self
                .store
                .subtree(folder.id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Folder {} not found", folder.id)))?;

            changes.require(Precondition::FolderVersion {
                folder_id: folder.id,
                version: folder.version,
            });
            if let Some(pinned) = Precondition::chain_of(chain) {
                changes.require(pinned);
            }
            lookup::hold_access(&mut changes, &ctx.principal, access, PermissionLevel::Write);
            for doomed in snapshot.post_order() {
                for file in snapshot.files_in(doomed.id) {
                    let node = NodeRef::File(file.id);
                    changes.push(Change::DeleteGrantsOn(node));
                    changes.push(Change::DeleteFavoritesOn(node));
                    changes.push(Change::DeleteFile(file.id));
                }
                let node = NodeRef::Folder(doomed.id);
                changes.push(Change::DeleteGrantsOn(node));
                changes.push(Change::DeleteFavoritesOn(node));
                changes.push(Change::DeleteFolder(doomed.id));
            }

            AggregateDelta::subtree(&snapshot)
                .negate()
                .stage(&mut changes, chain[..chain.len() - 1].iter().map(|f| f.id));
            if let Some(parent_id) = folder.parent_id {
                changes.push(Change::BumpVersion(parent_id));
            }

            report.folders += snapshot.folder_count() as u64;
            report.files += snapshot.file_count() as u64;
            report.bytes += snapshot.total_bytes().max(0) as u64;
            addresses.push((folder.id, PathVirtualizer::folder_address(chain)));
        }

        if changes.is_empty() {
            return Ok(MutationOutcome::clean(report));
        }
        self.store.commit(changes).await?;

        info!(
            user_id = %ctx.user_id(),
            selected = roots.len(),
            folders = report.folders,
            files = report.files,
            bytes = report.bytes,
            "Folders deleted"
        );

        let mut outcome = MutationOutcome::clean(report);
        for (folder_id, address) in addresses {
            self.effects
                .apply(
                    NodeRef::Folder(folder_id),
                    RepairAction::RemoveDirectory { address },
                    &mut outcome,
                )
                .await;
        }
        if outcome.is_degraded() {
            warn!(
                user_id = %ctx.user_id(),
                warnings = outcome.warnings.len(),
                "Folder delete left storage behind"
            );
        }
        Ok(outcome)
    }

    /// Display path of a folder or file.
    pub async fn display_path(&self, ctx: &RequestContext, node: NodeRef) -> AppResult<String> {
        lookup::require(
            self.store.as_ref(),
            &self.resolver,
            &ctx.principal,
            node,
            PermissionLevel::Read,
        )
        .await?;
        self.paths.display_path(node).await
    }

    /// Storage address of a folder or file.
    pub async fn storage_address(&self, ctx: &RequestContext, node: NodeRef) -> AppResult<String> {
        lookup::require(
            self.store.as_ref(),
            &self.resolver,
            &ctx.principal,
            node,
            PermissionLevel::Read,
        )
        .await?;
        self.paths.storage_address(node).await
    }

    /// Subtree statistics from the maintained counters.
    pub async fn calculate_subtree_size(
        &self,
        ctx: &RequestContext,
        node: NodeRef,
    ) -> AppResult<SubtreeStats> {
        lookup::require(
            self.store.as_ref(),
            &self.resolver,
            &ctx.principal,
            node,
            PermissionLevel::Read,
        )
        .await?;
        self.sizes.subtree_size(node).await
    }

    /// Recompute a folder's subtree statistics and correct drifted counters.
    pub async fn recompute_subtree_size(
        &self,
        ctx: &RequestContext,
        folder_id: Uuid,
    ) -> AppResult<RecomputeReport> {
        let folder = lookup::folder(self.store.as_ref(), folder_id).await?;
        self.resolver
            .require_folder(&ctx.principal, &folder, PermissionLevel::Write)
            .await?;

        let mut changes = ChangeSet::new();
        let report = self.sizes.reconcile(folder.id, &mut changes).await?;
        if !changes.is_empty() {
            self.store.commit(changes).await?;
            warn!(
                user_id = %ctx.user_id(),
                folder_id = %folder.id,
                corrected = report.corrected,
                "Aggregate counters drifted and were corrected"
            );
        }
        Ok(report)
    }

    async fn ensure_folder_name_free(
        &self,
        parent_id: Uuid,
        name: &str,
        except: Option<Uuid>,
    ) -> AppResult<()> {
        let taken = self
            .store
            .child_folders(parent_id)
            .await?
            .iter()
            .any(|f| f.name == name && Some(f.id) != except);
        if taken {
            return Err(AppError::name_conflict(format!(
                "A folder named '{name}' already exists here"
            )));
        }
        Ok(())
    }
}
