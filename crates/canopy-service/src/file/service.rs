//! File create, rename, move and delete with ACL enforcement.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use canopy_auth::acl::propagation::ScopeNode;
use canopy_auth::{PermissionPropagator, PermissionResolver};
use canopy_core::AppError;
use canopy_core::config::TreeConfig;
use canopy_core::result::AppResult;
use canopy_core::traits::storage::ObjectStore;
use canopy_database::{Change, ChangeSet, Precondition, TreeStore};
use canopy_entity::NodeRef;
use canopy_entity::file::File;
use canopy_entity::folder::Folder;
use canopy_entity::permission::PermissionLevel;
use canopy_entity::repair::RepairAction;

use crate::context::RequestContext;
use crate::effects::StorageEffects;
use crate::lookup;
use crate::outcome::MutationOutcome;
use crate::path::PathVirtualizer;
use crate::size::AggregateDelta;
use crate::validation::validate_name;

const DEFAULT_MIME: &str = "application/octet-stream";

/// Data for creating a file.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CreateFileRequest {
    /// Folder receiving the file.
    pub folder_id: Uuid,
    /// File name.
    pub name: String,
    /// MIME type; detected from the name or content when absent.
    pub mime_type: Option<String>,
}

/// Handles file mutations and reads.
#[derive(Debug, Clone)]
pub struct FileService {
    /// Relational tree store.
    store: Arc<dyn TreeStore>,
    /// Physical object store.
    objects: Arc<dyn ObjectStore>,
    /// Permission resolver.
    resolver: Arc<PermissionResolver>,
    /// Grant propagator.
    propagator: Arc<PermissionPropagator>,
    /// Key and path computation.
    paths: Arc<PathVirtualizer>,
    /// Post-commit storage effects.
    effects: Arc<StorageEffects>,
    /// Tree limits.
    limits: TreeConfig,
    /// Largest accepted object.
    max_object_size: u64,
}

impl FileService {
    /// Creates a new file service.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TreeStore>,
        objects: Arc<dyn ObjectStore>,
        resolver: Arc<PermissionResolver>,
        propagator: Arc<PermissionPropagator>,
        paths: Arc<PathVirtualizer>,
        effects: Arc<StorageEffects>,
        limits: TreeConfig,
        max_object_size: u64,
    ) -> Self {
        Self {
            store,
            objects,
            resolver,
            propagator,
            paths,
            effects,
            limits,
            max_object_size,
        }
    }

    /// Gets a file by ID.
    pub async fn get_file(&self, ctx: &RequestContext, file_id: Uuid) -> AppResult<File> {
        let file = lookup::file(self.store.as_ref(), file_id).await?;
        self.resolver
            .require_file(&ctx.principal, &file, PermissionLevel::Read)
            .await?;
        Ok(file)
    }

    /// Reads a file's content.
    pub async fn read_file(&self, ctx: &RequestContext, file_id: Uuid) -> AppResult<Bytes> {
        let file = self.get_file(ctx, file_id).await?;
        let chain = self.paths.chain(file.folder_id).await?;
        self.objects
            .read_bytes(&PathVirtualizer::file_address(&chain, &file))
            .await
    }

    /// Stores a new file.
    ///
    /// The object is written first. If the relational commit then fails the
    /// object is deleted again; if that also fails a repair ticket is opened.
    pub async fn create_file(
        &self,
        ctx: &RequestContext,
        req: CreateFileRequest,
        data: Bytes,
    ) -> AppResult<MutationOutcome<File>> {
        let folder = lookup::folder(self.store.as_ref(), req.folder_id).await?;
        let access = self
            .resolver
            .require_folder(&ctx.principal, &folder, PermissionLevel::Write)
            .await?;
        validate_name(&req.name, self.limits.max_name_length)?;
        let size = data.len() as u64;
        if size > self.max_object_size {
            return Err(AppError::validation(format!(
                "File of {size} bytes exceeds the limit of {} bytes",
                self.max_object_size
            )));
        }
        self.ensure_file_name_free(folder.id, &req.name, None).await?;

        let chain = self.paths.chain(folder.id).await?;
        let now = Utc::now();
        let mut file = File {
            id: Uuid::new_v4(),
            folder_id: folder.id,
            owner_id: ctx.user_id(),
            name: req.name,
            storage_key: self.paths.new_storage_key(),
            size_bytes: size as i64,
            mime_type: DEFAULT_MIME.to_string(),
            created_at: now,
            updated_at: now,
        };
        let address = PathVirtualizer::file_address(&chain, &file);

        self.objects.put(&address, data).await?;
        let guessed = mime_guess::from_path(&file.name).first().map(|m| m.to_string());
        file.mime_type = match req.mime_type.or(guessed) {
            Some(mime) => mime,
            None => self
                .objects
                .mime_type(&address)
                .await
                .unwrap_or_else(|_| DEFAULT_MIME.to_string()),
        };

        let mut changes = ChangeSet::new();
        if let Some(pinned) = Precondition::chain_of(&chain) {
            changes.require(pinned);
        }
        lookup::hold_access(&mut changes, &ctx.principal, &access, PermissionLevel::Write);
        changes.push(Change::InsertFile(file.clone()));
        AggregateDelta::file(file.size_bytes).stage(&mut changes, chain.iter().map(|f| f.id));
        changes.push(Change::BumpVersion(folder.id));

        let planned = self
            .propagator
            .inherit(
                ScopeNode {
                    node: NodeRef::File(file.id),
                    owner_id: file.owner_id,
                },
                folder.id,
                &mut changes,
            )
            .await;
        let committed = match planned {
            Ok(_) => self.store.commit(changes).await,
            Err(e) => Err(e),
        };
        if let Err(e) = committed {
            self.compensate(&file, &address).await;
            return Err(e);
        }

        info!(
            user_id = %ctx.user_id(),
            file_id = %file.id,
            folder_id = %folder.id,
            size_bytes = file.size_bytes,
            "File created"
        );
        Ok(MutationOutcome::clean(file))
    }

    /// Renames a file. The storage address is unchanged.
    pub async fn rename_file(
        &self,
        ctx: &RequestContext,
        file_id: Uuid,
        new_name: &str,
    ) -> AppResult<File> {
        let file = lookup::file(self.store.as_ref(), file_id).await?;
        self.resolver
            .require_file(&ctx.principal, &file, PermissionLevel::Write)
            .await?;
        validate_name(new_name, self.limits.max_name_length)?;
        if file.name == new_name {
            return Ok(file);
        }
        self.ensure_file_name_free(file.folder_id, new_name, Some(file.id))
            .await?;

        let mut changes = ChangeSet::new();
        changes.push(Change::RenameFile {
            id: file.id,
            name: new_name.to_string(),
        });
        changes.push(Change::BumpVersion(file.folder_id));
        self.store.commit(changes).await?;

        info!(
            user_id = %ctx.user_id(),
            file_id = %file.id,
            old_name = %file.name,
            new_name = %new_name,
            "File renamed"
        );
        lookup::file(self.store.as_ref(), file.id).await
    }

    /// Moves a file into another folder.
    pub async fn move_file(
        &self,
        ctx: &RequestContext,
        file_id: Uuid,
        target_folder_id: Uuid,
    ) -> AppResult<MutationOutcome<File>> {
        let file = lookup::file(self.store.as_ref(), file_id).await?;
        let access = self
            .resolver
            .require_file(&ctx.principal, &file, PermissionLevel::Write)
            .await?;
        let dest = lookup::folder(self.store.as_ref(), target_folder_id).await?;
        let dest_access = self
            .resolver
            .require_folder(&ctx.principal, &dest, PermissionLevel::Write)
            .await?;
        if file.folder_id == dest.id {
            return Ok(MutationOutcome::clean(file));
        }
        self.ensure_file_name_free(dest.id, &file.name, Some(file.id))
            .await?;

        let old_chain = self.paths.chain(file.folder_id).await?;
        let new_chain = self.paths.chain(dest.id).await?;
        let old_address = PathVirtualizer::file_address(&old_chain, &file);
        let new_address = PathVirtualizer::file_address(&new_chain, &file);
        let old_ids: Vec<Uuid> = old_chain.iter().map(|f| f.id).collect();
        let new_ids: Vec<Uuid> = new_chain.iter().map(|f| f.id).collect();

        let mut changes = ChangeSet::new();
        changes.require(Precondition::FolderVersion {
            folder_id: dest.id,
            version: dest.version,
        });
        pin_folder(&mut changes, &old_chain);
        pin_folder(&mut changes, &new_chain);
        lookup::hold_access(&mut changes, &ctx.principal, &access, PermissionLevel::Write);
        lookup::hold_access(&mut changes, &ctx.principal, &dest_access, PermissionLevel::Write);
        changes.push(Change::MoveFile {
            id: file.id,
            folder_id: dest.id,
        });
        let delta = AggregateDelta::file(file.size_bytes);
        delta
            .negate()
            .stage(&mut changes, old_ids.iter().copied().filter(|id| !new_ids.contains(id)));
        delta.stage(&mut changes, new_ids.iter().copied().filter(|id| !old_ids.contains(id)));
        changes.push(Change::BumpVersion(file.folder_id));
        changes.push(Change::BumpVersion(dest.id));
        self.propagator
            .reattach(
                &[ScopeNode {
                    node: NodeRef::File(file.id),
                    owner_id: file.owner_id,
                }],
                dest.id,
                &mut changes,
            )
            .await?;
        self.store.commit(changes).await?;

        info!(
            user_id = %ctx.user_id(),
            file_id = %file.id,
            from_folder_id = %file.folder_id,
            to_folder_id = %dest.id,
            "File moved"
        );

        let moved = lookup::file(self.store.as_ref(), file.id).await?;
        let mut outcome = MutationOutcome::clean(moved);
        self.effects
            .apply(
                NodeRef::File(file.id),
                RepairAction::Relocate {
                    from: old_address,
                    to: new_address,
                },
                &mut outcome,
            )
            .await;
        Ok(outcome)
    }

    /// Deletes a file, its grants and favorites, then its object.
    pub async fn delete_file(
        &self,
        ctx: &RequestContext,
        file_id: Uuid,
    ) -> AppResult<MutationOutcome<File>> {
        let file = lookup::file(self.store.as_ref(), file_id).await?;
        let access = self
            .resolver
            .require_file(&ctx.principal, &file, PermissionLevel::Write)
            .await?;
        let chain = self.paths.chain(file.folder_id).await?;
        let address = PathVirtualizer::file_address(&chain, &file);

        let node = NodeRef::File(file.id);
        let mut changes = ChangeSet::new();
        pin_folder(&mut changes, &chain);
        lookup::hold_access(&mut changes, &ctx.principal, &access, PermissionLevel::Write);
        changes.push(Change::DeleteGrantsOn(node));
        changes.push(Change::DeleteFavoritesOn(node));
        changes.push(Change::DeleteFile(file.id));
        AggregateDelta::file(file.size_bytes)
            .negate()
            .stage(&mut changes, chain.iter().map(|f| f.id));
        changes.push(Change::BumpVersion(file.folder_id));
        self.store.commit(changes).await?;

        info!(
            user_id = %ctx.user_id(),
            file_id = %file.id,
            folder_id = %file.folder_id,
            "File deleted"
        );

        let mut outcome = MutationOutcome::clean(file);
        self.effects
            .apply(node, RepairAction::RemoveObject { address }, &mut outcome)
            .await;
        Ok(outcome)
    }

    /// Remove an uploaded object whose row never committed.
    ///
    /// A folder move that won the race has already carried the object to the
    /// folder's new address, so the live address is cleaned up as well.
    async fn compensate(&self, file: &File, address: &str) {
        let mut addresses = vec![address.to_string()];
        if let Ok(chain) = self.paths.chain(file.folder_id).await {
            if !chain.is_empty() {
                let live = PathVirtualizer::file_address(&chain, file);
                if live != address {
                    addresses.push(live);
                }
            }
        }
        for address in addresses {
            if let Err(e) = self.objects.delete(&address).await {
                error!(
                    file_id = %file.id,
                    address = %address,
                    error = %e,
                    "Failed to remove orphaned object"
                );
                self.effects
                    .defer(
                        NodeRef::File(file.id),
                        RepairAction::RemoveObject { address },
                        e,
                    )
                    .await;
            }
        }
    }

    async fn ensure_file_name_free(
        &self,
        folder_id: Uuid,
        name: &str,
        except: Option<Uuid>,
    ) -> AppResult<()> {
        let taken = self
            .store
            .files_in(folder_id)
            .await?
            .iter()
            .any(|f| f.name == name && Some(f.id) != except);
        if taken {
            return Err(AppError::name_conflict(format!(
                "A file named '{name}' already exists here"
            )));
        }
        Ok(())
    }
}

/// Pin the containing folder: its version and its place in the tree.
fn pin_folder(changes: &mut ChangeSet, chain: &[Folder]) {
    if let Some(folder) = chain.last() {
        changes.require(Precondition::FolderVersion {
            folder_id: folder.id,
            version: folder.version,
        });
    }
    if let Some(pinned) = Precondition::chain_of(chain) {
        changes.require(pinned);
    }
}
