//! PostgreSQL-backed [`TreeStore`].

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use canopy_core::{AppError, AppResult};
use canopy_entity::NodeRef;
use canopy_entity::favorite::Favorite;
use canopy_entity::file::File;
use canopy_entity::folder::Folder;
use canopy_entity::permission::PermissionGrant;
use canopy_entity::repair::RepairTicket;

use super::changeset::{Change, ChangeSet, Precondition};
use super::snapshot::SubtreeSnapshot;
use super::TreeStore;
use crate::error::map_db_error;
use crate::repositories::{
    FavoriteRepository, FileRepository, FolderRepository, GrantRepository, RepairRepository,
};

/// A [`TreeStore`] over the repositories in this crate.
///
/// A commit runs in one transaction. Version and counter preconditions take
/// `FOR UPDATE` locks in ID order before any structural check runs, so two
/// moves touching the same folders serialize instead of deadlocking. Chain
/// and grant checks hold `FOR SHARE` locks until the commit.
#[derive(Debug, Clone)]
pub struct PgTreeStore {
    pool: PgPool,
    folders: FolderRepository,
    files: FileRepository,
    grants: GrantRepository,
    favorites: FavoriteRepository,
    repairs: RepairRepository,
}

impl PgTreeStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            folders: FolderRepository::new(pool.clone()),
            files: FileRepository::new(pool.clone()),
            grants: GrantRepository::new(pool.clone()),
            favorites: FavoriteRepository::new(pool.clone()),
            repairs: RepairRepository::new(pool.clone()),
            pool,
        }
    }

    async fn check(conn: &mut PgConnection, precondition: &Precondition) -> AppResult<()> {
        match *precondition {
            Precondition::FolderVersion { folder_id, version } => {
                let current = FolderRepository::lock_version(conn, folder_id).await?;
                if current != version {
                    return Err(AppError::conflict(format!(
                        "Folder {folder_id} was modified concurrently"
                    )));
                }
            }
            Precondition::OutsideSubtree { candidate, root } => {
                let chain = FolderRepository::ancestor_ids_in(conn, candidate).await?;
                if chain.is_empty() {
                    return Err(AppError::not_found(format!("Folder {candidate} not found")));
                }
                if chain.contains(&root) {
                    return Err(AppError::cycle(format!(
                        "Folder {candidate} is inside the subtree of {root}"
                    )));
                }
            }
            Precondition::DepthBelow {
                folder_id,
                additional,
                limit,
            } => {
                let chain = FolderRepository::ancestor_ids_in(conn, folder_id).await?;
                if chain.is_empty() {
                    return Err(AppError::not_found(format!("Folder {folder_id} not found")));
                }
                let depth = chain.len() as u32 - 1;
                if depth + additional >= limit {
                    return Err(AppError::depth_limit(format!(
                        "Depth {} would reach the limit of {limit}",
                        depth + additional
                    )));
                }
            }
            Precondition::AncestorChain {
                folder_id,
                ref chain,
            } => {
                let live = FolderRepository::lock_chain(conn, folder_id).await?;
                if live.is_empty() {
                    return Err(AppError::not_found(format!("Folder {folder_id} not found")));
                }
                if &live != chain {
                    return Err(AppError::conflict(format!(
                        "Folder {folder_id} was moved concurrently"
                    )));
                }
            }
            Precondition::SubtreeTotals {
                folder_id,
                bytes,
                files,
                folders,
            } => {
                let current = FolderRepository::lock_totals(conn, folder_id).await?;
                if current != (bytes, files, folders) {
                    return Err(AppError::conflict(format!(
                        "Contents of folder {folder_id} changed concurrently"
                    )));
                }
            }
            Precondition::GrantHeld {
                user_id,
                target_id,
                level,
            } => {
                let held = GrantRepository::lock_level(conn, user_id, target_id).await?;
                if !held.is_some_and(|l| l.satisfies(level)) {
                    return Err(AppError::conflict(format!(
                        "Access of user {user_id} changed concurrently"
                    )));
                }
            }
        }
        Ok(())
    }

    async fn apply(conn: &mut PgConnection, change: &Change) -> AppResult<()> {
        match change {
            Change::InsertFolder(folder) => FolderRepository::insert(conn, folder).await,
            Change::RenameFolder { id, name } => FolderRepository::rename(conn, *id, name).await,
            Change::ReparentFolder { id, parent_id } => {
                FolderRepository::reparent(conn, *id, *parent_id).await
            }
            Change::DeleteFolder(id) => FolderRepository::delete(conn, *id).await,
            Change::InsertFile(file) => FileRepository::insert(conn, file).await,
            Change::RenameFile { id, name } => FileRepository::rename(conn, *id, name).await,
            Change::MoveFile { id, folder_id } => {
                FileRepository::move_file(conn, *id, *folder_id).await
            }
            Change::DeleteFile(id) => FileRepository::delete(conn, *id).await,
            Change::InsertGrant(grant) => GrantRepository::insert(conn, grant).await,
            Change::UpdateGrant {
                id,
                level,
                source_id,
            } => GrantRepository::update(conn, *id, *level, *source_id).await,
            Change::DeleteGrant(id) => GrantRepository::delete(conn, *id).await.map(|_| ()),
            Change::DeleteGrantsOn(target) => GrantRepository::delete_by_target(conn, target.id())
                .await
                .map(|_| ()),
            Change::InsertFavorite(favorite) => FavoriteRepository::insert(conn, favorite).await,
            Change::DeleteFavorite { user_id, target } => {
                FavoriteRepository::delete(conn, *user_id, target.id())
                    .await
                    .map(|_| ())
            }
            Change::DeleteFavoritesOn(target) => {
                FavoriteRepository::delete_by_target(conn, target.id())
                    .await
                    .map(|_| ())
            }
            Change::AdjustAggregates {
                folder_id,
                bytes,
                files,
                folders,
            } => FolderRepository::adjust_aggregates(conn, *folder_id, *bytes, *files, *folders)
                .await,
            Change::SetAggregates {
                folder_id,
                bytes,
                files,
                folders,
            } => FolderRepository::set_aggregates(conn, *folder_id, *bytes, *files, *folders)
                .await,
            Change::BumpVersion(id) => FolderRepository::bump_version(conn, *id).await,
        }
    }
}

#[async_trait]
impl TreeStore for PgTreeStore {
    async fn find_folder(&self, id: Uuid) -> AppResult<Option<Folder>> {
        self.folders.find_by_id(id).await
    }

    async fn find_file(&self, id: Uuid) -> AppResult<Option<File>> {
        self.files.find_by_id(id).await
    }

    async fn find_root(&self, owner_id: Uuid) -> AppResult<Option<Folder>> {
        self.folders.find_root(owner_id).await
    }

    async fn ancestors(&self, folder_id: Uuid) -> AppResult<Vec<Folder>> {
        self.folders.find_ancestors(folder_id).await
    }

    async fn child_folders(&self, parent_id: Uuid) -> AppResult<Vec<Folder>> {
        self.folders.find_children(parent_id).await
    }

    async fn files_in(&self, folder_id: Uuid) -> AppResult<Vec<File>> {
        self.files.find_by_folder(folder_id).await
    }

    async fn subtree(&self, folder_id: Uuid) -> AppResult<Option<SubtreeSnapshot>> {
        let folders = self.folders.find_subtree(folder_id).await?;
        if folders.is_empty() {
            return Ok(None);
        }
        let ids: Vec<Uuid> = folders.iter().map(|f| f.id).collect();
        let files = self.files.find_in_folders(&ids).await?;
        Ok(SubtreeSnapshot::build(folder_id, folders, files))
    }

    async fn find_grant(&self, user_id: Uuid, target_id: Uuid) -> AppResult<Option<PermissionGrant>> {
        self.grants.find_user_grant(user_id, target_id).await
    }

    async fn grants_for_user(
        &self,
        user_id: Uuid,
        target_ids: &[Uuid],
    ) -> AppResult<Vec<PermissionGrant>> {
        self.grants.find_user_grants(user_id, target_ids).await
    }

    async fn grants_on(&self, target_id: Uuid) -> AppResult<Vec<PermissionGrant>> {
        self.grants.find_by_target(target_id).await
    }

    async fn grants_on_many(&self, target_ids: &[Uuid]) -> AppResult<Vec<PermissionGrant>> {
        self.grants.find_by_targets(target_ids).await
    }

    async fn favorites_for_user(&self, user_id: Uuid) -> AppResult<Vec<Favorite>> {
        self.favorites.find_by_user(user_id).await
    }

    async fn is_favorite(&self, user_id: Uuid, target: NodeRef) -> AppResult<bool> {
        self.favorites.exists(user_id, target.id()).await
    }

    async fn commit(&self, changes: ChangeSet) -> AppResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_error("Failed to begin transaction", e))?;

        let mut preconditions = changes.preconditions().to_vec();
        preconditions.sort_by_key(Precondition::lock_order);
        for precondition in &preconditions {
            Self::check(&mut *tx, precondition).await?;
        }
        for change in changes.changes() {
            Self::apply(&mut *tx, change).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_db_error("Failed to commit transaction", e))?;
        debug!(changes = changes.len(), "Committed change set");
        Ok(())
    }

    async fn open_repair(&self, ticket: RepairTicket) -> AppResult<()> {
        self.repairs.create(&ticket).await
    }

    async fn pending_repairs(&self, limit: i64, max_attempts: i32) -> AppResult<Vec<RepairTicket>> {
        self.repairs.find_pending(limit, max_attempts).await
    }

    async fn record_repair_failure(&self, id: Uuid, error: &str) -> AppResult<()> {
        self.repairs.record_failure(id, error).await
    }

    async fn close_repair(&self, id: Uuid) -> AppResult<()> {
        self.repairs.delete(id).await
    }
}
