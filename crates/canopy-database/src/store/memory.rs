//! Process-local [`TreeStore`] used by tests and single-node tooling.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
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

#[derive(Debug, Clone, Default)]
struct State {
    folders: HashMap<Uuid, Folder>,
    files: HashMap<Uuid, File>,
    grants: HashMap<Uuid, PermissionGrant>,
    favorites: Vec<Favorite>,
    repairs: HashMap<Uuid, RepairTicket>,
}

impl State {
    fn folder(&self, id: Uuid) -> AppResult<&Folder> {
        self.folders
            .get(&id)
            .ok_or_else(|| AppError::not_found(format!("Folder {id} not found")))
    }

    fn folder_mut(&mut self, id: Uuid) -> AppResult<&mut Folder> {
        self.folders
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Folder {id} not found")))
    }

    fn file_mut(&mut self, id: Uuid) -> AppResult<&mut File> {
        self.files
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("File {id} not found")))
    }

    /// Root-first ancestor chain including `id`.
    fn chain(&self, id: Uuid) -> AppResult<Vec<Folder>> {
        let mut chain = Vec::new();
        let mut cursor = self.folders.get(&id);
        while let Some(folder) = cursor {
            if chain.len() > self.folders.len() {
                return Err(AppError::inconsistent(format!(
                    "Parent chain of folder {id} does not terminate"
                )));
            }
            chain.push(folder.clone());
            cursor = folder.parent_id.and_then(|p| self.folders.get(&p));
        }
        chain.reverse();
        Ok(chain)
    }

    fn folder_name_taken(&self, parent_id: Uuid, name: &str, except: Option<Uuid>) -> bool {
        self.folders.values().any(|f| {
            f.parent_id == Some(parent_id) && f.name == name && Some(f.id) != except
        })
    }

    fn file_name_taken(&self, folder_id: Uuid, name: &str, except: Option<Uuid>) -> bool {
        self.files
            .values()
            .any(|f| f.folder_id == folder_id && f.name == name && Some(f.id) != except)
    }

    fn check(&self, precondition: &Precondition) -> AppResult<()> {
        match *precondition {
            Precondition::FolderVersion { folder_id, version } => {
                let folder = self.folder(folder_id)?;
                if folder.version != version {
                    return Err(AppError::conflict(format!(
                        "Folder {folder_id} was modified concurrently"
                    )));
                }
            }
            Precondition::OutsideSubtree { candidate, root } => {
                self.folder(candidate)?;
                if self.chain(candidate)?.iter().any(|f| f.id == root) {
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
                self.folder(folder_id)?;
                let depth = self.chain(folder_id)?.len() as u32 - 1;
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
                self.folder(folder_id)?;
                let live: Vec<Uuid> = self.chain(folder_id)?.iter().map(|f| f.id).collect();
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
                let folder = self.folder(folder_id)?;
                if (folder.subtree_bytes, folder.subtree_files, folder.subtree_folders)
                    != (bytes, files, folders)
                {
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
                let held = self
                    .grants
                    .values()
                    .find(|g| g.user_id == user_id && g.target_id == target_id);
                if !held.is_some_and(|g| g.level.satisfies(level)) {
                    return Err(AppError::conflict(format!(
                        "Access of user {user_id} changed concurrently"
                    )));
                }
            }
        }
        Ok(())
    }

    fn node_exists(&self, target: NodeRef) -> bool {
        match target {
            NodeRef::Folder(id) => self.folders.contains_key(&id),
            NodeRef::File(id) => self.files.contains_key(&id),
        }
    }

    fn apply(&mut self, change: Change) -> AppResult<()> {
        let now = Utc::now();
        match change {
            Change::InsertFolder(folder) => {
                if self.folders.contains_key(&folder.id) {
                    return Err(AppError::conflict(format!("Folder {} already exists", folder.id)));
                }
                match folder.parent_id {
                    Some(parent_id) => {
                        self.folder(parent_id)?;
                        if self.folder_name_taken(parent_id, &folder.name, None) {
                            return Err(AppError::name_conflict(format!(
                                "A folder named '{}' already exists here",
                                folder.name
                            )));
                        }
                    }
                    None => {
                        if self
                            .folders
                            .values()
                            .any(|f| f.is_root() && f.owner_id == folder.owner_id)
                        {
                            return Err(AppError::conflict(format!(
                                "User {} already has a root folder",
                                folder.owner_id
                            )));
                        }
                    }
                }
                self.folders.insert(folder.id, folder);
            }
            Change::RenameFolder { id, name } => {
                let parent_id = self.folder(id)?.parent_id;
                if let Some(parent_id) = parent_id {
                    if self.folder_name_taken(parent_id, &name, Some(id)) {
                        return Err(AppError::name_conflict(format!(
                            "A folder named '{name}' already exists here"
                        )));
                    }
                }
                let folder = self.folder_mut(id)?;
                folder.name = name;
                folder.updated_at = now;
            }
            Change::ReparentFolder { id, parent_id } => {
                self.folder(parent_id)?;
                let name = self.folder(id)?.name.clone();
                if self.folder_name_taken(parent_id, &name, Some(id)) {
                    return Err(AppError::name_conflict(format!(
                        "A folder named '{name}' already exists in the destination"
                    )));
                }
                let folder = self.folder_mut(id)?;
                folder.parent_id = Some(parent_id);
                folder.updated_at = now;
            }
            Change::DeleteFolder(id) => {
                self.folder(id)?;
                let has_children = self.folders.values().any(|f| f.parent_id == Some(id));
                let has_files = self.files.values().any(|f| f.folder_id == id);
                if has_children || has_files {
                    return Err(AppError::conflict(format!("Folder {id} is not empty")));
                }
                self.folders.remove(&id);
            }
            Change::InsertFile(file) => {
                if self.files.contains_key(&file.id) {
                    return Err(AppError::conflict(format!("File {} already exists", file.id)));
                }
                self.folder(file.folder_id)?;
                if self.file_name_taken(file.folder_id, &file.name, None) {
                    return Err(AppError::name_conflict(format!(
                        "A file named '{}' already exists here",
                        file.name
                    )));
                }
                self.files.insert(file.id, file);
            }
            Change::RenameFile { id, name } => {
                let folder_id = self.file_mut(id)?.folder_id;
                if self.file_name_taken(folder_id, &name, Some(id)) {
                    return Err(AppError::name_conflict(format!(
                        "A file named '{name}' already exists here"
                    )));
                }
                let file = self.file_mut(id)?;
                file.name = name;
                file.updated_at = now;
            }
            Change::MoveFile { id, folder_id } => {
                self.folder(folder_id)?;
                let name = self.file_mut(id)?.name.clone();
                if self.file_name_taken(folder_id, &name, Some(id)) {
                    return Err(AppError::name_conflict(format!(
                        "A file named '{name}' already exists in the destination"
                    )));
                }
                let file = self.file_mut(id)?;
                file.folder_id = folder_id;
                file.updated_at = now;
            }
            Change::DeleteFile(id) => {
                if self.files.remove(&id).is_none() {
                    return Err(AppError::not_found(format!("File {id} not found")));
                }
            }
            Change::InsertGrant(grant) => {
                if !self.node_exists(grant.target()) {
                    return Err(AppError::not_found(format!("{} not found", grant.target())));
                }
                if self
                    .grants
                    .values()
                    .any(|g| g.user_id == grant.user_id && g.target_id == grant.target_id)
                {
                    return Err(AppError::conflict(format!(
                        "User {} already has a grant on {}",
                        grant.user_id,
                        grant.target()
                    )));
                }
                self.grants.insert(grant.id, grant);
            }
            Change::UpdateGrant {
                id,
                level,
                source_id,
            } => {
                let grant = self
                    .grants
                    .get_mut(&id)
                    .ok_or_else(|| AppError::not_found(format!("Grant {id} not found")))?;
                grant.level = level;
                grant.source_id = source_id;
            }
            Change::DeleteGrant(id) => {
                self.grants.remove(&id);
            }
            Change::DeleteGrantsOn(target) => {
                self.grants.retain(|_, g| g.target_id != target.id());
            }
            Change::InsertFavorite(favorite) => {
                if self
                    .favorites
                    .iter()
                    .any(|f| f.user_id == favorite.user_id && f.target_id == favorite.target_id)
                {
                    return Err(AppError::conflict("Node is already a favorite"));
                }
                self.favorites.push(favorite);
            }
            Change::DeleteFavorite { user_id, target } => {
                self.favorites
                    .retain(|f| !(f.user_id == user_id && f.target_id == target.id()));
            }
            Change::DeleteFavoritesOn(target) => {
                self.favorites.retain(|f| f.target_id != target.id());
            }
            Change::AdjustAggregates {
                folder_id,
                bytes,
                files,
                folders,
            } => {
                let folder = self.folder_mut(folder_id)?;
                folder.subtree_bytes += bytes;
                folder.subtree_files += files;
                folder.subtree_folders += folders;
            }
            Change::SetAggregates {
                folder_id,
                bytes,
                files,
                folders,
            } => {
                let folder = self.folder_mut(folder_id)?;
                folder.subtree_bytes = bytes;
                folder.subtree_files = files;
                folder.subtree_folders = folders;
            }
            Change::BumpVersion(id) => {
                let folder = self.folder_mut(id)?;
                folder.version += 1;
                folder.updated_at = now;
            }
        }
        Ok(())
    }
}

/// A [`TreeStore`] backed by in-process maps.
///
/// A commit works on a copy of the state and swaps it in only when every
/// precondition and change succeeded, so a failed commit leaves no trace.
#[derive(Debug, Default)]
pub struct MemoryTreeStore {
    state: RwLock<State>,
}

impl MemoryTreeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    async fn find_folder(&self, id: Uuid) -> AppResult<Option<Folder>> {
        Ok(self.state.read().await.folders.get(&id).cloned())
    }

    async fn find_file(&self, id: Uuid) -> AppResult<Option<File>> {
        Ok(self.state.read().await.files.get(&id).cloned())
    }

    async fn find_root(&self, owner_id: Uuid) -> AppResult<Option<Folder>> {
        let state = self.state.read().await;
        Ok(state
            .folders
            .values()
            .find(|f| f.is_root() && f.owner_id == owner_id)
            .cloned())
    }

    async fn ancestors(&self, folder_id: Uuid) -> AppResult<Vec<Folder>> {
        self.state.read().await.chain(folder_id)
    }

    async fn child_folders(&self, parent_id: Uuid) -> AppResult<Vec<Folder>> {
        let state = self.state.read().await;
        let mut children: Vec<Folder> = state
            .folders
            .values()
            .filter(|f| f.parent_id == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn files_in(&self, folder_id: Uuid) -> AppResult<Vec<File>> {
        let state = self.state.read().await;
        let mut files: Vec<File> = state
            .files
            .values()
            .filter(|f| f.folder_id == folder_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn subtree(&self, folder_id: Uuid) -> AppResult<Option<SubtreeSnapshot>> {
        let state = self.state.read().await;
        if !state.folders.contains_key(&folder_id) {
            return Ok(None);
        }
        Ok(SubtreeSnapshot::build(
            folder_id,
            state.folders.values().cloned().collect(),
            state.files.values().cloned().collect(),
        ))
    }

    async fn find_grant(&self, user_id: Uuid, target_id: Uuid) -> AppResult<Option<PermissionGrant>> {
        let state = self.state.read().await;
        Ok(state
            .grants
            .values()
            .find(|g| g.user_id == user_id && g.target_id == target_id)
            .cloned())
    }

    async fn grants_for_user(
        &self,
        user_id: Uuid,
        target_ids: &[Uuid],
    ) -> AppResult<Vec<PermissionGrant>> {
        let state = self.state.read().await;
        Ok(state
            .grants
            .values()
            .filter(|g| g.user_id == user_id && target_ids.contains(&g.target_id))
            .cloned()
            .collect())
    }

    async fn grants_on(&self, target_id: Uuid) -> AppResult<Vec<PermissionGrant>> {
        let state = self.state.read().await;
        let mut grants: Vec<PermissionGrant> = state
            .grants
            .values()
            .filter(|g| g.target_id == target_id)
            .cloned()
            .collect();
        grants.sort_by_key(|g| g.created_at);
        Ok(grants)
    }

    async fn grants_on_many(&self, target_ids: &[Uuid]) -> AppResult<Vec<PermissionGrant>> {
        let state = self.state.read().await;
        Ok(state
            .grants
            .values()
            .filter(|g| target_ids.contains(&g.target_id))
            .cloned()
            .collect())
    }

    async fn favorites_for_user(&self, user_id: Uuid) -> AppResult<Vec<Favorite>> {
        let state = self.state.read().await;
        let mut favorites: Vec<Favorite> = state
            .favorites
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        favorites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(favorites)
    }

    async fn is_favorite(&self, user_id: Uuid, target: NodeRef) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .favorites
            .iter()
            .any(|f| f.user_id == user_id && f.target_id == target.id()))
    }

    async fn commit(&self, changes: ChangeSet) -> AppResult<()> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        for precondition in changes.preconditions() {
            next.check(precondition)?;
        }
        let count = changes.len();
        for change in changes.changes().iter().cloned() {
            next.apply(change)?;
        }
        *guard = next;
        debug!(changes = count, "Committed change set");
        Ok(())
    }

    async fn open_repair(&self, ticket: RepairTicket) -> AppResult<()> {
        self.state.write().await.repairs.insert(ticket.id, ticket);
        Ok(())
    }

    async fn pending_repairs(&self, limit: i64, max_attempts: i32) -> AppResult<Vec<RepairTicket>> {
        let state = self.state.read().await;
        let mut tickets: Vec<RepairTicket> = state
            .repairs
            .values()
            .filter(|t| t.attempts < max_attempts)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.created_at);
        tickets.truncate(limit.max(0) as usize);
        Ok(tickets)
    }

    async fn record_repair_failure(&self, id: Uuid, error: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        let ticket = state
            .repairs
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Repair ticket {id} not found")))?;
        ticket.attempts += 1;
        ticket.last_error = error.to_string();
        ticket.updated_at = Utc::now();
        Ok(())
    }

    async fn close_repair(&self, id: Uuid) -> AppResult<()> {
        self.state.write().await.repairs.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::ErrorKind;
    use canopy_entity::permission::PermissionLevel;

    async fn seeded() -> (MemoryTreeStore, Folder) {
        let store = MemoryTreeStore::new();
        let root = Folder::new(None, Uuid::new_v4(), "", "rootkey1");
        let mut set = ChangeSet::new();
        set.push(Change::InsertFolder(root.clone()));
        store.commit(set).await.unwrap();
        (store, root)
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_trace() {
        let (store, root) = seeded().await;
        let a = Folder::new(Some(root.id), root.owner_id, "a", "k1");
        let dup = Folder::new(Some(root.id), root.owner_id, "a", "k2");

        let mut set = ChangeSet::new();
        set.push(Change::InsertFolder(a.clone()))
            .push(Change::InsertFolder(dup));
        let err = store.commit(set).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NameConflict);
        assert!(store.find_folder(a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_version_precondition() {
        let (store, root) = seeded().await;
        let mut set = ChangeSet::new();
        set.push(Change::BumpVersion(root.id));
        store.commit(set).await.unwrap();

        let mut stale = ChangeSet::new();
        stale
            .require(Precondition::FolderVersion {
                folder_id: root.id,
                version: 0,
            })
            .push(Change::BumpVersion(root.id));
        let err = store.commit(stale).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(store.find_folder(root.id).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_structural_preconditions() {
        let (store, root) = seeded().await;
        let a = Folder::new(Some(root.id), root.owner_id, "a", "k1");
        let b = Folder::new(Some(a.id), root.owner_id, "b", "k2");
        let mut set = ChangeSet::new();
        set.push(Change::InsertFolder(a.clone()))
            .push(Change::InsertFolder(b.clone()));
        store.commit(set).await.unwrap();

        let mut cycle = ChangeSet::new();
        cycle.require(Precondition::OutsideSubtree {
            candidate: b.id,
            root: a.id,
        });
        assert_eq!(
            store.commit(cycle).await.unwrap_err().kind,
            ErrorKind::CycleDetected
        );

        let mut deep = ChangeSet::new();
        deep.require(Precondition::DepthBelow {
            folder_id: b.id,
            additional: 1,
            limit: 3,
        });
        assert_eq!(
            store.commit(deep).await.unwrap_err().kind,
            ErrorKind::DepthLimitExceeded
        );

        let chain = store.ancestors(b.id).await.unwrap();
        let names: Vec<&str> = chain.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["", "a", "b"]);
    }

    #[tokio::test]
    async fn test_delete_non_empty_folder_rejected() {
        let (store, root) = seeded().await;
        let a = Folder::new(Some(root.id), root.owner_id, "a", "k1");
        let mut set = ChangeSet::new();
        set.push(Change::InsertFolder(a.clone()));
        store.commit(set).await.unwrap();

        let mut delete_root = ChangeSet::new();
        delete_root.push(Change::DeleteFolder(root.id));
        assert_eq!(
            store.commit(delete_root).await.unwrap_err().kind,
            ErrorKind::Conflict
        );
    }

    #[tokio::test]
    async fn test_one_grant_per_user_and_target() {
        let (store, root) = seeded().await;
        let user = Uuid::new_v4();
        let target = NodeRef::Folder(root.id);
        let mut set = ChangeSet::new();
        set.push(Change::InsertGrant(PermissionGrant::explicit(
            user,
            target,
            PermissionLevel::Read,
            root.owner_id,
        )));
        store.commit(set.clone()).await.unwrap();

        let mut again = ChangeSet::new();
        again.push(Change::InsertGrant(PermissionGrant::explicit(
            user,
            target,
            PermissionLevel::Write,
            root.owner_id,
        )));
        assert_eq!(store.commit(again).await.unwrap_err().kind, ErrorKind::Conflict);
        assert_eq!(
            store.find_grant(user, root.id).await.unwrap().unwrap().level,
            PermissionLevel::Read
        );
    }

    #[tokio::test]
    async fn test_grant_on_missing_node_rejected() {
        let (store, root) = seeded().await;
        let ghost = NodeRef::Folder(Uuid::new_v4());
        let mut set = ChangeSet::new();
        set.push(Change::InsertGrant(PermissionGrant::explicit(
            Uuid::new_v4(),
            ghost,
            PermissionLevel::Read,
            root.owner_id,
        )));
        assert_eq!(store.commit(set).await.unwrap_err().kind, ErrorKind::NotFound);
        assert!(store.grants_on(ghost.id()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chain_totals_and_grant_preconditions() {
        let (store, root) = seeded().await;
        let a = Folder::new(Some(root.id), root.owner_id, "a", "k1");
        let d = Folder::new(Some(root.id), root.owner_id, "d", "k2");
        let b = Folder::new(Some(a.id), root.owner_id, "b", "k3");
        let user = Uuid::new_v4();
        let mut set = ChangeSet::new();
        set.push(Change::InsertFolder(a.clone()))
            .push(Change::InsertFolder(d.clone()))
            .push(Change::InsertFolder(b.clone()))
            .push(Change::InsertGrant(PermissionGrant::explicit(
                user,
                NodeRef::Folder(a.id),
                PermissionLevel::Read,
                root.owner_id,
            )));
        store.commit(set).await.unwrap();

        let chain = store.ancestors(b.id).await.unwrap();
        let pinned = Precondition::chain_of(&chain).unwrap();
        let totals = Precondition::totals_of(&store.find_folder(b.id).await.unwrap().unwrap());

        let mut held = ChangeSet::new();
        held.require(Precondition::GrantHeld {
            user_id: user,
            target_id: a.id,
            level: PermissionLevel::Write,
        });
        assert_eq!(store.commit(held).await.unwrap_err().kind, ErrorKind::Conflict);

        let mut moved = ChangeSet::new();
        moved.push(Change::ReparentFolder {
            id: a.id,
            parent_id: d.id,
        });
        moved.push(Change::AdjustAggregates {
            folder_id: b.id,
            bytes: 5,
            files: 1,
            folders: 0,
        });
        store.commit(moved).await.unwrap();

        let mut stale = ChangeSet::new();
        stale.require(pinned);
        assert_eq!(store.commit(stale).await.unwrap_err().kind, ErrorKind::Conflict);
        let mut stale = ChangeSet::new();
        stale.require(totals);
        assert_eq!(store.commit(stale).await.unwrap_err().kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_repair_ticket_lifecycle() {
        let store = MemoryTreeStore::new();
        let ticket = RepairTicket::open(
            NodeRef::Folder(Uuid::new_v4()),
            canopy_entity::repair::RepairAction::EnsureDirectory {
                address: "a/b".into(),
            },
            "disk full",
        );
        store.open_repair(ticket.clone()).await.unwrap();
        store.record_repair_failure(ticket.id, "still full").await.unwrap();

        let pending = store.pending_repairs(10, 5).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert!(store.pending_repairs(10, 1).await.unwrap().is_empty());

        store.close_repair(ticket.id).await.unwrap();
        assert!(store.pending_repairs(10, 5).await.unwrap().is_empty());
    }
}
