//! The relational side of the folder tree.
//!
//! [`TreeStore`] is the seam every service talks to. Reads are plain
//! lookups; all writes go through [`TreeStore::commit`], which applies a
//! [`ChangeSet`] atomically after re-checking its preconditions.

pub mod changeset;
pub mod memory;
pub mod postgres;
pub mod snapshot;

use async_trait::async_trait;
use uuid::Uuid;

use canopy_core::AppResult;
use canopy_entity::NodeRef;
use canopy_entity::favorite::Favorite;
use canopy_entity::file::File;
use canopy_entity::folder::Folder;
use canopy_entity::permission::PermissionGrant;
use canopy_entity::repair::RepairTicket;

pub use changeset::{Change, ChangeSet, Precondition};
pub use memory::MemoryTreeStore;
pub use postgres::PgTreeStore;
pub use snapshot::SubtreeSnapshot;

/// Persistent storage for folders, files, grants, favorites and repair tickets.
#[async_trait]
pub trait TreeStore: Send + Sync + std::fmt::Debug + 'static {
    /// Find a folder by ID.
    async fn find_folder(&self, id: Uuid) -> AppResult<Option<Folder>>;

    /// Find a file by ID.
    async fn find_file(&self, id: Uuid) -> AppResult<Option<File>>;

    /// Find a user's root folder.
    async fn find_root(&self, owner_id: Uuid) -> AppResult<Option<Folder>>;

    /// The folder and its ancestors, ordered root first. Empty if missing.
    async fn ancestors(&self, folder_id: Uuid) -> AppResult<Vec<Folder>>;

    /// Direct child folders, sorted by name.
    async fn child_folders(&self, parent_id: Uuid) -> AppResult<Vec<Folder>>;

    /// Files directly inside a folder, sorted by name.
    async fn files_in(&self, folder_id: Uuid) -> AppResult<Vec<File>>;

    /// Load a folder and everything below it.
    async fn subtree(&self, folder_id: Uuid) -> AppResult<Option<SubtreeSnapshot>>;

    /// A user's grant row on one node.
    async fn find_grant(&self, user_id: Uuid, target_id: Uuid) -> AppResult<Option<PermissionGrant>>;

    /// A user's grant rows on any of `target_ids`.
    async fn grants_for_user(
        &self,
        user_id: Uuid,
        target_ids: &[Uuid],
    ) -> AppResult<Vec<PermissionGrant>>;

    /// Every grant row on one node.
    async fn grants_on(&self, target_id: Uuid) -> AppResult<Vec<PermissionGrant>>;

    /// Every grant row on any of `target_ids`, for all users.
    async fn grants_on_many(&self, target_ids: &[Uuid]) -> AppResult<Vec<PermissionGrant>>;

    /// A user's favorites, newest first.
    async fn favorites_for_user(&self, user_id: Uuid) -> AppResult<Vec<Favorite>>;

    /// Whether a user has marked a node.
    async fn is_favorite(&self, user_id: Uuid, target: NodeRef) -> AppResult<bool>;

    /// Apply a change set atomically.
    ///
    /// Fails with `Conflict` on a version mismatch, `CycleDetected` or
    /// `DepthLimitExceeded` when a structural precondition no longer holds,
    /// `NameConflict` on a sibling name clash and `NotFound` when a
    /// referenced row has vanished. Nothing is applied on failure.
    async fn commit(&self, changes: ChangeSet) -> AppResult<()>;

    /// Record a storage effect that needs to be retried.
    async fn open_repair(&self, ticket: RepairTicket) -> AppResult<()>;

    /// Open tickets with fewer than `max_attempts` attempts, oldest first.
    async fn pending_repairs(&self, limit: i64, max_attempts: i32) -> AppResult<Vec<RepairTicket>>;

    /// Count one more failed attempt.
    async fn record_repair_failure(&self, id: Uuid, error: &str) -> AppResult<()>;

    /// Close a ticket after its effect was applied.
    async fn close_repair(&self, id: Uuid) -> AppResult<()>;
}
