//! Folder entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A folder in a user's tree.
///
/// Depth and display path are derived from the ancestor chain and are
/// deliberately not columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Folder {
    /// Unique folder identifier.
    pub id: Uuid,
    /// Parent folder ID (null only for a user's root).
    pub parent_id: Option<Uuid>,
    /// The folder owner.
    pub owner_id: Uuid,
    /// Display name. Empty for roots.
    pub name: String,
    /// Immutable opaque key addressing this folder in the object store.
    pub storage_key: String,
    /// Optimistic lock counter, bumped on every structural change.
    pub version: i64,
    /// Total bytes of all files below this folder.
    pub subtree_bytes: i64,
    /// Number of files below this folder.
    pub subtree_files: i64,
    /// Number of folders below this folder (excluding itself).
    pub subtree_folders: i64,
    /// When the folder was created.
    pub created_at: DateTime<Utc>,
    /// When the folder was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Folder {
    /// Build a fresh, empty folder row.
    pub fn new(
        parent_id: Option<Uuid>,
        owner_id: Uuid,
        name: impl Into<String>,
        storage_key: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            parent_id,
            owner_id,
            name: name.into(),
            storage_key: storage_key.into(),
            version: 0,
            subtree_bytes: 0,
            subtree_files: 0,
            subtree_folders: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if this is a root folder (no parent).
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
