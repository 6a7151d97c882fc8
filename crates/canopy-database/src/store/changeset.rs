//! Staged relational changes committed as one transaction.
//!
//! Services and the permission propagator never write directly. They push
//! [`Change`]s (and the [`Precondition`]s those changes rely on) into a
//! [`ChangeSet`], and the owning public operation hands the whole set to
//! [`TreeStore::commit`](super::TreeStore::commit) exactly once.

use uuid::Uuid;

use canopy_entity::NodeRef;
use canopy_entity::favorite::Favorite;
use canopy_entity::file::File;
use canopy_entity::folder::Folder;
use canopy_entity::permission::{PermissionGrant, PermissionLevel};

/// A condition re-checked inside the transaction, after row locks are taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The folder still exists and has not changed since it was read.
    FolderVersion {
        /// Folder to lock.
        folder_id: Uuid,
        /// Version observed when the operation was planned.
        version: i64,
    },
    /// `candidate` is neither `root` nor one of its descendants.
    OutsideSubtree {
        /// Folder that must lie outside the subtree.
        candidate: Uuid,
        /// Root of the subtree.
        root: Uuid,
    },
    /// `depth(folder_id) + additional < limit`.
    DepthBelow {
        /// Folder whose depth is measured.
        folder_id: Uuid,
        /// Levels that will be added below it.
        additional: u32,
        /// Exclusive depth limit.
        limit: u32,
    },
    /// The folder still hangs below exactly these ancestors.
    AncestorChain {
        /// Folder whose chain is checked.
        folder_id: Uuid,
        /// Root-first folder IDs ending with `folder_id`.
        chain: Vec<Uuid>,
    },
    /// The folder's stored subtree counters have not moved.
    SubtreeTotals {
        /// Folder to lock.
        folder_id: Uuid,
        /// Observed byte total.
        bytes: i64,
        /// Observed file count.
        files: i64,
        /// Observed folder count.
        folders: i64,
    },
    /// The user still holds a grant on the node that satisfies `level`.
    GrantHeld {
        /// Grantee.
        user_id: Uuid,
        /// Node carrying the grant.
        target_id: Uuid,
        /// Level the grant must still allow.
        level: PermissionLevel,
    },
}

impl Precondition {
    /// Require the folder's current ancestor chain, as read from `chain`.
    pub fn chain_of(chain: &[Folder]) -> Option<Self> {
        let last = chain.last()?;
        Some(Self::AncestorChain {
            folder_id: last.id,
            chain: chain.iter().map(|f| f.id).collect(),
        })
    }

    /// Require the folder's stored counters as observed in `folder`.
    pub fn totals_of(folder: &Folder) -> Self {
        Self::SubtreeTotals {
            folder_id: folder.id,
            bytes: folder.subtree_bytes,
            files: folder.subtree_files,
            folders: folder.subtree_folders,
        }
    }

    /// Lock ordering key: version locks first, then everything else.
    pub fn lock_order(&self) -> (u8, Uuid) {
        match self {
            Self::FolderVersion { folder_id, .. } => (0, *folder_id),
            Self::SubtreeTotals { folder_id, .. } => (1, *folder_id),
            Self::GrantHeld { target_id, .. } => (2, *target_id),
            Self::AncestorChain { folder_id, .. } => (3, *folder_id),
            Self::OutsideSubtree { candidate, .. } => (4, *candidate),
            Self::DepthBelow { folder_id, .. } => (5, *folder_id),
        }
    }
}

/// A single staged write.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Insert a folder row.
    InsertFolder(Folder),
    /// Change a folder's display name.
    RenameFolder {
        /// Folder to rename.
        id: Uuid,
        /// New display name.
        name: String,
    },
    /// Attach a folder to a new parent.
    ReparentFolder {
        /// Folder to move.
        id: Uuid,
        /// New parent.
        parent_id: Uuid,
    },
    /// Delete a folder row. Its files and children must already be staged for deletion.
    DeleteFolder(Uuid),
    /// Insert a file row.
    InsertFile(File),
    /// Change a file's display name.
    RenameFile {
        /// File to rename.
        id: Uuid,
        /// New display name.
        name: String,
    },
    /// Move a file to another folder.
    MoveFile {
        /// File to move.
        id: Uuid,
        /// Destination folder.
        folder_id: Uuid,
    },
    /// Delete a file row.
    DeleteFile(Uuid),
    /// Insert a grant row.
    InsertGrant(PermissionGrant),
    /// Update the level and lineage of an existing grant row.
    UpdateGrant {
        /// Grant to update.
        id: Uuid,
        /// New level.
        level: PermissionLevel,
        /// New lineage source.
        source_id: Uuid,
    },
    /// Delete one grant row.
    DeleteGrant(Uuid),
    /// Delete every grant on a node (any user).
    DeleteGrantsOn(NodeRef),
    /// Insert a favorite marker.
    InsertFavorite(Favorite),
    /// Delete one user's favorite marker.
    DeleteFavorite {
        /// Marking user.
        user_id: Uuid,
        /// Marked node.
        target: NodeRef,
    },
    /// Delete every favorite marker on a node.
    DeleteFavoritesOn(NodeRef),
    /// Add signed deltas to a folder's aggregate counters.
    AdjustAggregates {
        /// Folder whose counters change.
        folder_id: Uuid,
        /// Byte delta.
        bytes: i64,
        /// File count delta.
        files: i64,
        /// Folder count delta.
        folders: i64,
    },
    /// Overwrite a folder's aggregate counters.
    SetAggregates {
        /// Folder whose counters are replaced.
        folder_id: Uuid,
        /// Total bytes.
        bytes: i64,
        /// File count.
        files: i64,
        /// Folder count.
        folders: i64,
    },
    /// Increment a folder's version.
    BumpVersion(Uuid),
}

/// An ordered plan of writes plus the conditions they depend on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    preconditions: Vec<Precondition>,
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a condition at commit time.
    pub fn require(&mut self, precondition: Precondition) -> &mut Self {
        if !self.preconditions.contains(&precondition) {
            self.preconditions.push(precondition);
        }
        self
    }

    /// Stage a write.
    pub fn push(&mut self, change: Change) -> &mut Self {
        self.changes.push(change);
        self
    }

    /// Stage aggregate deltas on every folder in `folder_ids`.
    pub fn adjust_all(
        &mut self,
        folder_ids: impl IntoIterator<Item = Uuid>,
        bytes: i64,
        files: i64,
        folders: i64,
    ) -> &mut Self {
        if bytes == 0 && files == 0 && folders == 0 {
            return self;
        }
        for folder_id in folder_ids {
            self.changes.push(Change::AdjustAggregates {
                folder_id,
                bytes,
                files,
                folders,
            });
        }
        self
    }

    /// Append another change set.
    pub fn extend(&mut self, other: ChangeSet) -> &mut Self {
        for precondition in other.preconditions {
            self.require(precondition);
        }
        self.changes.extend(other.changes);
        self
    }

    /// Staged conditions.
    pub fn preconditions(&self) -> &[Precondition] {
        &self.preconditions
    }

    /// Staged writes, in commit order.
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of staged writes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }
}
