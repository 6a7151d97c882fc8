//! Subtree size aggregation.
//!
//! Every folder carries `subtree_bytes`, `subtree_files` and
//! `subtree_folders` counters covering everything below it (the folder
//! itself is not counted in `subtree_folders`). Mutations stage signed
//! deltas on the affected ancestors inside their own change set, so reads
//! are O(1). A full recomputation walks the bulk-loaded subtree and is used
//! to verify and repair the counters.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use canopy_core::AppError;
use canopy_core::result::AppResult;
use canopy_database::{Change, ChangeSet, SubtreeSnapshot, TreeStore};
use canopy_entity::NodeRef;
use canopy_entity::folder::SubtreeStats;

/// Signed change to aggregate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateDelta {
    /// Bytes.
    pub bytes: i64,
    /// Files.
    pub files: i64,
    /// Folders.
    pub folders: i64,
}

impl AggregateDelta {
    /// One file of `size` bytes.
    pub fn file(size: i64) -> Self {
        Self {
            bytes: size,
            files: 1,
            folders: 0,
        }
    }

    /// One empty folder.
    pub fn folder() -> Self {
        Self {
            bytes: 0,
            files: 0,
            folders: 1,
        }
    }

    /// A whole subtree, its root folder included.
    pub fn subtree(snapshot: &SubtreeSnapshot) -> Self {
        Self {
            bytes: snapshot.total_bytes(),
            files: snapshot.file_count() as i64,
            folders: snapshot.folder_count() as i64,
        }
    }

    /// The opposite change.
    pub fn negate(self) -> Self {
        Self {
            bytes: -self.bytes,
            files: -self.files,
            folders: -self.folders,
        }
    }

    /// Stage this delta on every folder in `folder_ids`.
    pub fn stage(self, changes: &mut ChangeSet, folder_ids: impl IntoIterator<Item = Uuid>) {
        changes.adjust_all(folder_ids, self.bytes, self.files, self.folders);
    }
}

/// Result of comparing stored counters with a full recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RecomputeReport {
    /// Counters stored on the subtree root before the run.
    pub stored: SubtreeStats,
    /// Counters derived from the live subtree.
    pub computed: SubtreeStats,
    /// Folders whose counters were corrected.
    pub corrected: u64,
}

/// Serves and verifies subtree statistics.
#[derive(Debug, Clone)]
pub struct SizeAggregator {
    store: Arc<dyn TreeStore>,
}

impl SizeAggregator {
    /// Creates a new aggregator.
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self { store }
    }

    /// Statistics of a node from the maintained counters.
    pub async fn subtree_size(&self, node: NodeRef) -> AppResult<SubtreeStats> {
        match node {
            NodeRef::Folder(id) => {
                let folder = self
                    .store
                    .find_folder(id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("Folder {id} not found")))?;
                Ok(SubtreeStats::from(&folder))
            }
            NodeRef::File(id) => {
                let file = self
                    .store
                    .find_file(id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("File {id} not found")))?;
                Ok(SubtreeStats {
                    total_bytes: file.size(),
                    file_count: 1,
                    folder_count: 0,
                })
            }
        }
    }

    /// Statistics for every folder in the snapshot, computed bottom-up.
    pub fn compute(snapshot: &SubtreeSnapshot) -> HashMap<Uuid, SubtreeStats> {
        let mut stats: HashMap<Uuid, SubtreeStats> = HashMap::with_capacity(snapshot.folder_count());
        for folder in snapshot.post_order() {
            let mut own = SubtreeStats::default();
            for file in snapshot.files_in(folder.id) {
                own.total_bytes += file.size();
                own.file_count += 1;
            }
            for child in snapshot.children_of(folder.id) {
                if let Some(child_stats) = stats.get(&child.id) {
                    own.total_bytes += child_stats.total_bytes;
                    own.file_count += child_stats.file_count;
                    own.folder_count += child_stats.folder_count + 1;
                }
            }
            stats.insert(folder.id, own);
        }
        stats
    }

    /// Full recomputation for one folder.
    pub async fn recompute(&self, folder_id: Uuid) -> AppResult<SubtreeStats> {
        let snapshot = self.load(folder_id).await?;
        Ok(Self::compute(&snapshot)
            .remove(&folder_id)
            .unwrap_or_default())
    }

    /// Recompute the subtree and stage corrections for every drifted folder.
    pub async fn reconcile(
        &self,
        folder_id: Uuid,
        changes: &mut ChangeSet,
    ) -> AppResult<RecomputeReport> {
        let snapshot = self.load(folder_id).await?;
        let computed = Self::compute(&snapshot);
        let mut corrected = 0;
        for (folder, _) in snapshot.pre_order() {
            let Some(actual) = computed.get(&folder.id) else {
                continue;
            };
            if SubtreeStats::from(folder) != *actual {
                changes.push(Change::SetAggregates {
                    folder_id: folder.id,
                    bytes: actual.total_bytes as i64,
                    files: actual.file_count as i64,
                    folders: actual.folder_count as i64,
                });
                corrected += 1;
            }
        }
        Ok(RecomputeReport {
            stored: SubtreeStats::from(snapshot.root()),
            computed: computed.get(&folder_id).copied().unwrap_or_default(),
            corrected,
        })
    }

    async fn load(&self, folder_id: Uuid) -> AppResult<SubtreeSnapshot> {
        self.store
            .subtree(folder_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder {folder_id} not found")))
    }
}
