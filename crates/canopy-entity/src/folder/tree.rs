//! Folder tree structures for hierarchical display.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A node in a folder tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderNode {
    /// Folder ID.
    pub id: Uuid,
    /// Folder name.
    pub name: String,
    /// Display path, computed from the live ancestor chain.
    pub display_path: String,
    /// Depth level (root = 0).
    pub depth: u32,
    /// Number of direct files in this folder.
    pub file_count: u64,
    /// Total bytes below this folder.
    pub subtree_bytes: u64,
    /// Child folder nodes.
    pub children: Vec<FolderNode>,
}

impl FolderNode {
    /// Number of folders in this tree, including the node itself.
    pub fn total_folders(&self) -> u64 {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            total += 1;
            stack.extend(node.children.iter());
        }
        total
    }
}

/// Aggregate statistics for a folder's subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreeStats {
    /// Sum of file sizes below the folder.
    pub total_bytes: u64,
    /// Files below the folder.
    pub file_count: u64,
    /// Folders below the folder, excluding itself.
    pub folder_count: u64,
}

impl From<&super::Folder> for SubtreeStats {
    fn from(folder: &super::Folder) -> Self {
        Self {
            total_bytes: folder.subtree_bytes.max(0) as u64,
            file_count: folder.subtree_files.max(0) as u64,
            folder_count: folder.subtree_folders.max(0) as u64,
        }
    }
}
