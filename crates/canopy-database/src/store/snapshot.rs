//! An in-memory copy of one folder subtree.

use std::collections::HashMap;

use uuid::Uuid;

use canopy_entity::file::File;
use canopy_entity::folder::Folder;

/// A folder, all of its descendant folders and every file inside them.
///
/// All traversals are iterative; depth is bounded by configuration but the
/// snapshot does not rely on that.
#[derive(Debug, Clone)]
pub struct SubtreeSnapshot {
    root_id: Uuid,
    folders: HashMap<Uuid, Folder>,
    children: HashMap<Uuid, Vec<Uuid>>,
    files: HashMap<Uuid, Vec<File>>,
}

impl SubtreeSnapshot {
    /// Build a snapshot from flat rows. Folders outside `root_id`'s subtree
    /// and files in those folders are ignored.
    pub fn build(root_id: Uuid, folders: Vec<Folder>, files: Vec<File>) -> Option<Self> {
        let mut by_id: HashMap<Uuid, Folder> =
            folders.into_iter().map(|f| (f.id, f)).collect();
        if !by_id.contains_key(&root_id) {
            return None;
        }

        let mut all_children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for folder in by_id.values() {
            if folder.id == root_id {
                continue;
            }
            if let Some(parent_id) = folder.parent_id {
                all_children.entry(parent_id).or_default().push(folder.id);
            }
        }
        for ids in all_children.values_mut() {
            ids.sort_by(|a, b| by_id[a].name.cmp(&by_id[b].name).then(a.cmp(b)));
        }

        let mut reachable = HashMap::new();
        let mut children = HashMap::new();
        let mut stack = vec![root_id];
        while let Some(id) = stack.pop() {
            if let Some(folder) = by_id.remove(&id) {
                reachable.insert(id, folder);
            }
            let kids = all_children.remove(&id).unwrap_or_default();
            stack.extend(kids.iter().copied());
            children.insert(id, kids);
        }

        let mut by_folder: HashMap<Uuid, Vec<File>> = HashMap::new();
        for file in files {
            if reachable.contains_key(&file.folder_id) {
                by_folder.entry(file.folder_id).or_default().push(file);
            }
        }
        for list in by_folder.values_mut() {
            list.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Some(Self {
            root_id,
            folders: reachable,
            children,
            files: by_folder,
        })
    }

    /// The subtree root.
    pub fn root(&self) -> &Folder {
        &self.folders[&self.root_id]
    }

    /// ID of the subtree root.
    pub fn root_id(&self) -> Uuid {
        self.root_id
    }

    /// Look up a folder inside the subtree.
    pub fn folder(&self, id: Uuid) -> Option<&Folder> {
        self.folders.get(&id)
    }

    /// Whether `id` is the root or one of its descendants.
    pub fn contains_folder(&self, id: Uuid) -> bool {
        self.folders.contains_key(&id)
    }

    /// Direct child folders of `id`, sorted by name.
    pub fn children_of(&self, id: Uuid) -> impl Iterator<Item = &Folder> {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.folders.get(child))
    }

    /// Files directly inside `folder_id`, sorted by name.
    pub fn files_in(&self, folder_id: Uuid) -> &[File] {
        self.files.get(&folder_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every file in the subtree.
    pub fn files(&self) -> impl Iterator<Item = &File> {
        self.files.values().flatten()
    }

    /// Number of folders including the root.
    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    /// Number of files.
    pub fn file_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Sum of file sizes.
    pub fn total_bytes(&self) -> i64 {
        self.files().map(|f| f.size_bytes).sum()
    }

    /// Folders in pre-order (parents before children), paired with their
    /// depth relative to the root.
    pub fn pre_order(&self) -> Vec<(&Folder, u32)> {
        let mut out = Vec::with_capacity(self.folders.len());
        let mut stack = vec![(self.root_id, 0u32)];
        while let Some((id, rel_depth)) = stack.pop() {
            let Some(folder) = self.folders.get(&id) else {
                continue;
            };
            out.push((folder, rel_depth));
            if let Some(kids) = self.children.get(&id) {
                for kid in kids.iter().rev() {
                    stack.push((*kid, rel_depth + 1));
                }
            }
        }
        out
    }

    /// Folders in post-order (children before parents).
    pub fn post_order(&self) -> Vec<&Folder> {
        let mut out: Vec<&Folder> = self.pre_order().into_iter().map(|(f, _)| f).collect();
        out.reverse();
        out
    }

    /// Height of the subtree: 0 when the root has no child folders.
    pub fn height(&self) -> u32 {
        self.pre_order()
            .into_iter()
            .map(|(_, d)| d)
            .max()
            .unwrap_or(0)
    }
}
