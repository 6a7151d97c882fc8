//! Folder tree building.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use canopy_auth::PermissionResolver;
use canopy_core::AppError;
use canopy_core::result::AppResult;
use canopy_database::{SubtreeSnapshot, TreeStore};
use canopy_entity::folder::FolderNode;
use canopy_entity::permission::PermissionLevel;

use crate::context::RequestContext;
use crate::lookup;
use crate::path::PathVirtualizer;

/// Builds folder trees for display.
#[derive(Debug, Clone)]
pub struct TreeService {
    /// Relational tree store.
    store: Arc<dyn TreeStore>,
    /// Permission resolver.
    resolver: Arc<PermissionResolver>,
    /// Path computation.
    paths: Arc<PathVirtualizer>,
}

impl TreeService {
    /// Creates a new tree service.
    pub fn new(
        store: Arc<dyn TreeStore>,
        resolver: Arc<PermissionResolver>,
        paths: Arc<PathVirtualizer>,
    ) -> Self {
        Self {
            store,
            resolver,
            paths,
        }
    }

    /// Builds the folder tree below `folder_id`, the folder included.
    pub async fn get_tree(&self, ctx: &RequestContext, folder_id: Uuid) -> AppResult<FolderNode> {
        let folder = lookup::folder(self.store.as_ref(), folder_id).await?;
        self.resolver
            .require_folder(&ctx.principal, &folder, PermissionLevel::Read)
            .await?;

        let chain = self.paths.chain(folder.id).await?;
        let snapshot = self
            .store
            .subtree(folder.id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder {folder_id} not found")))?;

        Ok(build_tree(
            &snapshot,
            PathVirtualizer::folder_display_path(&chain),
            PathVirtualizer::depth(&chain),
        ))
    }
}

/// Assemble nested nodes bottom-up from a snapshot.
fn build_tree(snapshot: &SubtreeSnapshot, root_path: String, root_depth: u32) -> FolderNode {
    let mut paths: HashMap<Uuid, String> = HashMap::with_capacity(snapshot.folder_count());
    let mut depths: HashMap<Uuid, u32> = HashMap::with_capacity(snapshot.folder_count());
    for (folder, rel_depth) in snapshot.pre_order() {
        let path = match folder.parent_id.and_then(|p| paths.get(&p)) {
            Some(parent_path) if folder.id != snapshot.root_id() => {
                if parent_path == "/" {
                    format!("/{}", folder.name)
                } else {
                    format!("{parent_path}/{}", folder.name)
                }
            }
            _ => root_path.clone(),
        };
        paths.insert(folder.id, path);
        depths.insert(folder.id, root_depth + rel_depth);
    }

    let mut built: HashMap<Uuid, FolderNode> = HashMap::with_capacity(snapshot.folder_count());
    for folder in snapshot.post_order() {
        let children = snapshot
            .children_of(folder.id)
            .filter_map(|child| built.remove(&child.id))
            .collect();
        built.insert(
            folder.id,
            FolderNode {
                id: folder.id,
                name: folder.name.clone(),
                display_path: paths.remove(&folder.id).unwrap_or_default(),
                depth: depths.get(&folder.id).copied().unwrap_or(root_depth),
                file_count: snapshot.files_in(folder.id).len() as u64,
                subtree_bytes: folder.subtree_bytes.max(0) as u64,
                children,
            },
        );
    }

    built.remove(&snapshot.root_id()).unwrap_or_else(|| FolderNode {
        id: snapshot.root_id(),
        name: snapshot.root().name.clone(),
        display_path: root_path,
        depth: root_depth,
        file_count: 0,
        subtree_bytes: 0,
        children: Vec::new(),
    })
}
