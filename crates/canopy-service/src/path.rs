//! Storage keys, storage addresses and display paths.
//!
//! A node has two paths. The storage address joins the immutable storage
//! keys from the root down and is the only thing the object store sees.
//! The display path joins the display names and is rebuilt from the live
//! ancestor chain on every read; it is never stored.

use std::sync::Arc;

use uuid::Uuid;

use canopy_core::AppError;
use canopy_core::result::AppResult;
use canopy_database::TreeStore;
use canopy_entity::NodeRef;
use canopy_entity::file::File;
use canopy_entity::folder::Folder;
use canopy_storage::keys::generate_key;

/// Computes keys and paths for folders and files.
#[derive(Debug, Clone)]
pub struct PathVirtualizer {
    store: Arc<dyn TreeStore>,
    key_length: usize,
}

impl PathVirtualizer {
    /// Creates a new virtualizer generating keys of `key_length` characters.
    pub fn new(store: Arc<dyn TreeStore>, key_length: usize) -> Self {
        Self { store, key_length }
    }

    /// A fresh storage key for a new node.
    pub fn new_storage_key(&self) -> String {
        generate_key(self.key_length)
    }

    /// Storage address of the last folder in a root-first chain.
    pub fn folder_address(chain: &[Folder]) -> String {
        chain
            .iter()
            .map(|f| f.storage_key.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Storage address of a file whose folder chain is `chain`.
    pub fn file_address(chain: &[Folder], file: &File) -> String {
        format!("{}/{}", Self::folder_address(chain), file.storage_key)
    }

    /// Display path of the last folder in a root-first chain.
    pub fn folder_display_path(chain: &[Folder]) -> String {
        let names: Vec<&str> = chain.iter().skip(1).map(|f| f.name.as_str()).collect();
        format!("/{}", names.join("/"))
    }

    /// Display path of a file whose folder chain is `chain`.
    pub fn file_display_path(chain: &[Folder], file: &File) -> String {
        let folder_path = Self::folder_display_path(chain);
        if folder_path == "/" {
            format!("/{}", file.name)
        } else {
            format!("{folder_path}/{}", file.name)
        }
    }

    /// Depth of the last folder in a root-first chain; the root is 0.
    pub fn depth(chain: &[Folder]) -> u32 {
        chain.len().saturating_sub(1) as u32
    }

    /// Load a folder's root-first chain, failing if the folder is missing.
    pub async fn chain(&self, folder_id: Uuid) -> AppResult<Vec<Folder>> {
        let chain = self.store.ancestors(folder_id).await?;
        if chain.is_empty() {
            return Err(AppError::not_found(format!("Folder {folder_id} not found")));
        }
        Ok(chain)
    }

    /// Storage address of any node.
    pub async fn storage_address(&self, node: NodeRef) -> AppResult<String> {
        match node {
            NodeRef::Folder(id) => Ok(Self::folder_address(&self.chain(id).await?)),
            NodeRef::File(id) => {
                let file = self.load_file(id).await?;
                let chain = self.chain(file.folder_id).await?;
                Ok(Self::file_address(&chain, &file))
            }
        }
    }

    /// Display path of any node.
    pub async fn display_path(&self, node: NodeRef) -> AppResult<String> {
        match node {
            NodeRef::Folder(id) => Ok(Self::folder_display_path(&self.chain(id).await?)),
            NodeRef::File(id) => {
                let file = self.load_file(id).await?;
                let chain = self.chain(file.folder_id).await?;
                Ok(Self::file_display_path(&chain, &file))
            }
        }
    }

    async fn load_file(&self, id: Uuid) -> AppResult<File> {
        self.store
            .find_file(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File {id} not found")))
    }
}
