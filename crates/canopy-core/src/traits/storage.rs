//! Object store trait for the physical side of the folder tree.
//!
//! Objects are addressed by *storage addresses*: `/`-joined chains of
//! immutable storage keys. A folder's address is a directory prefix, so
//! moving or deleting a subtree is a single call on that prefix.

use async_trait::async_trait;
use bytes::Bytes;

use crate::result::AppResult;

/// Metadata about a stored object.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoredObjectMeta {
    /// Address within the object store.
    pub address: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// MIME type (if known).
    pub mime_type: Option<String>,
    /// Whether this is a directory prefix.
    pub is_directory: bool,
}

/// Trait for physical storage backends.
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local").
    fn provider_type(&self) -> &str;

    /// Check whether the backend is healthy and reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Write bytes to an object, creating missing parent prefixes.
    async fn put(&self, address: &str, data: Bytes) -> AppResult<()>;

    /// Read an object fully into memory.
    async fn read_bytes(&self, address: &str) -> AppResult<Bytes>;

    /// Check whether an object or directory exists.
    async fn exists(&self, address: &str) -> AppResult<bool>;

    /// Delete a single object. Deleting a missing object is not an error.
    async fn delete(&self, address: &str) -> AppResult<()>;

    /// Delete a directory prefix and everything below it.
    async fn delete_dir(&self, address: &str) -> AppResult<()>;

    /// Create a directory prefix (and any missing parents).
    async fn create_dir(&self, address: &str) -> AppResult<()>;

    /// Move an object or a whole directory prefix.
    async fn rename(&self, from: &str, to: &str) -> AppResult<()>;

    /// Size in bytes of an object.
    async fn size(&self, address: &str) -> AppResult<u64>;

    /// Best-effort MIME type of an object.
    async fn mime_type(&self, address: &str) -> AppResult<String>;

    /// Metadata for an object or directory.
    async fn metadata(&self, address: &str) -> AppResult<StoredObjectMeta>;
}
