//! Local filesystem object store.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::debug;

use canopy_core::error::{AppError, ErrorKind};
use canopy_core::result::AppResult;
use canopy_core::traits::storage::{ObjectStore, StoredObjectMeta};

/// Bytes inspected when sniffing content types.
const SNIFF_LEN: usize = 512;

/// Object store rooted at a local directory.
///
/// Storage addresses map one-to-one onto relative paths below the root, so
/// a folder's address is a real directory and a subtree move is a single
/// `rename`.
#[derive(Debug, Clone)]
pub struct LocalStorageProvider {
    /// Root directory for all stored objects.
    root: PathBuf,
}

impl LocalStorageProvider {
    /// Create a new provider rooted at the given path.
    pub async fn new(root_path: impl AsRef<Path>) -> AppResult<Self> {
        let root = root_path.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageIo,
                format!("Failed to create storage root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self { root })
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an address to an absolute path within the root.
    fn resolve(&self, address: &str) -> AppResult<PathBuf> {
        let clean = address.trim_start_matches('/');
        let relative = Path::new(clean);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(AppError::validation(format!(
                "Invalid storage address: '{address}'"
            )));
        }
        Ok(self.root.join(relative))
    }

    /// Ensure the parent directory of a path exists.
    async fn ensure_parent(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::StorageIo,
                    format!("Failed to create parent directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }
}

fn io_error(action: &str, address: &str, e: std::io::Error) -> AppError {
    if e.kind() == std::io::ErrorKind::NotFound {
        AppError::not_found(format!("Object not found: {address}"))
    } else {
        AppError::with_source(
            ErrorKind::StorageIo,
            format!("Failed to {action}: {address}"),
            e,
        )
    }
}

#[async_trait]
impl ObjectStore for LocalStorageProvider {
    fn provider_type(&self) -> &str {
        "local"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    async fn put(&self, address: &str, data: Bytes) -> AppResult<()> {
        let full_path = self.resolve(address)?;
        self.ensure_parent(&full_path).await?;

        fs::write(&full_path, &data)
            .await
            .map_err(|e| io_error("write object", address, e))?;

        debug!(address, bytes = data.len(), "Wrote object");
        Ok(())
    }

    async fn read_bytes(&self, address: &str) -> AppResult<Bytes> {
        let full_path = self.resolve(address)?;
        let data = fs::read(&full_path)
            .await
            .map_err(|e| io_error("read object", address, e))?;
        Ok(Bytes::from(data))
    }

    async fn exists(&self, address: &str) -> AppResult<bool> {
        let full_path = self.resolve(address)?;
        fs::try_exists(&full_path)
            .await
            .map_err(|e| io_error("stat", address, e))
    }

    async fn delete(&self, address: &str) -> AppResult<()> {
        let full_path = self.resolve(address)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => {
                debug!(address, "Deleted object");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete object", address, e)),
        }
    }

    async fn delete_dir(&self, address: &str) -> AppResult<()> {
        let full_path = self.resolve(address)?;
        match fs::remove_dir_all(&full_path).await {
            Ok(()) => {
                debug!(address, "Deleted directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete directory", address, e)),
        }
    }

    async fn create_dir(&self, address: &str) -> AppResult<()> {
        let full_path = self.resolve(address)?;
        fs::create_dir_all(&full_path)
            .await
            .map_err(|e| io_error("create directory", address, e))
    }

    async fn rename(&self, from: &str, to: &str) -> AppResult<()> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        self.ensure_parent(&to_path).await?;

        fs::rename(&from_path, &to_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Object not found: {from}"))
            } else {
                AppError::with_source(
                    ErrorKind::StorageIo,
                    format!("Failed to rename {from} -> {to}"),
                    e,
                )
            }
        })?;
        debug!(from, to, "Relocated object");
        Ok(())
    }

    async fn size(&self, address: &str) -> AppResult<u64> {
        let full_path = self.resolve(address)?;
        let meta = fs::metadata(&full_path)
            .await
            .map_err(|e| io_error("stat", address, e))?;
        Ok(meta.len())
    }

    async fn mime_type(&self, address: &str) -> AppResult<String> {
        if let Some(mime) = mime_from_path(address) {
            return Ok(mime);
        }
        let full_path = self.resolve(address)?;
        let mut file = fs::File::open(&full_path)
            .await
            .map_err(|e| io_error("open", address, e))?;
        let mut head = vec![0u8; SNIFF_LEN];
        let read = file
            .read(&mut head)
            .await
            .map_err(|e| io_error("read", address, e))?;
        Ok(mime_from_content(&head[..read])
            .unwrap_or("application/octet-stream")
            .to_string())
    }

    async fn metadata(&self, address: &str) -> AppResult<StoredObjectMeta> {
        let full_path = self.resolve(address)?;
        let meta = fs::metadata(&full_path)
            .await
            .map_err(|e| io_error("stat", address, e))?;

        let mime_type = if meta.is_file() {
            mime_from_path(address)
        } else {
            None
        };

        Ok(StoredObjectMeta {
            address: address.to_string(),
            size_bytes: meta.len(),
            mime_type,
            is_directory: meta.is_dir(),
        })
    }
}

/// Detect a MIME type from the first bytes of an object.
pub fn mime_from_content(head: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"%PDF-", "application/pdf"),
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b", "application/gzip"),
    ];
    if let Some((_, mime)) = SIGNATURES.iter().find(|(sig, _)| head.starts_with(sig)) {
        return Some(*mime);
    }
    if head.is_empty() {
        return None;
    }
    // A multi-byte character may be cut at the end of the window.
    match std::str::from_utf8(head) {
        Ok(_) => Some("text/plain"),
        Err(e) if e.error_len().is_none() => Some("text/plain"),
        Err(_) => None,
    }
}

/// Guess MIME type from an extension.
pub fn mime_from_path(path: &str) -> Option<String> {
    mime_guess::from_path(path).first().map(|m| m.to_string())
}
