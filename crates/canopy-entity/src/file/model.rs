//! File entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A file (leaf) inside a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct File {
    /// Unique file identifier.
    pub id: Uuid,
    /// The folder containing this file.
    pub folder_id: Uuid,
    /// The file owner.
    pub owner_id: Uuid,
    /// The file name (including extension).
    pub name: String,
    /// Immutable opaque key of the object inside its folder's directory.
    pub storage_key: String,
    /// File size in bytes.
    pub size_bytes: i64,
    /// MIME type of the file.
    pub mime_type: String,
    /// When the file was created.
    pub created_at: DateTime<Utc>,
    /// When the file was last updated.
    pub updated_at: DateTime<Utc>,
}

impl File {
    /// Get the file extension (lowercase), if any.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit('.')
            .next()
            .filter(|ext| *ext != self.name)
            .map(|ext| ext.to_lowercase())
    }

    /// Size as an unsigned byte count.
    pub fn size(&self) -> u64 {
        self.size_bytes.max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str) -> File {
        File {
            id: Uuid::new_v4(),
            folder_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: name.to_string(),
            storage_key: "k".into(),
            size_bytes: 12,
            mime_type: "text/plain".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_extension() {
        assert_eq!(sample("Report.PDF").extension(), Some("pdf".into()));
        assert_eq!(sample("README").extension(), None);
    }
}
