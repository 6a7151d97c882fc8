//! Object store configuration.

use serde::{Deserialize, Serialize};

/// Top-level storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root path for the local object store.
    #[serde(default = "default_local_root")]
    pub root_path: String,
    /// Maximum single object size in bytes (default 5 GB).
    #[serde(default = "default_max_object")]
    pub max_object_size_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_path: default_local_root(),
            max_object_size_bytes: default_max_object(),
        }
    }
}

fn default_local_root() -> String {
    "./data/objects".to_string()
}

fn default_max_object() -> u64 {
    5_368_709_120 // 5 GB
}
