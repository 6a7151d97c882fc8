//! Folder tree limits.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Limits applied by the mutation coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Folders must sit at a depth strictly below this value (root is depth 0).
    #[serde(default = "default_max_depth")]
    pub max_subfolder_depth: u32,
    /// Length of generated storage keys.
    #[serde(default = "default_key_length")]
    pub storage_key_length: usize,
    /// Maximum length of a folder or file display name.
    #[serde(default = "default_max_name")]
    pub max_name_length: usize,
}

impl TreeConfig {
    /// Check that the limits are usable.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_subfolder_depth == 0 {
            return Err(AppError::configuration(
                "tree.max_subfolder_depth must be at least 1",
            ));
        }
        if self.storage_key_length < 8 {
            return Err(AppError::configuration(
                "tree.storage_key_length must be at least 8",
            ));
        }
        Ok(())
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_subfolder_depth: default_max_depth(),
            storage_key_length: default_key_length(),
            max_name_length: default_max_name(),
        }
    }
}

fn default_max_depth() -> u32 {
    5
}

fn default_key_length() -> usize {
    16
}

fn default_max_name() -> usize {
    255
}
