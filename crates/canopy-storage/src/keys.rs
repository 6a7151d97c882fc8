//! Storage key generation.
//!
//! Keys are random, immutable and independent of display names, so
//! renames never touch physical storage.

use rand::Rng;
use rand::distributions::Alphanumeric;

use canopy_core::AppError;
use canopy_core::result::AppResult;

/// Default key length.
pub const DEFAULT_KEY_LENGTH: usize = 16;

/// Generate a random alphanumeric key of `length` characters.
pub fn generate_key(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Check that a key is a single, non-empty alphanumeric address segment.
pub fn validate_key(key: &str) -> AppResult<()> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::validation(format!("Invalid storage key: '{key}'")));
    }
    Ok(())
}
