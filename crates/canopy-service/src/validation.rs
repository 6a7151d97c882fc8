//! Display name validation shared by folders and files.

use canopy_core::AppError;
use canopy_core::result::AppResult;

/// Check a folder or file display name.
///
/// Names must be non-empty, at most `max_len` characters, contain neither
/// `/` nor NUL, and must not be `.` or `..`.
pub fn validate_name(name: &str, max_len: usize) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::validation("Name cannot be empty"));
    }
    if name.chars().count() > max_len {
        return Err(AppError::validation(format!(
            "Name exceeds {max_len} characters"
        )));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(AppError::validation(format!(
            "Name '{}' contains a forbidden character",
            name.escape_default()
        )));
    }
    if name == "." || name == ".." {
        return Err(AppError::validation(format!("'{name}' is a reserved name")));
    }
    Ok(())
}
