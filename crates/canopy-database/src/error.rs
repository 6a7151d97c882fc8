//! Mapping of sqlx errors onto [`AppError`] kinds.

use canopy_core::error::{AppError, ErrorKind};

/// Unique index on sibling folder names.
pub const FOLDER_NAME_INDEX: &str = "folders_parent_name_key";
/// Unique index on file names within a folder.
pub const FILE_NAME_INDEX: &str = "files_folder_name_key";
/// Unique index allowing one root folder per owner.
pub const ROOT_PER_OWNER_INDEX: &str = "folders_owner_root_key";
/// Unique index allowing one grant per user and node.
pub const GRANT_INDEX: &str = "permission_grants_user_target_key";

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Convert a sqlx error into an [`AppError`], recognising constraint
/// violations that correspond to domain failures.
pub fn map_db_error(context: &str, err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db_err) = err {
        let code = db_err.code();
        match (code.as_deref(), db_err.constraint()) {
            (Some(UNIQUE_VIOLATION), Some(FOLDER_NAME_INDEX)) => {
                return AppError::name_conflict("A folder with that name already exists here");
            }
            (Some(UNIQUE_VIOLATION), Some(FILE_NAME_INDEX)) => {
                return AppError::name_conflict("A file with that name already exists here");
            }
            (Some(UNIQUE_VIOLATION), Some(ROOT_PER_OWNER_INDEX)) => {
                return AppError::conflict("User already has a root folder");
            }
            (Some(UNIQUE_VIOLATION), _) => {
                return AppError::conflict(format!("{context}: duplicate record"));
            }
            (Some(FOREIGN_KEY_VIOLATION), _) => {
                return AppError::conflict(format!("{context}: row is still referenced"));
            }
            _ => {}
        }
    }
    AppError::with_source(ErrorKind::Database, context.to_string(), err)
}
