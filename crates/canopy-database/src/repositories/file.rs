//! File repository implementation.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use canopy_core::error::AppError;
use canopy_core::result::AppResult;
use canopy_entity::file::File;

use crate::error::map_db_error;

/// Repository for file rows.
#[derive(Debug, Clone)]
pub struct FileRepository {
    pool: PgPool,
}

impl FileRepository {
    /// Create a new file repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a file by ID.
    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<File>> {
        sqlx::query_as::<_, File>("SELECT * FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to find file", e))
    }

    /// List files in a folder.
    pub async fn find_by_folder(&self, folder_id: Uuid) -> AppResult<Vec<File>> {
        sqlx::query_as::<_, File>("SELECT * FROM files WHERE folder_id = $1 ORDER BY name ASC")
            .bind(folder_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to list files", e))
    }

    /// Files in any of the given folders.
    pub async fn find_in_folders(&self, folder_ids: &[Uuid]) -> AppResult<Vec<File>> {
        sqlx::query_as::<_, File>("SELECT * FROM files WHERE folder_id = ANY($1)")
            .bind(folder_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to list subtree files", e))
    }

    /// Insert a file row.
    pub async fn insert(conn: &mut PgConnection, file: &File) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO files (id, folder_id, owner_id, name, storage_key, size_bytes, \
             mime_type, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(file.id)
        .bind(file.folder_id)
        .bind(file.owner_id)
        .bind(&file.name)
        .bind(&file.storage_key)
        .bind(file.size_bytes)
        .bind(&file.mime_type)
        .bind(file.created_at)
        .bind(file.updated_at)
        .execute(conn)
        .await
        .map_err(|e| map_db_error("Failed to create file", e))?;
        Ok(())
    }

    /// Rename a file.
    pub async fn rename(conn: &mut PgConnection, file_id: Uuid, name: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE files SET name = $2, updated_at = NOW() WHERE id = $1")
            .bind(file_id)
            .bind(name)
            .execute(conn)
            .await
            .map_err(|e| map_db_error("Failed to rename file", e))?;
        expect_one(result.rows_affected(), file_id)
    }

    /// Move a file to another folder.
    pub async fn move_file(
        conn: &mut PgConnection,
        file_id: Uuid,
        folder_id: Uuid,
    ) -> AppResult<()> {
        let result =
            sqlx::query("UPDATE files SET folder_id = $2, updated_at = NOW() WHERE id = $1")
                .bind(file_id)
                .bind(folder_id)
                .execute(conn)
                .await
                .map_err(|e| map_db_error("Failed to move file", e))?;
        expect_one(result.rows_affected(), file_id)
    }

    /// Delete a file row.
    pub async fn delete(conn: &mut PgConnection, file_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(file_id)
            .execute(conn)
            .await
            .map_err(|e| map_db_error("Failed to delete file", e))?;
        expect_one(result.rows_affected(), file_id)
    }
}

fn expect_one(rows: u64, file_id: Uuid) -> AppResult<()> {
    if rows == 0 {
        return Err(AppError::not_found(format!("File {file_id} not found")));
    }
    Ok(())
}
