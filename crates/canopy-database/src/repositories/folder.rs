//! Folder repository implementation.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use canopy_core::error::AppError;
use canopy_core::result::AppResult;
use canopy_entity::folder::Folder;

use crate::error::map_db_error;

/// Repository for folder rows and tree queries.
///
/// Reads run on the pool; writes take the connection of an open
/// transaction so a whole change set commits together.
#[derive(Debug, Clone)]
pub struct FolderRepository {
    pool: PgPool,
}

impl FolderRepository {
    /// Create a new folder repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a folder by ID.
    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Folder>> {
        sqlx::query_as::<_, Folder>("SELECT * FROM folders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to find folder", e))
    }

    /// Find a user's root folder.
    pub async fn find_root(&self, owner_id: Uuid) -> AppResult<Option<Folder>> {
        sqlx::query_as::<_, Folder>(
            "SELECT * FROM folders WHERE owner_id = $1 AND parent_id IS NULL",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to find root folder", e))
    }

    /// List direct children of a folder.
    pub async fn find_children(&self, parent_id: Uuid) -> AppResult<Vec<Folder>> {
        sqlx::query_as::<_, Folder>(
            "SELECT * FROM folders WHERE parent_id = $1 ORDER BY name ASC",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to list child folders", e))
    }

    /// A folder and all of its descendants, unordered.
    pub async fn find_subtree(&self, folder_id: Uuid) -> AppResult<Vec<Folder>> {
        sqlx::query_as::<_, Folder>(
            "WITH RECURSIVE tree AS ( \
                SELECT * FROM folders WHERE id = $1 \
                UNION ALL \
                SELECT f.* FROM folders f INNER JOIN tree t ON f.parent_id = t.id \
             ) SELECT * FROM tree",
        )
        .bind(folder_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to load subtree", e))
    }

    /// The ancestor chain including the folder itself, root first.
    pub async fn find_ancestors(&self, folder_id: Uuid) -> AppResult<Vec<Folder>> {
        sqlx::query_as::<_, Folder>(ANCESTORS_SQL)
            .bind(folder_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to find ancestors", e))
    }

    /// Ancestor IDs of a folder inside a transaction, root first.
    pub async fn ancestor_ids_in(conn: &mut PgConnection, folder_id: Uuid) -> AppResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "WITH RECURSIVE ancestors AS ( \
                SELECT id, parent_id, 0 AS hops FROM folders WHERE id = $1 \
                UNION ALL \
                SELECT f.id, f.parent_id, a.hops + 1 FROM folders f \
                INNER JOIN ancestors a ON f.id = a.parent_id \
             ) SELECT id FROM ancestors ORDER BY hops DESC",
        )
        .bind(folder_id)
        .fetch_all(conn)
        .await
        .map_err(|e| map_db_error("Failed to find ancestors", e))
    }

    /// Lock a folder row and return its version.
    pub async fn lock_version(conn: &mut PgConnection, folder_id: Uuid) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT version FROM folders WHERE id = $1 FOR UPDATE")
            .bind(folder_id)
            .fetch_optional(conn)
            .await
            .map_err(|e| map_db_error("Failed to lock folder", e))?
            .ok_or_else(|| AppError::not_found(format!("Folder {folder_id} not found")))
    }

    /// Share-lock a folder's ancestor rows and return the chain, root first.
    ///
    /// The chain is read again after locking so a move that committed while
    /// the locks were pending is seen.
    pub async fn lock_chain(conn: &mut PgConnection, folder_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids = Self::ancestor_ids_in(&mut *conn, folder_id).await?;
        sqlx::query("SELECT id FROM folders WHERE id = ANY($1) ORDER BY id FOR SHARE")
            .bind(&ids)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_db_error("Failed to lock ancestors", e))?;
        Self::ancestor_ids_in(conn, folder_id).await
    }

    /// Lock a folder row and return its subtree counters.
    pub async fn lock_totals(
        conn: &mut PgConnection,
        folder_id: Uuid,
    ) -> AppResult<(i64, i64, i64)> {
        sqlx::query_as::<_, (i64, i64, i64)>(
            "SELECT subtree_bytes, subtree_files, subtree_folders FROM folders \
             WHERE id = $1 FOR UPDATE",
        )
        .bind(folder_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_db_error("Failed to lock folder", e))?
        .ok_or_else(|| AppError::not_found(format!("Folder {folder_id} not found")))
    }

    /// Insert a folder row.
    pub async fn insert(conn: &mut PgConnection, folder: &Folder) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO folders (id, parent_id, owner_id, name, storage_key, version, \
             subtree_bytes, subtree_files, subtree_folders, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(folder.id)
        .bind(folder.parent_id)
        .bind(folder.owner_id)
        .bind(&folder.name)
        .bind(&folder.storage_key)
        .bind(folder.version)
        .bind(folder.subtree_bytes)
        .bind(folder.subtree_files)
        .bind(folder.subtree_folders)
        .bind(folder.created_at)
        .bind(folder.updated_at)
        .execute(conn)
        .await
        .map_err(|e| map_db_error("Failed to create folder", e))?;
        Ok(())
    }

    /// Rename a folder.
    pub async fn rename(conn: &mut PgConnection, folder_id: Uuid, name: &str) -> AppResult<()> {
        let result =
            sqlx::query("UPDATE folders SET name = $2, updated_at = NOW() WHERE id = $1")
                .bind(folder_id)
                .bind(name)
                .execute(conn)
                .await
                .map_err(|e| map_db_error("Failed to rename folder", e))?;
        expect_one(result.rows_affected(), folder_id)
    }

    /// Attach a folder to a new parent.
    pub async fn reparent(
        conn: &mut PgConnection,
        folder_id: Uuid,
        parent_id: Uuid,
    ) -> AppResult<()> {
        let result =
            sqlx::query("UPDATE folders SET parent_id = $2, updated_at = NOW() WHERE id = $1")
                .bind(folder_id)
                .bind(parent_id)
                .execute(conn)
                .await
                .map_err(|e| map_db_error("Failed to move folder", e))?;
        expect_one(result.rows_affected(), folder_id)
    }

    /// Delete an empty folder. The foreign keys reject non-empty folders.
    pub async fn delete(conn: &mut PgConnection, folder_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM folders WHERE id = $1")
            .bind(folder_id)
            .execute(conn)
            .await
            .map_err(|e| map_db_error("Failed to delete folder", e))?;
        expect_one(result.rows_affected(), folder_id)
    }

    /// Add deltas to the aggregate counters.
    pub async fn adjust_aggregates(
        conn: &mut PgConnection,
        folder_id: Uuid,
        bytes: i64,
        files: i64,
        folders: i64,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE folders SET subtree_bytes = subtree_bytes + $2, \
             subtree_files = subtree_files + $3, subtree_folders = subtree_folders + $4 \
             WHERE id = $1",
        )
        .bind(folder_id)
        .bind(bytes)
        .bind(files)
        .bind(folders)
        .execute(conn)
        .await
        .map_err(|e| map_db_error("Failed to update folder aggregates", e))?;
        expect_one(result.rows_affected(), folder_id)
    }

    /// Overwrite the aggregate counters.
    pub async fn set_aggregates(
        conn: &mut PgConnection,
        folder_id: Uuid,
        bytes: i64,
        files: i64,
        folders: i64,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE folders SET subtree_bytes = $2, subtree_files = $3, subtree_folders = $4 \
             WHERE id = $1",
        )
        .bind(folder_id)
        .bind(bytes)
        .bind(files)
        .bind(folders)
        .execute(conn)
        .await
        .map_err(|e| map_db_error("Failed to set folder aggregates", e))?;
        expect_one(result.rows_affected(), folder_id)
    }

    /// Increment the folder's version.
    pub async fn bump_version(conn: &mut PgConnection, folder_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE folders SET version = version + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(folder_id)
        .execute(conn)
        .await
        .map_err(|e| map_db_error("Failed to bump folder version", e))?;
        expect_one(result.rows_affected(), folder_id)
    }
}

const ANCESTORS_SQL: &str = "WITH RECURSIVE ancestors AS ( \
        SELECT f.*, 0 AS hops FROM folders f WHERE f.id = $1 \
        UNION ALL \
        SELECT p.*, a.hops + 1 FROM folders p INNER JOIN ancestors a ON p.id = a.parent_id \
     ) SELECT id, parent_id, owner_id, name, storage_key, version, subtree_bytes, \
       subtree_files, subtree_folders, created_at, updated_at \
       FROM ancestors ORDER BY hops DESC";

fn expect_one(rows: u64, folder_id: Uuid) -> AppResult<()> {
    if rows == 0 {
        return Err(AppError::not_found(format!("Folder {folder_id} not found")));
    }
    Ok(())
}
