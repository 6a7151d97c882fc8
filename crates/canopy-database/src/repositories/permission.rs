//! Permission grant repository implementation.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use canopy_core::error::AppError;
use canopy_core::result::AppResult;
use canopy_entity::NodeRef;
use canopy_entity::permission::{PermissionGrant, PermissionLevel};

use crate::error::map_db_error;

/// Repository for grant rows.
#[derive(Debug, Clone)]
pub struct GrantRepository {
    pool: PgPool,
}

impl GrantRepository {
    /// Create a new grant repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A user's grant on one node.
    pub async fn find_user_grant(
        &self,
        user_id: Uuid,
        target_id: Uuid,
    ) -> AppResult<Option<PermissionGrant>> {
        sqlx::query_as::<_, PermissionGrant>(
            "SELECT * FROM permission_grants WHERE user_id = $1 AND target_id = $2",
        )
        .bind(user_id)
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to find grant", e))
    }

    /// A user's grants on any of the given nodes.
    pub async fn find_user_grants(
        &self,
        user_id: Uuid,
        target_ids: &[Uuid],
    ) -> AppResult<Vec<PermissionGrant>> {
        sqlx::query_as::<_, PermissionGrant>(
            "SELECT * FROM permission_grants WHERE user_id = $1 AND target_id = ANY($2)",
        )
        .bind(user_id)
        .bind(target_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to load grants", e))
    }

    /// Every grant on one node.
    pub async fn find_by_target(&self, target_id: Uuid) -> AppResult<Vec<PermissionGrant>> {
        sqlx::query_as::<_, PermissionGrant>(
            "SELECT * FROM permission_grants WHERE target_id = $1 ORDER BY created_at ASC",
        )
        .bind(target_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to list grants", e))
    }

    /// Every grant on any of the given nodes.
    pub async fn find_by_targets(&self, target_ids: &[Uuid]) -> AppResult<Vec<PermissionGrant>> {
        sqlx::query_as::<_, PermissionGrant>(
            "SELECT * FROM permission_grants WHERE target_id = ANY($1)",
        )
        .bind(target_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to load subtree grants", e))
    }

    /// Insert a grant row.
    pub async fn insert(conn: &mut PgConnection, grant: &PermissionGrant) -> AppResult<()> {
        let target = grant.target();
        let sql = format!(
            "INSERT INTO permission_grants (id, user_id, target_type, target_id, level, \
             source_id, granted_by, created_at) \
             SELECT $1, $2, $3, $4, $5, $6, $7, $8 \
             WHERE EXISTS (SELECT 1 FROM {} WHERE id = $4 FOR SHARE)",
            match target {
                NodeRef::Folder(_) => "folders",
                NodeRef::File(_) => "files",
            }
        );
        let result = sqlx::query(&sql)
            .bind(grant.id)
            .bind(grant.user_id)
            .bind(grant.target_type)
            .bind(grant.target_id)
            .bind(grant.level)
            .bind(grant.source_id)
            .bind(grant.granted_by)
            .bind(grant.created_at)
            .execute(conn)
            .await
            .map_err(|e| map_db_error("Failed to create grant", e))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("{target} not found")));
        }
        Ok(())
    }

    /// Share-lock a user's grant on a node and return its level.
    pub async fn lock_level(
        conn: &mut PgConnection,
        user_id: Uuid,
        target_id: Uuid,
    ) -> AppResult<Option<PermissionLevel>> {
        sqlx::query_scalar::<_, PermissionLevel>(
            "SELECT level FROM permission_grants WHERE user_id = $1 AND target_id = $2 FOR SHARE",
        )
        .bind(user_id)
        .bind(target_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_db_error("Failed to lock grant", e))
    }

    /// Change the level and lineage of a grant.
    pub async fn update(
        conn: &mut PgConnection,
        grant_id: Uuid,
        level: PermissionLevel,
        source_id: Uuid,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE permission_grants SET level = $2, source_id = $3 WHERE id = $1",
        )
        .bind(grant_id)
        .bind(level)
        .bind(source_id)
        .execute(conn)
        .await
        .map_err(|e| map_db_error("Failed to update grant", e))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Grant {grant_id} not found")));
        }
        Ok(())
    }

    /// Delete one grant.
    pub async fn delete(conn: &mut PgConnection, grant_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM permission_grants WHERE id = $1")
            .bind(grant_id)
            .execute(conn)
            .await
            .map_err(|e| map_db_error("Failed to delete grant", e))?;
        Ok(result.rows_affected())
    }

    /// Delete every grant on a node.
    pub async fn delete_by_target(conn: &mut PgConnection, target_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM permission_grants WHERE target_id = $1")
            .bind(target_id)
            .execute(conn)
            .await
            .map_err(|e| map_db_error("Failed to delete grants for node", e))?;
        Ok(result.rows_affected())
    }
}
