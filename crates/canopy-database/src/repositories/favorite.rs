//! Favorite repository implementation.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use canopy_core::result::AppResult;
use canopy_entity::favorite::Favorite;

use crate::error::map_db_error;

/// Repository for per-user favorite markers.
#[derive(Debug, Clone)]
pub struct FavoriteRepository {
    pool: PgPool,
}

impl FavoriteRepository {
    /// Create a new favorite repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A user's favorites, newest first.
    pub async fn find_by_user(&self, user_id: Uuid) -> AppResult<Vec<Favorite>> {
        sqlx::query_as::<_, Favorite>(
            "SELECT * FROM favorites WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to list favorites", e))
    }

    /// Whether a user has marked a node.
    pub async fn exists(&self, user_id: Uuid, target_id: Uuid) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM favorites WHERE user_id = $1 AND target_id = $2)",
        )
        .bind(user_id)
        .bind(target_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to check favorite", e))
    }

    /// Insert a marker.
    pub async fn insert(conn: &mut PgConnection, favorite: &Favorite) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO favorites (user_id, target_type, target_id, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(favorite.user_id)
        .bind(favorite.target_type)
        .bind(favorite.target_id)
        .bind(favorite.created_at)
        .execute(conn)
        .await
        .map_err(|e| map_db_error("Failed to add favorite", e))?;
        Ok(())
    }

    /// Remove one user's marker.
    pub async fn delete(conn: &mut PgConnection, user_id: Uuid, target_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND target_id = $2")
            .bind(user_id)
            .bind(target_id)
            .execute(conn)
            .await
            .map_err(|e| map_db_error("Failed to remove favorite", e))?;
        Ok(result.rows_affected())
    }

    /// Remove every marker on a node.
    pub async fn delete_by_target(conn: &mut PgConnection, target_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM favorites WHERE target_id = $1")
            .bind(target_id)
            .execute(conn)
            .await
            .map_err(|e| map_db_error("Failed to remove favorites for node", e))?;
        Ok(result.rows_affected())
    }
}
