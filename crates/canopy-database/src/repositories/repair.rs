//! Repair ticket repository implementation.

use sqlx::PgPool;
use uuid::Uuid;

use canopy_core::error::AppError;
use canopy_core::result::AppResult;
use canopy_entity::repair::RepairTicket;

use crate::error::map_db_error;

/// Repository for storage repair tickets.
#[derive(Debug, Clone)]
pub struct RepairRepository {
    pool: PgPool,
}

impl RepairRepository {
    /// Create a new repair repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a new ticket.
    pub async fn create(&self, ticket: &RepairTicket) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO repair_tickets (id, node_type, node_id, action, last_error, attempts, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(ticket.id)
        .bind(ticket.node_type)
        .bind(ticket.node_id)
        .bind(&ticket.action)
        .bind(&ticket.last_error)
        .bind(ticket.attempts)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to open repair ticket", e))?;
        Ok(())
    }

    /// Tickets that still have attempts left, oldest first.
    pub async fn find_pending(&self, limit: i64, max_attempts: i32) -> AppResult<Vec<RepairTicket>> {
        sqlx::query_as::<_, RepairTicket>(
            "SELECT * FROM repair_tickets WHERE attempts < $1 ORDER BY created_at ASC LIMIT $2",
        )
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to list repair tickets", e))
    }

    /// Record a failed attempt.
    pub async fn record_failure(&self, id: Uuid, error: &str) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE repair_tickets SET attempts = attempts + 1, last_error = $2, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to update repair ticket", e))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Repair ticket {id} not found")));
        }
        Ok(())
    }

    /// Delete a resolved ticket.
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM repair_tickets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to close repair ticket", e))?;
        Ok(())
    }
}
