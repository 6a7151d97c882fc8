//! Repair tickets for storage effects that failed after a relational commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

use crate::node::{NodeRef, NodeType};

/// The storage effect a ticket re-applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepairAction {
    /// A folder row exists but its directory could not be created.
    EnsureDirectory {
        /// Storage address of the directory.
        address: String,
    },
    /// Rows were deleted but the directory could not be removed.
    RemoveDirectory {
        /// Storage address of the directory.
        address: String,
    },
    /// A file row was deleted but its object could not be removed.
    RemoveObject {
        /// Storage address of the object.
        address: String,
    },
    /// The parent changed but the directory or object was not moved.
    Relocate {
        /// Previous storage address.
        from: String,
        /// Storage address after the committed move.
        to: String,
    },
}

impl RepairAction {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::EnsureDirectory { .. } => "ensure_directory",
            Self::RemoveDirectory { .. } => "remove_directory",
            Self::RemoveObject { .. } => "remove_object",
            Self::Relocate { .. } => "relocate",
        }
    }
}

/// A node flagged for asynchronous reconciliation of its physical storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RepairTicket {
    /// Unique ticket identifier.
    pub id: Uuid,
    /// Table of the affected node.
    pub node_type: NodeType,
    /// ID of the affected node (may no longer exist after a delete).
    pub node_id: Uuid,
    /// Effect to re-apply.
    pub action: Json<RepairAction>,
    /// The storage error that caused the ticket, or the last retry error.
    pub last_error: String,
    /// Number of repair attempts so far.
    pub attempts: i32,
    /// When the ticket was opened.
    pub created_at: DateTime<Utc>,
    /// When the ticket was last touched.
    pub updated_at: DateTime<Utc>,
}

impl RepairTicket {
    /// Open a new ticket.
    pub fn open(node: NodeRef, action: RepairAction, error: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            node_type: node.node_type(),
            node_id: node.id(),
            action: Json(action),
            last_error: error.into(),
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The affected node.
    pub fn node(&self) -> NodeRef {
        NodeRef::new(self.node_type, self.node_id)
    }
}
