//! Favorite marker entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::node::{NodeRef, NodeType};

/// A user's bookmark on a folder or file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Favorite {
    /// The user who marked the node.
    pub user_id: Uuid,
    /// Table of the target node.
    pub target_type: NodeType,
    /// ID of the target node.
    pub target_id: Uuid,
    /// When the mark was created.
    pub created_at: DateTime<Utc>,
}

impl Favorite {
    /// Create a marker on `target` for `user_id`.
    pub fn new(user_id: Uuid, target: NodeRef) -> Self {
        Self {
            user_id,
            target_type: target.node_type(),
            target_id: target.id(),
            created_at: Utc::now(),
        }
    }

    /// The marked node.
    pub fn target(&self) -> NodeRef {
        NodeRef::new(self.target_type, self.target_id)
    }
}
