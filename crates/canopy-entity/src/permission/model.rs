//! Permission grant entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::level::PermissionLevel;
use crate::node::{NodeRef, NodeType};

/// A grant of access on one node to one non-owner user.
///
/// Unique per `(user_id, target_id)`. `source_id` names the node where the
/// grant was explicitly made; rows created by propagation carry the source
/// of the grant they were copied from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PermissionGrant {
    /// Unique grant identifier.
    pub id: Uuid,
    /// The user receiving access.
    pub user_id: Uuid,
    /// Table of the target node.
    pub target_type: NodeType,
    /// ID of the target node.
    pub target_id: Uuid,
    /// Granted level.
    pub level: PermissionLevel,
    /// Node on which this lineage was explicitly granted.
    pub source_id: Uuid,
    /// The user who made the grant.
    pub granted_by: Uuid,
    /// When this row was created.
    pub created_at: DateTime<Utc>,
}

impl PermissionGrant {
    /// Build an explicit grant on `target`.
    pub fn explicit(
        user_id: Uuid,
        target: NodeRef,
        level: PermissionLevel,
        granted_by: Uuid,
    ) -> Self {
        Self::propagated(user_id, target, level, target.id(), granted_by)
    }

    /// Build a grant on `target` that belongs to the lineage of `source_id`.
    pub fn propagated(
        user_id: Uuid,
        target: NodeRef,
        level: PermissionLevel,
        source_id: Uuid,
        granted_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            target_type: target.node_type(),
            target_id: target.id(),
            level,
            source_id,
            granted_by,
            created_at: Utc::now(),
        }
    }

    /// The node this grant applies to.
    pub fn target(&self) -> NodeRef {
        NodeRef::new(self.target_type, self.target_id)
    }

    /// Whether the grant was made on its own target rather than inherited.
    pub fn is_explicit(&self) -> bool {
        self.source_id == self.target_id
    }
}
