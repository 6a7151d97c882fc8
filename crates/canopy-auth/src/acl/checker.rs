//! Access decisions and the effective access a caller holds on a node.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use canopy_entity::NodeRef;
use canopy_entity::permission::PermissionLevel;

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// The caller may act.
    Allow,
    /// The caller may not act.
    Deny,
}

impl Decision {
    /// Whether this is [`Decision::Allow`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Where the effective access was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessSource {
    /// The caller owns the node or an ancestor of it.
    Owner {
        /// The owned node.
        node: NodeRef,
    },
    /// The caller is an unrestricted administrator.
    AdminBypass,
    /// A grant row on the node or the nearest ancestor carrying one.
    Grant {
        /// The node holding the decisive grant.
        node: NodeRef,
        /// Lineage of that grant.
        source_id: Uuid,
    },
    /// No ownership, admin scope or grant applies.
    Denied,
}

/// The strongest level a caller holds on a node, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveAccess {
    /// Resolved level, `None` when the caller has no access.
    pub level: Option<PermissionLevel>,
    /// Where the level came from.
    pub source: AccessSource,
}

impl EffectiveAccess {
    /// Full access through ownership.
    pub fn owner(node: NodeRef) -> Self {
        Self {
            level: Some(PermissionLevel::Write),
            source: AccessSource::Owner { node },
        }
    }

    /// Full access through administrative scope.
    pub fn admin() -> Self {
        Self {
            level: Some(PermissionLevel::Write),
            source: AccessSource::AdminBypass,
        }
    }

    /// Access through a grant row.
    pub fn grant(node: NodeRef, source_id: Uuid, level: PermissionLevel) -> Self {
        Self {
            level: Some(level),
            source: AccessSource::Grant { node, source_id },
        }
    }

    /// No access.
    pub fn denied() -> Self {
        Self {
            level: None,
            source: AccessSource::Denied,
        }
    }

    /// Whether the resolved level satisfies `required`.
    pub fn allows(&self, required: PermissionLevel) -> bool {
        self.level.is_some_and(|level| level.satisfies(required))
    }

    /// Turn the resolved level into a decision for `required`.
    pub fn decide(&self, required: PermissionLevel) -> Decision {
        if self.allows(required) {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_grant_does_not_allow_write() {
        let node = NodeRef::Folder(Uuid::new_v4());
        let access = EffectiveAccess::grant(node, node.id(), PermissionLevel::Read);
        assert_eq!(access.decide(PermissionLevel::Read), Decision::Allow);
        assert_eq!(access.decide(PermissionLevel::Write), Decision::Deny);
    }

    #[test]
    fn test_denied_allows_nothing() {
        let access = EffectiveAccess::denied();
        assert!(!access.allows(PermissionLevel::Read));
        assert!(!access.decide(PermissionLevel::Read).is_allowed());
    }
}
