//! The identity context supplied by the (external) authentication layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Administrative capability of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminScope {
    /// A regular user.
    #[default]
    None,
    /// An administrator limited to administrative surfaces; gets no
    /// implicit access to user content.
    Restricted,
    /// An administrator with access to every node.
    Unrestricted,
}

/// Who is acting. The engine authorizes, it never authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// The acting user.
    pub user_id: Uuid,
    /// Administrative capability.
    pub admin: AdminScope,
}

impl Principal {
    /// A regular user.
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            admin: AdminScope::None,
        }
    }

    /// An administrator with unrestricted scope.
    pub fn unrestricted_admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            admin: AdminScope::Unrestricted,
        }
    }

    /// An administrator with restricted scope.
    pub fn restricted_admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            admin: AdminScope::Restricted,
        }
    }

    /// Returns whether the caller bypasses tree permissions.
    pub fn is_unrestricted_admin(&self) -> bool {
        self.admin == AdminScope::Unrestricted
    }

    /// Returns whether the caller is a restricted administrator.
    pub fn is_restricted_admin(&self) -> bool {
        self.admin == AdminScope::Restricted
    }
}
