//! Request context carrying the acting principal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use canopy_entity::user::Principal;

/// Context for the current request.
///
/// Built by whatever front end authenticated the caller and passed into
/// every service method so each operation knows who is acting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// The acting principal.
    pub principal: Principal,
    /// Correlation ID for logs.
    pub request_id: Uuid,
    /// When the request was received.
    pub request_time: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a new request context.
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            request_id: Uuid::new_v4(),
            request_time: Utc::now(),
        }
    }

    /// Context for a regular user.
    pub fn user(user_id: Uuid) -> Self {
        Self::new(Principal::user(user_id))
    }

    /// The acting user's ID.
    pub fn user_id(&self) -> Uuid {
        self.principal.user_id
    }

    /// Returns whether the caller bypasses tree permissions.
    pub fn is_unrestricted_admin(&self) -> bool {
        self.principal.is_unrestricted_admin()
    }
}
