//! Permission level enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access level carried by a grant.
///
/// `Write` implies `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "permission_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    /// View the node and list its contents.
    Read,
    /// Modify the node and its contents.
    Write,
}

impl PermissionLevel {
    /// Whether a grant at this level satisfies a check for `required`.
    pub fn satisfies(&self, required: PermissionLevel) -> bool {
        match (self, required) {
            (Self::Write, _) => true,
            (Self::Read, Self::Read) => true,
            (Self::Read, Self::Write) => false,
        }
    }

    /// Return the level as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = canopy_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            _ => Err(canopy_core::AppError::validation(format!(
                "Invalid permission level: '{s}'. Expected one of: read, write"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_implies_read() {
        assert!(PermissionLevel::Write.satisfies(PermissionLevel::Read));
        assert!(PermissionLevel::Write.satisfies(PermissionLevel::Write));
        assert!(PermissionLevel::Read.satisfies(PermissionLevel::Read));
        assert!(!PermissionLevel::Read.satisfies(PermissionLevel::Write));
    }

    #[test]
    fn test_from_str() {
        assert_eq!("WRITE".parse::<PermissionLevel>().unwrap(), PermissionLevel::Write);
        assert!("owner".parse::<PermissionLevel>().is_err());
    }
}
