//! Permission grant management.

pub mod service;

pub use service::{GrantRequest, PermissionService};
