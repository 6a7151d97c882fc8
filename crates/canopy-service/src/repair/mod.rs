//! Reconciliation of storage effects that failed after commit.

pub mod service;

pub use service::{RepairReport, RepairService};
