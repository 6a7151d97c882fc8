//! Background processing for Canopy.
//!
//! This crate provides the repair runner: a loop that periodically drains
//! repair tickets left behind by storage effects that failed after their
//! relational commit.

pub mod runner;

pub use runner::RepairRunner;
