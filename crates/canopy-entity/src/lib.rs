//! # canopy-entity
//!
//! Domain entity models for Canopy. Every struct in this crate represents
//! a database table row or a domain value object. Row entities derive
//! `sqlx::FromRow` so the Postgres store can load them directly.

pub mod favorite;
pub mod file;
pub mod folder;
pub mod node;
pub mod permission;
pub mod repair;
pub mod user;

pub use node::{NodeRef, NodeType};
