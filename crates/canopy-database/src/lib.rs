//! # canopy-database
//!
//! Relational persistence for the folder tree: the [`TreeStore`] trait,
//! its PostgreSQL and in-memory implementations, the sqlx repositories
//! behind the PostgreSQL store, and pool and migration management.

pub mod connection;
pub mod error;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use store::{
    Change, ChangeSet, MemoryTreeStore, PgTreeStore, Precondition, SubtreeSnapshot, TreeStore,
};
