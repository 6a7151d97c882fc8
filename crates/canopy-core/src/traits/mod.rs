//! Core traits defined in `canopy-core` and implemented by other crates.

pub mod storage;

pub use storage::{ObjectStore, StoredObjectMeta};
