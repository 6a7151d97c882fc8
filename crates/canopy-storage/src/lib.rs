//! # canopy-storage
//!
//! Physical storage for the folder tree: the local filesystem object store
//! and storage key generation.

pub mod keys;
pub mod providers;

pub use keys::generate_key;
pub use providers::LocalStorageProvider;
