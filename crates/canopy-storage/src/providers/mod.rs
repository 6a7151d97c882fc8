//! Object store implementations.

pub mod local;

pub use local::LocalStorageProvider;
