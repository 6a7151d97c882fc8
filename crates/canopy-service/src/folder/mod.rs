//! Folder mutation and tree services.

pub mod service;
pub mod tree;

pub use service::{ChildEntry, DeleteReport, FolderService};
pub use tree::TreeService;
