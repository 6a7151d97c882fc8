//! # canopy-service
//!
//! The mutation coordinator and read services of Canopy. Services combine
//! the tree store, the object store, the permission resolver and the grant
//! propagator into the public operations on folders, files and grants.
//!
//! Services follow constructor injection: every collaborator is provided
//! at construction time via `Arc` references. [`Services`] wires them all.

pub mod context;
pub mod effects;
pub mod favorite;
pub mod file;
pub mod folder;
mod lookup;
pub mod outcome;
pub mod path;
pub mod permission;
pub mod registry;
pub mod repair;
pub mod size;
pub mod validation;

pub use context::RequestContext;
pub use effects::StorageEffects;
pub use favorite::FavoriteService;
pub use file::{CreateFileRequest, FileService};
pub use folder::{ChildEntry, DeleteReport, FolderService, TreeService};
pub use outcome::MutationOutcome;
pub use path::PathVirtualizer;
pub use permission::{GrantRequest, PermissionService};
pub use registry::Services;
pub use repair::{RepairReport, RepairService};
pub use size::{AggregateDelta, RecomputeReport, SizeAggregator};
