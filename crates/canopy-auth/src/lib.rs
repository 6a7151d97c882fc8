//! # canopy-auth
//!
//! Authorization for the folder tree. The engine never authenticates: the
//! caller arrives as a [`Principal`](canopy_entity::user::Principal) and
//! this crate decides what it may do.
//!
//! ## Modules
//!
//! - `acl`: permission resolution with folder inheritance, and grant
//!   propagation across subtrees

pub mod acl;

pub use acl::{
    AccessSource, Decision, EffectiveAccess, PermissionPropagator, PermissionResolver,
    PropagationReport,
};
