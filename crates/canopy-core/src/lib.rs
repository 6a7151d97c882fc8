//! # canopy-core
//!
//! Core crate for Canopy. Contains the unified error system, configuration
//! schemas, the object store trait, and shared pagination types.
//!
//! This crate has **no** internal dependencies on other Canopy crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
