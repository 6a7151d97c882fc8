//! Core type definitions used across the Canopy workspace.

pub mod pagination;

pub use pagination::{PageRequest, PageResponse};
