//! User identity types.

pub mod principal;

pub use principal::{AdminScope, Principal};
