//! Tree access control: inheritance walk, effective permission resolution
//! and grant propagation.

pub mod checker;
pub mod inheritance;
pub mod propagation;
pub mod resolver;

pub use checker::{AccessSource, Decision, EffectiveAccess};
pub use propagation::{PermissionPropagator, PropagationReport, ScopeNode};
pub use resolver::PermissionResolver;
