//! Unified application error types for Canopy.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator. The tree engine distinguishes a
//! handful of domain failures (depth, cycles, name clashes, root
//! immutability) from infrastructure failures (database, storage).

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The requested node or user does not exist (or is invisible to the caller).
    NotFound,
    /// The caller can see the node but lacks the required access level.
    PermissionDenied,
    /// Creating or moving would exceed the configured maximum folder depth.
    DepthLimitExceeded,
    /// A sibling with the same name already exists.
    NameConflict,
    /// A move target is the moved folder itself or one of its descendants.
    CycleDetected,
    /// The operation targets a user's root folder, which is immutable.
    RootImmutable,
    /// A concurrent modification or duplicate record was detected.
    Conflict,
    /// Input validation failed.
    Validation,
    /// An object store operation failed.
    StorageIo,
    /// The relational and physical stores disagree after a partial failure.
    InconsistentState,
    /// A database error occurred.
    Database,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::PermissionDenied => write!(f, "PERMISSION_DENIED"),
            Self::DepthLimitExceeded => write!(f, "DEPTH_LIMIT_EXCEEDED"),
            Self::NameConflict => write!(f, "NAME_CONFLICT"),
            Self::CycleDetected => write!(f, "CYCLE_DETECTED"),
            Self::RootImmutable => write!(f, "ROOT_IMMUTABLE"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::StorageIo => write!(f, "STORAGE_IO"),
            Self::InconsistentState => write!(f, "INCONSISTENT_STATE"),
            Self::Database => write!(f, "DATABASE"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified application error used throughout Canopy.
///
/// All crate-specific errors are mapped into `AppError` using `From` impls
/// or explicit `.map_err()` calls.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a permission-denied error.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    /// Create a depth-limit error.
    pub fn depth_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DepthLimitExceeded, message)
    }

    /// Create a name-conflict error.
    pub fn name_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NameConflict, message)
    }

    /// Create a cycle error.
    pub fn cycle(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CycleDetected, message)
    }

    /// Create a root-immutable error.
    pub fn root_immutable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RootImmutable, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a storage I/O error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageIo, message)
    }

    /// Create an inconsistent-state error.
    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InconsistentState, message)
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Returns `true` if this error has the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::StorageIo, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
