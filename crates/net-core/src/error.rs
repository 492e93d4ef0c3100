//! Error types for network lifecycle operations

use thiserror::Error;

/// Main error type for network lifecycle operations
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("{0}")]
    HostOperation(#[from] HostOperationError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },
}

impl NetworkError {
    pub fn network_not_found(name: impl Into<String>) -> Self {
        NetworkError::NotFound {
            kind: "Network",
            name: name.into(),
        }
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        NetworkError::Validation(ValidationError::Semantic {
            message: message.into(),
        })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NetworkError::NotFound { .. })
    }
}

/// Configuration rejected by a driver's rule set or semantic checks
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid value for network option {key:?}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required network option {key:?}")]
    MissingKey { key: String },

    #[error("Invalid option {key:?}")]
    UnknownKey { key: String },

    #[error("{message}")]
    Semantic { message: String },
}

impl ValidationError {
    /// The offending config key, if the error is about one.
    pub fn key(&self) -> Option<&str> {
        match self {
            ValidationError::InvalidValue { key, .. }
            | ValidationError::MissingKey { key }
            | ValidationError::UnknownKey { key } => Some(key),
            ValidationError::Semantic { .. } => None,
        }
    }
}

/// Exclusivity violations, checked before any mutation begins
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("Parent interface {parent:?} in use by another network")]
    ParentInUse { parent: String },

    #[error("Cannot update network {name:?} parent interface while in use")]
    InUse { name: String },

    #[error("Network {name:?} already exists in project {project:?}")]
    AlreadyExists { project: String, name: String },

    #[error("Host interface {name:?} already exists")]
    HostObjectExists { name: String },

    #[error("{message}")]
    Refused { message: String },
}

/// A failed host-level step with the step that failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed {step}: {message}")]
pub struct HostOperationError {
    pub step: String,
    pub message: String,
}

impl HostOperationError {
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Re-label the error with the lifecycle step the call belonged to,
    /// keeping the original step as part of the message.
    pub fn context(self, step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: format!("{}: {}", self.step, self.message),
        }
    }
}

/// Cluster store transaction failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct PersistenceError {
    pub operation: String,
    pub message: String,
}

impl PersistenceError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Result of a single InterfaceController call
pub type HostResult<T> = std::result::Result<T, HostOperationError>;
