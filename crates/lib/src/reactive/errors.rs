//! Error types for reactive variables.

use thiserror::Error;

/// Structured error types for reactive variable operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum VarError {
    /// No variable with this name was created
    #[error("Reactive variable not found: {name}")]
    NotFound { name: String },

    /// A variable with this name already exists
    #[error("Reactive variable already exists: {name}")]
    AlreadyExists { name: String },

    /// The variable holds a different type than requested
    #[error("Reactive variable '{name}' type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// The variable's value could not be converted to JSON
    #[error("Reactive variable '{name}' serialization failed: {reason}")]
    SerializationFailed { name: String, reason: String },
}

impl VarError {
    /// Check if this error indicates the variable was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, VarError::NotFound { .. })
    }

    /// Check if this error indicates the name was taken
    pub fn is_already_exists(&self) -> bool {
        matches!(self, VarError::AlreadyExists { .. })
    }

    /// Check if this error is related to type mismatches
    pub fn is_type_error(&self) -> bool {
        matches!(self, VarError::TypeMismatch { .. })
    }

    /// Get the variable name associated with this error
    pub fn name(&self) -> &str {
        match self {
            VarError::NotFound { name }
            | VarError::AlreadyExists { name }
            | VarError::TypeMismatch { name, .. }
            | VarError::SerializationFailed { name, .. } => name,
        }
    }
}

// Conversion from VarError to the main Error type
impl From<VarError> for crate::Error {
    fn from(err: VarError) -> Self {
        crate::Error::Reactive(err)
    }
}
