//! Error types for entity store operations.

use thiserror::Error;

/// Structured error types for entity store operations.
///
/// A write that fails with one of these errors has not mutated the store.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// A configured identity field was absent or null in the written object
    #[error("Missing identity field '{field}' for type '{typename}'")]
    IdentityMissing { typename: String, field: String },

    /// A configured identity field held something that cannot serve as identity
    #[error("Invalid identity field '{field}' for type '{typename}': {reason}")]
    InvalidIdentity {
        typename: String,
        field: String,
        reason: String,
    },

    /// A standalone entity write was attempted for a type that is only ever stored inline
    #[error("Type '{typename}' has no identity policy and can only be stored inside a parent")]
    NoIdentityPolicy { typename: String },
}

impl StoreError {
    /// Check if this error is a missing identity field
    pub fn is_identity_missing(&self) -> bool {
        matches!(self, StoreError::IdentityMissing { .. })
    }

    /// Check if this error is related to identity computation
    pub fn is_identity_error(&self) -> bool {
        matches!(
            self,
            StoreError::IdentityMissing { .. } | StoreError::InvalidIdentity { .. }
        )
    }

    /// Get the typename associated with this error
    pub fn typename(&self) -> &str {
        match self {
            StoreError::IdentityMissing { typename, .. }
            | StoreError::InvalidIdentity { typename, .. }
            | StoreError::NoIdentityPolicy { typename } => typename,
        }
    }

    /// Get the field if this is a field-related error
    pub fn field(&self) -> Option<&str> {
        match self {
            StoreError::IdentityMissing { field, .. }
            | StoreError::InvalidIdentity { field, .. } => Some(field),
            StoreError::NoIdentityPolicy { .. } => None,
        }
    }
}

// Conversion from StoreError to the main Error type
impl From<StoreError> for crate::Error {
    fn from(err: StoreError) -> Self {
        crate::Error::Store(err)
    }
}
