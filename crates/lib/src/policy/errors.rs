//! Error types for field policies.
//!
//! Read and merge policies are user code. A failing policy is a configuration bug, so these
//! errors are propagated to the caller of the read or write untouched.

use thiserror::Error;

/// Structured error types raised by or around field policies.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A read policy could not produce a value
    #[error("Read policy for {typename}.{field} failed: {reason}")]
    ReadFailed {
        typename: String,
        field: String,
        reason: String,
    },

    /// A merge policy could not combine existing and incoming values
    #[error("Merge policy for {typename}.{field} failed: {reason}")]
    MergeFailed {
        typename: String,
        field: String,
        reason: String,
    },

    /// A field value had a different shape than the policy asked for
    #[error("Unexpected value for {typename}.{field}: expected {expected}, found {actual}")]
    UnexpectedValue {
        typename: String,
        field: String,
        expected: String,
        actual: String,
    },

    /// Read policies called each other too deeply, usually a policy reading itself
    #[error("Read policies nested deeper than {depth} while resolving {typename}.{field}")]
    RecursionLimit {
        typename: String,
        field: String,
        depth: usize,
    },
}

impl PolicyError {
    /// Check if this error came from a read policy
    pub fn is_read_error(&self) -> bool {
        matches!(
            self,
            PolicyError::ReadFailed { .. } | PolicyError::RecursionLimit { .. }
        )
    }

    /// Check if this error came from a merge policy
    pub fn is_merge_error(&self) -> bool {
        matches!(self, PolicyError::MergeFailed { .. })
    }

    /// Check if this error is related to type mismatches
    pub fn is_type_error(&self) -> bool {
        matches!(self, PolicyError::UnexpectedValue { .. })
    }

    /// Get the `(typename, field)` the failing policy is registered for
    pub fn location(&self) -> (&str, &str) {
        match self {
            PolicyError::ReadFailed { typename, field, .. }
            | PolicyError::MergeFailed { typename, field, .. }
            | PolicyError::UnexpectedValue { typename, field, .. }
            | PolicyError::RecursionLimit { typename, field, .. } => (typename, field),
        }
    }
}

// Conversion from PolicyError to the main Error type
impl From<PolicyError> for crate::Error {
    fn from(err: PolicyError) -> Self {
        crate::Error::Policy(err)
    }
}
