//! Error types for query shapes and result trees.

use thiserror::Error;

/// Structured error types for normalizing and reading result trees.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum QueryError {
    /// A value where the shape requires an object
    #[error("Expected an object at '{path}', found {actual}")]
    ExpectedObject { path: String, actual: String },

    /// A result object without a type discriminator while typenames are required
    #[error("Result object at '{path}' has no type discriminator")]
    MissingTypename { path: String },
}

impl QueryError {
    /// Check if this error is about the shape of the result tree
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            QueryError::ExpectedObject { .. } | QueryError::MissingTypename { .. }
        )
    }

    /// Get the result path associated with this error
    pub fn path(&self) -> &str {
        match self {
            QueryError::ExpectedObject { path, .. } | QueryError::MissingTypename { path } => path,
        }
    }
}

// Conversion from QueryError to the main Error type
impl From<QueryError> for crate::Error {
    fn from(err: QueryError) -> Self {
        crate::Error::Query(err)
    }
}
