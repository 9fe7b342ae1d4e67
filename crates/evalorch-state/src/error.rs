//! Error types for evalorch-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the backing database.
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by [`crate::AsyncCorrelationStore`] implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No live context is stored for the invocation id (never issued,
    /// already consumed, or expired).
    #[error("async context not found for invocation {invocation_id}")]
    ContextNotFound { invocation_id: String },

    /// A context is already stored for the invocation id.
    #[error("async context already exists for invocation {invocation_id}")]
    ContextExists { invocation_id: String },

    /// Invocation ids are string-encoded integers.
    #[error("invalid invocation id: {raw:?}")]
    InvalidInvocationId { raw: String },

    /// Encoding or decoding a stored column failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The backend rejected the operation.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_not_found_display_names_invocation() {
        let err = StorageError::ContextNotFound {
            invocation_id: "42".to_string(),
        };
        assert_eq!(err.to_string(), "async context not found for invocation 42");
    }

    #[test]
    fn test_serde_error_maps_to_serialization() {
        let err: StorageError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
