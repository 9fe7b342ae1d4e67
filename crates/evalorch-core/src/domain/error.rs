//! Domain-level error taxonomy for evalorch.

use evalorch_state::StorageError;

/// Orchestration errors.
///
/// Per-item batch failures are not represented here; they are carried as
/// [`RunError`](crate::domain::RunError) values at their index.
#[derive(Debug, thiserror::Error)]
pub enum EvalOrchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The callback could not be attributed to an issued invocation, either
    /// because it was never issued, was already handled, or expired.
    #[error("async context not found for invocation {invocation_id}")]
    ContextNotFound { invocation_id: String },

    /// A collaborator returned an error. The original error is kept as the
    /// source so callers can inspect or downcast it.
    #[error("{collaborator} failed: {source}")]
    Downstream {
        collaborator: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EvalOrchError {
    pub(crate) fn downstream(collaborator: &'static str, source: anyhow::Error) -> Self {
        EvalOrchError::Downstream {
            collaborator,
            source,
        }
    }

    /// True for errors a caller should treat as "already handled / unknown id"
    /// rather than as transient.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EvalOrchError::ContextNotFound { .. })
    }
}

/// Result type for evalorch domain operations.
pub type Result<T> = std::result::Result<T, EvalOrchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evalorch_error_display() {
        let err = EvalOrchError::InvalidInput("workspace_id must be positive".to_string());
        assert!(err.to_string().contains("invalid input"));

        let err = EvalOrchError::ContextNotFound {
            invocation_id: "42".to_string(),
        };
        assert!(err.to_string().contains("42"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_downstream_keeps_source() {
        #[derive(Debug, thiserror::Error)]
        #[error("rpc timeout")]
        struct RpcTimeout;

        let err = EvalOrchError::downstream("target_execution", anyhow::Error::new(RpcTimeout));
        assert_eq!(err.to_string(), "target_execution failed: rpc timeout");
        assert!(!err.is_not_found());

        match err {
            EvalOrchError::Downstream { source, .. } => {
                assert!(source.downcast_ref::<RpcTimeout>().is_some());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_storage_error_converts() {
        let err: EvalOrchError = StorageError::Backend("disk full".to_string()).into();
        assert!(err.to_string().contains("disk full"));
    }
}
