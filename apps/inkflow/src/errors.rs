use serde::Serialize;
use thiserror::Error;

use crate::llm_client::GenerationError;
use crate::store::StoreError;

/// Crate-level error type surfaced to the host.
///
/// Layout never produces errors; everything here comes from generation or storage.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// What the host shows the user: a stable code plus a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
    pub retriable: bool,
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Generation(GenerationError::Capability(_)) => "CAPABILITY_UNAVAILABLE",
            AppError::Generation(GenerationError::Load(_)) => "LOAD_FAILED",
            AppError::Generation(GenerationError::NotReady) => "NOT_READY",
            AppError::Generation(GenerationError::Busy) => "BUSY",
            AppError::Generation(GenerationError::Stream(_)) => "STREAM_ERROR",
            AppError::Store(_) => "STORE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether calling the same operation again can succeed without other changes.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AppError::Generation(
                GenerationError::Load(_) | GenerationError::Busy | GenerationError::Stream(_)
            ) | AppError::Store(_)
        )
    }

    /// Logs the error and converts it into a user-facing report.
    ///
    /// Capability messages are passed through verbatim; internal details are not.
    pub fn report(&self) -> ErrorReport {
        let message = match self {
            AppError::Generation(GenerationError::Capability(msg)) => msg.clone(),
            AppError::Generation(e) => {
                tracing::error!("Generation error: {e}");
                format!("AI Error: {e}")
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {e}");
                "Settings could not be saved".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                "An internal error occurred".to_string()
            }
        };

        ErrorReport {
            code: self.code(),
            message,
            retriable: self.is_retriable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_message_is_verbatim() {
        let err = AppError::from(GenerationError::Capability(
            "No local model server is reachable".to_string(),
        ));
        let report = err.report();
        assert_eq!(report.code, "CAPABILITY_UNAVAILABLE");
        assert_eq!(report.message, "No local model server is reachable");
        assert!(!report.retriable);
    }

    #[test]
    fn test_load_error_is_retriable() {
        let err = AppError::from(GenerationError::Load("disk full".to_string()));
        assert_eq!(err.code(), "LOAD_FAILED");
        assert!(err.is_retriable());
        assert!(err.report().message.contains("disk full"));
    }

    #[test]
    fn test_not_ready_is_caller_error() {
        let err = AppError::from(GenerationError::NotReady);
        assert_eq!(err.code(), "NOT_READY");
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = AppError::from(anyhow::anyhow!("secret path /home/x"));
        let report = err.report();
        assert_eq!(report.code, "INTERNAL_ERROR");
        assert!(!report.message.contains("/home/x"));
    }
}
