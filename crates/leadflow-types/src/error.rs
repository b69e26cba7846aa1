use thiserror::Error;

/// Errors from repository operations (used by trait definitions in leadflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors raised while loading or validating a workflow definition.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("invalid step at position {position} ({step_type}): {message}")]
    InvalidStep {
        position: usize,
        step_type: String,
        message: String,
    },

    #[error("failed to parse workflow definition: {0}")]
    ParseError(String),
}

/// Errors from the email/SMS delivery capabilities.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Provider credentials are absent. This aborts the whole invocation.
    #[error("{provider} is not configured: {message}")]
    NotConfigured { provider: String, message: String },

    /// The provider rejected or failed the request.
    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },

    /// The request never reached the provider.
    #[error("transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// Whether this error should abort the invocation instead of failing a single step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeliveryError::NotConfigured { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_invalid_step_display() {
        let err = WorkflowError::InvalidStep {
            position: 2,
            step_type: "wait".to_string(),
            message: "value must be positive".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid step at position 2 (wait): value must be positive"
        );
    }

    #[test]
    fn test_delivery_error_fatality() {
        let missing = DeliveryError::NotConfigured {
            provider: "resend".to_string(),
            message: "RESEND_API_KEY is not set".to_string(),
        };
        let rejected = DeliveryError::Provider {
            provider: "twilio".to_string(),
            message: "invalid number".to_string(),
        };
        assert!(missing.is_fatal());
        assert!(!rejected.is_fatal());
        assert!(!DeliveryError::Transport("timeout".to_string()).is_fatal());
    }
}
