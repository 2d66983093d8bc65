use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;

use crate::providers::utils::{ContextLengthExceededError, HttpStatusError};

/// Errors attached to a single tool request or tool response inside a message.
///
/// These travel with the conversation (they are serializable) so that a model
/// emitting a bad tool call is recorded rather than lost.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// The external collaborators a turn depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Generation,
    Grading,
    DocumentStore,
    Embedding,
}

/// Failures surfaced to the caller of a turn.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid turn input: {0}")]
    InvalidInput(String),

    #[error("Service unavailable ({service}): {message}")]
    ServiceUnavailable { service: Service, message: String },

    #[error("Context length exceeded ({service}): {message}")]
    ContextLengthExceeded { service: Service, message: String },

    #[error("Service timed out ({service}) after {millis}ms")]
    Timeout { service: Service, millis: u64 },

    #[error("Malformed grading verdict: {0}")]
    MalformedVerdict(String),

    #[error("Malformed tool call: {0}")]
    MalformedToolCall(String),

    #[error("Could not resolve after {rewrites} rewrites")]
    UnboundedRewriteLoop { rewrites: usize },
}

impl RagError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        RagError::Configuration(message.into())
    }

    pub fn unavailable(service: Service, err: impl std::fmt::Display) -> Self {
        RagError::ServiceUnavailable {
            service,
            message: err.to_string(),
        }
    }

    /// Classify a failed provider call. Rejected credentials, unknown models and
    /// other client errors are configuration problems; rate limits, server
    /// errors and transport failures are transient.
    pub fn from_provider(service: Service, err: anyhow::Error) -> Self {
        if let Some(overflow) = err.downcast_ref::<ContextLengthExceededError>() {
            return RagError::ContextLengthExceeded {
                service,
                message: overflow.0.clone(),
            };
        }
        match err.downcast_ref::<HttpStatusError>() {
            Some(status) if !status.is_transient() => RagError::Configuration(format!(
                "{} endpoint rejected the request: {}",
                service, status
            )),
            _ => RagError::unavailable(service, err),
        }
    }

    /// Whether a caller may reasonably retry the whole turn.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::ServiceUnavailable { .. } | RagError::Timeout { .. }
        )
    }
}

pub type RagResult<T> = Result<T, RagError>;
