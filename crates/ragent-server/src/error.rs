use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ragent::errors::RagError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// A failed turn or search, reported as JSON with a status that reflects its cause
#[derive(Debug)]
pub struct ApiError(pub RagError);

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RagError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RagError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RagError::MalformedVerdict(_) | RagError::MalformedToolCall(_) => {
                StatusCode::BAD_GATEWAY
            }
            RagError::ContextLengthExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RagError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RagError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RagError::UnboundedRewriteLoop { .. } => StatusCode::LOOP_DETECTED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = Json(json!({
            "error": self.0.to_string(),
            "retryable": self.0.is_retryable(),
        }));
        (status, body).into_response()
    }
}
