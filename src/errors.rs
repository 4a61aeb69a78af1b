//! Errors produced while proxying a chat completion, and how they are rendered to clients.
//!
//! Every failure is turned into an OpenAI-style error body:
//!
//! ```json
//! {"error": {"message": "...", "type": "api_error", "code": "502"}}
//! ```
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tracing::{error, warn};

use crate::models::{ErrorBody, ErrorResponse};

/// Prefix applied to every `api_error` message.
pub const UPSTREAM_ERROR_PREFIX: &str = "Azure API Error: ";

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The request body was unusable (bad JSON, missing or invalid `messages`).
    #[error("{0}")]
    InvalidRequest(String),

    /// The requested model has no configured deployment.
    #[error("Model {0} is not supported")]
    UnsupportedModel(String),

    /// Upstream answered with a non-success status.
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    /// The upstream call failed before a response was received.
    #[error("{0}")]
    Transport(String),

    #[error("upstream request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Upstream answered 2xx with a body that isn't a JSON object.
    #[error("invalid response body from upstream: {0}")]
    InvalidUpstreamBody(String),

    #[error("Azure returned empty choices array")]
    EmptyChoices,

    /// Failure building the outbound request.
    #[error("{0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::UnsupportedModel(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { status, .. } => *status,
            Self::Transport(_)
            | Self::Timeout(_)
            | Self::InvalidUpstreamBody(_)
            | Self::EmptyChoices
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Validation errors are the caller's fault; everything else is an upstream failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::UnsupportedModel(_))
    }

    pub fn error_type(&self) -> &'static str {
        if self.is_validation() {
            "invalid_request_error"
        } else {
            "api_error"
        }
    }

    pub fn code(&self) -> Option<String> {
        match self {
            Self::InvalidRequest(_) => None,
            Self::UnsupportedModel(_) => Some("unsupported_model".to_string()),
            _ => Some(self.status().as_u16().to_string()),
        }
    }

    pub fn message(&self) -> String {
        if self.is_validation() {
            self.to_string()
        } else {
            format!("{UPSTREAM_ERROR_PREFIX}{self}")
        }
    }

    /// Log the error at a level matching whose fault it is.
    pub fn log(&self) {
        if self.is_validation() {
            warn!(status = %self.status(), "Rejected request: {}", self);
        } else {
            error!(status = %self.status(), "Upstream call failed: {}", self);
        }
    }

    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorBody {
                message: self.message(),
                r#type: self.error_type().to_string(),
                code: self.code(),
            },
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_body())).into_response()
    }
}
