// ABOUTME: Error taxonomy shared by the dispatch, waiter, and HTTP layers
// ABOUTME: Every failure is scoped to the call that produced it; none is process-fatal

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid or missing argument: {field}")]
    InvalidArguments { field: &'static str },

    #[error("access denied by allow-list")]
    PermissionDenied,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out waiting for a reply")]
    Timeout,

    #[error("chat platform error: {0}")]
    Upstream(String),

    #[error("rate limit exceeded, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("invalid or missing API key")]
    Unauthorized,
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Wrap a chat-client fault, preserving the full cause chain for diagnostics.
    pub fn upstream(err: anyhow::Error) -> Self {
        Self::Upstream(format!("{err:#}"))
    }

    /// Stable machine-readable tag for wire payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::Timeout => "timeout",
            Self::Upstream(_) => "upstream_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unauthorized => "unauthorized",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownTool(_) => StatusCode::NOT_FOUND,
            Self::InvalidArguments { .. } => StatusCode::BAD_REQUEST,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Upstream(format!("serialization failed: {err}"))
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        });
        if let Self::RateLimited { retry_after } = &self {
            body["error"]["retry_after_secs"] = json!(retry_after.as_secs());
            return (
                self.status(),
                [(header::RETRY_AFTER, retry_after.as_secs().to_string())],
                Json(body),
            )
                .into_response();
        }
        (self.status(), Json(body)).into_response()
    }
}
