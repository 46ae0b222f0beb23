//! Error types for the canvasgate server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use canvasgate_core::GateError;

/// Errors that can occur when building a router.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// No routes were configured.
    #[error("No routes configured. Call .route() or .gated_route() before .build()")]
    NoRoutes,
}

/// Errors that can occur in the canvasgate server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The pipeline rejected the request or one of its collaborators failed.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// Invalid request from client.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Gate(e) => gate_status(e),
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable kind reported in the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Gate(e) => e.kind(),
            ServerError::InvalidRequest(_) => "request",
            ServerError::Internal(_) => "internal",
        }
    }
}

fn gate_status(error: &GateError) -> StatusCode {
    match error {
        GateError::Context(_) => StatusCode::BAD_REQUEST,
        GateError::Authorization(_) => StatusCode::UNAUTHORIZED,
        GateError::Permission { .. } | GateError::Role => StatusCode::FORBIDDEN,
        GateError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        GateError::Verification(_) => StatusCode::BAD_REQUEST,
        GateError::Transport(_) => StatusCode::BAD_GATEWAY,
        GateError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let ServerError::Gate(e) = &self {
            if e.is_fatal() {
                log::error!("Route misconfigured: {}", e);
            }
        }

        let mut body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "code": status.as_u16(),
        });
        if let ServerError::Gate(GateError::Permission { missing }) = &self {
            body["missing"] = serde_json::json!(missing);
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
