use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

/// Errors produced while handling a single proxy request.
///
/// Every variant is request-local. Client errors carry their cause in the
/// response body; upstream failures answer with a generic message and keep
/// the details in the log.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Missing {0} parameter")]
    MissingParameter(&'static str),

    #[error("Invalid target URL: {0}")]
    InvalidTargetUrl(String),

    #[error("Target not allowed: {0}")]
    TargetForbidden(String),

    #[error("Upstream request failed: {0}")]
    UpstreamUnavailable(#[from] reqwest::Error),

    #[error("Upstream request timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Failed to decode playlist: {0}")]
    DecodeError(#[from] std::string::FromUtf8Error),

    /// The relay broke after the response head was sent. Surfaces only as a
    /// body stream error, which aborts the client connection.
    #[error("Upstream stream interrupted: {0}")]
    MidStreamFailure(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingParameter(_) | ProxyError::InvalidTargetUrl(_) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::TargetForbidden(_) => StatusCode::FORBIDDEN,
            ProxyError::UpstreamUnavailable(_)
            | ProxyError::UpstreamTimeout(_)
            | ProxyError::DecodeError(_)
            | ProxyError::MidStreamFailure(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Text sent to the client. Upstream internals never leave the process.
    fn public_message(&self) -> String {
        match self {
            ProxyError::DecodeError(_) => "Failed to decode playlist".to_string(),
            ProxyError::UpstreamUnavailable(_)
            | ProxyError::UpstreamTimeout(_)
            | ProxyError::MidStreamFailure(_) => "Upstream request failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("Rejected request: {}", self);
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{}\n", self.public_message()),
        )
            .into_response()
    }
}
