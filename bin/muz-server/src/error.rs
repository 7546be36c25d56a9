//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are converted to a JSON
//! `{error, details?}` body with an appropriate status code.
//!
//! Upstream rejections are the exception to the "don't leak internals" rule:
//! the gateway's status and body are passed through unchanged so the caller
//! sees exactly why the model refused the request.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use muz_types::ErrorBody;
use thiserror::Error;
use tracing::{error, warn};

use crate::gateway::GatewayError;

/// Headline returned for every validation failure.
pub const INVALID_REQUEST: &str =
    "Invalid request. Required: model (string) and messages (array)";

/// All errors that can occur in the muz-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The caller sent an invalid or malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request body exceeds the configured size limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// The gateway answered with a non-success status.
    #[error("upstream gateway error: {status}")]
    UpstreamRejected { status: StatusCode, body: String },

    /// The gateway could not be reached at all.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The relay is not configured to talk to the gateway.
    #[error("backend not ready: {0}")]
    BackendNotReady(String),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ServerError::InvalidRequest(details) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new(INVALID_REQUEST).with_details(details),
            ),
            ServerError::PayloadTooLarge(details) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody::new("request body too large").with_details(details),
            ),
            ServerError::UpstreamRejected { status, body } => (
                status,
                ErrorBody::new(format!("upstream gateway error: {}", status.as_u16()))
                    .with_details(body),
            ),
            ServerError::Gateway(e) => {
                warn!(error = %e, "gateway unreachable");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorBody::new("upstream gateway unreachable").with_details(e.to_string()),
                )
            }
            ServerError::BackendNotReady(m) => (StatusCode::SERVICE_UNAVAILABLE, ErrorBody::new(m)),
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("internal server error"),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
