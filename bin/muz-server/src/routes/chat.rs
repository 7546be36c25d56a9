//! Streaming chat relay (`POST /api/chat`).
//!
//! Validates the request, opens exactly one streaming call to the gateway and
//! hands the upstream body to the client as `text/event-stream`. Nothing is
//! retried: a live completion stream cannot be replayed, so a failed call is
//! reported and the user resends.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::gateway::{GatewayReply, UpstreamRequest};
use crate::relay::RelayStream;
use crate::schemas::chat::{ChatRelayRequest, ErrorResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(relay_chat),
    components(schemas(ChatRelayRequest, ErrorResponse))
)]
pub struct ChatApi;

/// Register chat routes (nested under `/api`).
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(relay_chat))
}

/// Relay a chat completion (`POST /api/chat`).
///
/// On success the response is the gateway's SSE stream, forwarded chunk by
/// chunk: `data: <json>\n\n` records terminated by `data: [DONE]`.
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "chat",
    request_body = ChatRelayRequest,
    responses(
        (status = 200, description = "Completion stream", body = String, content_type = "text/event-stream"),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 413, description = "Request body too large", body = ErrorResponse),
        (status = 502, description = "Gateway unreachable", body = ErrorResponse),
        (status = 503, description = "Gateway credential not configured", body = ErrorResponse),
    )
)]
pub async fn relay_chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRelayRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let Json(req) = payload.map_err(|e| match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ServerError::PayloadTooLarge(e.body_text()),
        _ => ServerError::InvalidRequest(e.body_text()),
    })?;
    let req = req.checked()?;

    info!(model = %req.model, message_count = req.messages.len(), "relaying chat request");

    let gateway = state.gateway.as_ref().ok_or_else(|| {
        ServerError::BackendNotReady("upstream credential is not configured".into())
    })?;

    match gateway.open(UpstreamRequest::streaming(req.model, req.messages)).await? {
        GatewayReply::Rejected { status, body } => {
            warn!(status = status.as_u16(), body = %body, "gateway rejected request");
            Err(ServerError::UpstreamRejected { status, body })
        }
        GatewayReply::Streaming(upstream) => {
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::CONNECTION, "keep-alive")
                // Disable reverse-proxy buffering (nginx).
                .header("x-accel-buffering", "no")
                .body(Body::from_stream(RelayStream::new(upstream)))
                .map_err(|e| ServerError::Internal(format!("failed to build SSE response: {e}")))
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
