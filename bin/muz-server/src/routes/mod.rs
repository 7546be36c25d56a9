//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (body limit, CORS, per-request trace-ID injection)
//! - Optional Swagger UI and OpenAPI document (disable with `MUZ_ENABLE_SWAGGER=false`)
//! - Health route
//! - The `/api/chat` streaming relay

mod chat;
pub mod doc;
mod health;

use axum::{extract::DefaultBodyLimit, middleware, Router};
use crate::middleware::{cors, trace};
use crate::state::AppState;
use std::sync::Arc;
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .nest("/api", chat::router());

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app
        .layer(DefaultBodyLimit::max(state.config.body_limit_bytes))
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(state.clone())))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            trace::trace_middleware,
        ))
        .with_state(state)
}
