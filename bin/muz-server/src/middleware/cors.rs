use crate::state::AppState;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// CORS layer driven by `MUZ_CORS_ORIGINS`.
pub fn cors_layer(state: Arc<AppState>) -> CorsLayer {
    let Some(origins_str) = &state.config.cors_allowed_origins else {
        // Wildcard, suitable for development; set MUZ_CORS_ORIGINS in production.
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods(Any);
    };

    let origins: Vec<axum::http::HeaderValue> = origins_str
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    if origins.is_empty() {
        tracing::warn!(value = %origins_str, "MUZ_CORS_ORIGINS has no valid origins; allowing any");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods(Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_headers(Any)
            .allow_methods(Any)
    }
}
