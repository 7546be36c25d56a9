//! Shared application state injected into every Axum handler.
//!
//! Immutable after startup: the relay keeps no per-request state here, so any
//! number of instances can serve the same clients.

use std::sync::Arc;

use crate::config::Config;
use crate::gateway::Gateway;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Upstream gateway; `None` when no credential is configured.
    pub gateway: Option<Arc<dyn Gateway>>,
}
