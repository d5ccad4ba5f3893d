//! Router configuration for the scanner-facing API.
//!
//! # Route Structure
//!
//! ```text
//! /health                 GET   - Health check
//! /v1/scan/start          PUT   - Begin a scan
//! /v1/scan/image-tile     POST  - Submit a tile
//! /v1/scan/end            PUT   - Finish a scan
//! /v1/scan/abort          PUT   - Abandon a scan
//! ```
//!
//! # Example
//!
//! ```ignore
//! use inline_algo::server::{create_router, AppState, RouterConfig};
//! use inline_algo::{event_queue, ErrorSignal};
//!
//! let (events, receiver) = event_queue();
//! let router = create_router(AppState::new(events, ErrorSignal::new()), RouterConfig::default());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    routing::{get, post, put},
    Router,
};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_handler, image_tile_handler, scan_abort_handler, scan_end_handler, scan_start_handler,
    AppState,
};

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
        }
    }
}

impl RouterConfig {
    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the scanner-facing router.
pub fn create_router(state: AppState, config: RouterConfig) -> Router {
    let cors = build_cors_layer(&config);

    let scan_routes = Router::new()
        .route("/start", put(scan_start_handler))
        .route("/image-tile", post(image_tile_handler))
        .route("/end", put(scan_end_handler))
        .route("/abort", put(scan_abort_handler));

    let router = Router::new()
        .nest("/v1/scan", scan_routes)
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}
