//! HTTP request handlers for the scanner-facing API.
//!
//! Each scan endpoint validates its JSON body, enqueues the matching
//! [`ScanEvent`](crate::scan::ScanEvent) and answers immediately; processing
//! happens later on the dispatcher.
//!
//! # Endpoints
//!
//! - `PUT /v1/scan/start` - begin a scan (`200 OK`)
//! - `POST /v1/scan/image-tile` - submit a tile (`202 Accepted`)
//! - `PUT /v1/scan/end` - finish a scan (`204 No Content`)
//! - `PUT /v1/scan/abort` - abandon a scan (`204 No Content`)
//! - `GET /health` - health check

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::{debug, warn};

use crate::scan::{EventSender, ScanAbort, ScanEnd, ScanEvent, ScanStart, TileSubmitted};
use crate::signal::ErrorSignal;

// =============================================================================
// Application State
// =============================================================================

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Producer side of the event queue
    pub events: EventSender,

    /// Raised once the dispatcher has died
    pub error_signal: ErrorSignal,
}

impl AppState {
    pub fn new(events: EventSender, error_signal: ErrorSignal) -> Self {
        Self {
            events,
            error_signal,
        }
    }

    /// Enqueue an event, reporting (but not surfacing) a dead dispatcher.
    ///
    /// Once the dispatcher has terminated, callers still receive their
    /// success status although the event will never be processed.
    fn submit(&self, event: impl Into<ScanEvent>) {
        let event = event.into();
        debug!(event = event.kind(), slide_name = %event.slide_name(), "Event received");

        if let Err(e) = self.events.enqueue(event) {
            warn!(error = %e, "Accepted event that will never be processed");
        } else if self.error_signal.is_set() {
            warn!("Dispatcher has failed; queued event will not be processed");
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy", or "degraded" once the dispatcher has failed
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle `PUT /v1/scan/start`.
pub async fn scan_start_handler(
    State(state): State<AppState>,
    Json(body): Json<ScanStart>,
) -> StatusCode {
    state.submit(body);
    StatusCode::OK
}

/// Handle `POST /v1/scan/image-tile`.
pub async fn image_tile_handler(
    State(state): State<AppState>,
    Json(body): Json<TileSubmitted>,
) -> StatusCode {
    state.submit(body);
    StatusCode::ACCEPTED
}

/// Handle `PUT /v1/scan/end`.
pub async fn scan_end_handler(
    State(state): State<AppState>,
    Json(body): Json<ScanEnd>,
) -> StatusCode {
    state.submit(body);
    StatusCode::NO_CONTENT
}

/// Handle `PUT /v1/scan/abort`.
pub async fn scan_abort_handler(
    State(state): State<AppState>,
    Json(body): Json<ScanAbort>,
) -> StatusCode {
    state.submit(body);
    StatusCode::NO_CONTENT
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.error_signal.is_set() {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
