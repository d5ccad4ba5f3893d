//! Stand-in for the downstream aggregation service.
//!
//! Accepts the payloads the forwarder emits, logs them and keeps them in
//! arrival order. Used by the `receive` command for local end-to-end runs and
//! by the integration tests as a real HTTP peer.

use std::sync::{Arc, Mutex};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::info;

use crate::forward::{
    CompletionPayload, TileResultPayload, ALGORITHM_COMPLETED_PATH, TILE_RESULTS_PATH,
};

/// A payload as received by the aggregation service.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    TileResult(TileResultPayload),
    Completion(CompletionPayload),
}

/// Shared, ordered record of received payloads.
#[derive(Debug, Clone, Default)]
pub struct ReceivedPayloads {
    inner: Arc<Mutex<Vec<Received>>>,
}

impl ReceivedPayloads {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, payload: Received) {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(payload);
    }

    /// Everything received so far, in arrival order.
    pub fn all(&self) -> Vec<Received> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn tile_results(&self) -> Vec<TileResultPayload> {
        self.all()
            .into_iter()
            .filter_map(|r| match r {
                Received::TileResult(p) => Some(p),
                Received::Completion(_) => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<CompletionPayload> {
        self.all()
            .into_iter()
            .filter_map(|r| match r {
                Received::Completion(p) => Some(p),
                Received::TileResult(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn tile_results_handler(
    State(store): State<ReceivedPayloads>,
    Json(payload): Json<TileResultPayload>,
) -> StatusCode {
    info!(
        algorithm_id = %payload.algorithm_id,
        slide_name = %payload.slide_name,
        tile_name = %payload.tile_name,
        row_idx = payload.results.row_idx,
        col_idx = payload.results.col_idx,
        detections = payload.results.detection_array.len(),
        "Tile results received"
    );
    store.push(Received::TileResult(payload));
    StatusCode::NO_CONTENT
}

async fn algorithm_completed_handler(
    State(store): State<ReceivedPayloads>,
    Json(payload): Json<CompletionPayload>,
) -> StatusCode {
    info!(
        algorithm_id = %payload.algorithm_id,
        slide_name = %payload.slide_name,
        "Algorithm completed"
    );
    store.push(Received::Completion(payload));
    StatusCode::NO_CONTENT
}

/// Create the aggregation service router backed by `store`.
pub fn create_receiver_router(store: ReceivedPayloads) -> Router {
    Router::new()
        .route(TILE_RESULTS_PATH, post(tile_results_handler))
        .route(ALGORITHM_COMPLETED_PATH, post(algorithm_completed_handler))
        .with_state(store)
}
