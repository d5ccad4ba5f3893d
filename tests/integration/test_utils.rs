//! Test utilities for integration tests.
//!
//! This module provides a scripted algorithm, a recording result sink, event
//! builders and helpers for running real downstream servers on loopback.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use url::Url;

use inline_algo::{
    create_receiver_router, AlgorithmError, CompletionPayload, Detection, ForwardError,
    InlineAlgorithm, Received, ReceivedPayloads, ResultSink, ScanAbort, ScanEnd, ScanEvent,
    ScanStart, TileResultPayload, TileSubmitted,
};

// =============================================================================
// Event Builders
// =============================================================================

pub fn start(algorithm_id: &str, slide_name: &str) -> ScanEvent {
    ScanStart {
        algorithm_id: algorithm_id.to_string(),
        slide_name: slide_name.to_string(),
        stain_name: "H&E".to_string(),
        organ_name: "breast".to_string(),
        tile_width: 1912,
        tile_height: 1192,
        path_to_output: "/data/output".to_string(),
    }
    .into()
}

pub fn tile(slide_name: &str, tile_name: &str, row_idx: i64, col_idx: i64) -> ScanEvent {
    TileSubmitted {
        slide_name: slide_name.to_string(),
        tile_name: tile_name.to_string(),
        tile_image_path: format!("/data/tiles/{}", tile_name),
        row_idx,
        col_idx,
    }
    .into()
}

pub fn end(slide_name: &str) -> ScanEvent {
    ScanEnd {
        slide_name: slide_name.to_string(),
    }
    .into()
}

pub fn abort(slide_name: &str) -> ScanEvent {
    ScanAbort {
        slide_name: slide_name.to_string(),
    }
    .into()
}

// =============================================================================
// Scripted Algorithm
// =============================================================================

/// An algorithm whose detections are looked up by tile name.
///
/// Every hook invocation is appended to a call log such as
/// `"detect:t1"` or `"on_scan_start:a1/s1"`.
#[derive(Default)]
pub struct ScriptedAlgorithm {
    detections: HashMap<String, Vec<Detection>>,
    fail_on_tile: Option<String>,
    fail_on_scan_start: bool,
    fail_on_scan_end: bool,
    fail_on_scan_abort: bool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detections(mut self, tile_name: &str, detections: Vec<Detection>) -> Self {
        self.detections.insert(tile_name.to_string(), detections);
        self
    }

    pub fn failing_on_tile(mut self, tile_name: &str) -> Self {
        self.fail_on_tile = Some(tile_name.to_string());
        self
    }

    pub fn failing_on_scan_start(mut self) -> Self {
        self.fail_on_scan_start = true;
        self
    }

    pub fn failing_on_scan_end(mut self) -> Self {
        self.fail_on_scan_end = true;
        self
    }

    pub fn failing_on_scan_abort(mut self) -> Self {
        self.fail_on_scan_abort = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl InlineAlgorithm for ScriptedAlgorithm {
    async fn detect(&self, tile: &TileSubmitted) -> Result<Vec<Detection>, AlgorithmError> {
        self.record(format!("detect:{}", tile.tile_name));

        if self.fail_on_tile.as_deref() == Some(tile.tile_name.as_str()) {
            return Err(AlgorithmError::new(format!(
                "model crashed on {}",
                tile.tile_name
            )));
        }
        Ok(self
            .detections
            .get(&tile.tile_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn on_scan_start(&self, event: &ScanStart) -> Result<(), AlgorithmError> {
        self.record(format!(
            "on_scan_start:{}/{}",
            event.algorithm_id, event.slide_name
        ));
        if self.fail_on_scan_start {
            return Err(AlgorithmError::new("could not load model"));
        }
        Ok(())
    }

    async fn on_scan_end(&self, event: &ScanEnd) -> Result<(), AlgorithmError> {
        self.record(format!("on_scan_end:{}", event.slide_name));
        if self.fail_on_scan_end {
            return Err(AlgorithmError::new("could not write scan report"));
        }
        Ok(())
    }

    async fn on_scan_abort(&self, event: &ScanAbort) -> Result<(), AlgorithmError> {
        self.record(format!("on_scan_abort:{}", event.slide_name));
        if self.fail_on_scan_abort {
            return Err(AlgorithmError::new("could not release scan resources"));
        }
        Ok(())
    }
}

// =============================================================================
// Recording Sink
// =============================================================================

/// A result sink that records payloads in memory instead of sending them.
#[derive(Clone, Default)]
pub struct RecordingSink {
    received: Arc<Mutex<Vec<Received>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
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
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn send_tile_result(&self, payload: &TileResultPayload) -> Result<(), ForwardError> {
        self.received
            .lock()
            .unwrap()
            .push(Received::TileResult(payload.clone()));
        Ok(())
    }

    async fn send_completion(&self, payload: &CompletionPayload) -> Result<(), ForwardError> {
        self.received
            .lock()
            .unwrap()
            .push(Received::Completion(payload.clone()));
        Ok(())
    }
}

// =============================================================================
// Loopback Servers
// =============================================================================

/// Serve `router` on an ephemeral loopback port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub fn base_url(addr: SocketAddr) -> Url {
    Url::parse(&format!("http://{}", addr)).unwrap()
}

/// Start a well-behaved downstream aggregation service.
pub async fn spawn_receiver() -> (Url, ReceivedPayloads) {
    let store = ReceivedPayloads::new();
    let addr = serve(create_receiver_router(store.clone())).await;
    (base_url(addr), store)
}

/// Start a downstream that records each request on arrival, then stalls
/// for `delay` before answering.
pub async fn spawn_stalling_receiver(delay: Duration) -> (Url, Arc<Mutex<Vec<String>>>) {
    let arrivals: Arc<Mutex<Vec<String>>> = Arc::default();

    async fn stall_tile(
        State((arrivals, delay)): State<(Arc<Mutex<Vec<String>>>, Duration)>,
        Json(payload): Json<TileResultPayload>,
    ) -> StatusCode {
        arrivals.lock().unwrap().push(payload.tile_name);
        tokio::time::sleep(delay).await;
        StatusCode::NO_CONTENT
    }

    async fn stall_completion(
        State((arrivals, delay)): State<(Arc<Mutex<Vec<String>>>, Duration)>,
        Json(payload): Json<CompletionPayload>,
    ) -> StatusCode {
        arrivals
            .lock()
            .unwrap()
            .push(format!("completed:{}", payload.slide_name));
        tokio::time::sleep(delay).await;
        StatusCode::NO_CONTENT
    }

    let router = Router::new()
        .route("/v1/tile-results", post(stall_tile))
        .route("/v1/algorithm-completed", post(stall_completion))
        .with_state((Arc::clone(&arrivals), delay));

    let addr = serve(router).await;
    (base_url(addr), arrivals)
}

/// Start a downstream that rejects every payload with 500.
pub async fn spawn_failing_receiver() -> Url {
    async fn reject() -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    let router = Router::new()
        .route("/v1/tile-results", post(reject))
        .route("/v1/algorithm-completed", post(reject));

    base_url(serve(router).await)
}

/// A loopback URL nothing is listening on.
pub async fn unreachable_url() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    base_url(addr)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
