//! # Inline Algo
//!
//! Runs a custom detection algorithm inline with a slide scanner.
//!
//! The scanner (or a simulator) streams scan lifecycle events over HTTP:
//! scan start, one request per acquired tile, scan end or abort. Each event
//! is queued and handled by a single dispatcher, which runs the pluggable
//! detector on every tile and forwards the results to a downstream
//! aggregation service.
//!
//! ## Architecture
//!
//! ```text
//! scanner ──▶ server ──▶ EventQueue ──▶ Dispatcher ──▶ ResultSink ──▶ aggregation service
//!                                          │    ▲
//!                                          ▼    │
//!                                   InlineAlgorithm (detect + lifecycle hooks)
//! ```
//!
//! - [`scan`] - event types, the event queue and per-scan session state
//! - [`algorithm`] - the integrator capability trait and a reference detector
//! - [`forward`] - outbound payloads and the HTTP forwarder
//! - [`dispatch`] - the single-consumer dispatch loop
//! - [`signal`] - the process-wide failure flag
//! - [`server`] - Axum routes producing events
//! - [`downstream`] - a stand-in aggregation service
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use inline_algo::{
//!     create_router, event_queue, spawn_dispatcher, AppState, ErrorSignal, ForwardTarget,
//!     HttpForwarder, RouterConfig, ThresholdDetector,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (events, receiver) = event_queue();
//!     let error_signal = ErrorSignal::new();
//!     let forwarder = HttpForwarder::new(ForwardTarget::Local)?;
//!
//!     spawn_dispatcher(
//!         receiver,
//!         Arc::new(ThresholdDetector::default()),
//!         forwarder,
//!         error_signal.clone(),
//!     );
//!
//!     let router = create_router(AppState::new(events, error_signal), RouterConfig::default());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod algorithm;
pub mod config;
pub mod dispatch;
pub mod downstream;
pub mod error;
pub mod forward;
pub mod scan;
pub mod server;
pub mod signal;

// Re-export commonly used types
pub use algorithm::{Detection, InlineAlgorithm, ThresholdDetector, ThresholdSettings};
pub use config::{Cli, Command, ReceiveConfig, ServeConfig};
pub use dispatch::{spawn_dispatcher, DispatchState, Dispatcher};
pub use downstream::{create_receiver_router, Received, ReceivedPayloads};
pub use error::{AlgorithmError, DispatchError, ForwardError, HookStage};
pub use forward::{
    CompletionPayload, ForwardTarget, HttpForwarder, ResultSink, TileResultPayload, TileResults,
    DEFAULT_FORWARD_TIMEOUT,
};
pub use scan::{
    event_queue, EventReceiver, EventSender, QueueClosed, ScanAbort, ScanEnd, ScanEvent,
    ScanSession, ScanStart, SessionSnapshot, TileSubmitted,
};
pub use server::{create_router, AppState, HealthResponse, RouterConfig};
pub use signal::ErrorSignal;
