//! Delivery of results to the downstream aggregation service.
//!
//! # Endpoints
//!
//! - `POST {base}/v1/tile-results` - one [`TileResultPayload`] per tile
//! - `POST {base}/v1/algorithm-completed` - one [`CompletionPayload`] per scan
//!
//! `{base}` is chosen once, at construction, by [`ForwardTarget`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::algorithm::Detection;
use crate::error::ForwardError;
use crate::scan::SessionSnapshot;

/// Port the aggregation service listens on in both deployment modes.
pub const DOWNSTREAM_PORT: u16 = 8001;

/// Downstream host when the algorithm runs inside a container.
pub const CONTAINER_HOST: &str = "host.docker.internal";

/// Downstream host when the algorithm runs directly on the scanner host.
pub const LOCAL_HOST: &str = "localhost";

/// Per-request timeout for outbound calls.
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(1);

pub const TILE_RESULTS_PATH: &str = "/v1/tile-results";
pub const ALGORITHM_COMPLETED_PATH: &str = "/v1/algorithm-completed";

// =============================================================================
// Payloads
// =============================================================================

/// Detections for a single tile, with the tile's grid position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileResults {
    pub detection_array: Vec<Detection>,
    pub row_idx: i64,
    pub col_idx: i64,
}

/// Body of `POST /v1/tile-results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileResultPayload {
    pub algorithm_id: String,
    pub slide_name: String,
    pub tile_name: String,
    pub results: TileResults,
}

impl TileResultPayload {
    /// Build the payload for one tile of the active scan.
    ///
    /// Both identifiers come from the session, not from the tile event.
    pub fn new(
        session: &SessionSnapshot,
        tile_name: impl Into<String>,
        row_idx: i64,
        col_idx: i64,
        detection_array: Vec<Detection>,
    ) -> Self {
        Self {
            algorithm_id: session.algorithm_id.clone(),
            slide_name: session.slide_name.clone(),
            tile_name: tile_name.into(),
            results: TileResults {
                detection_array,
                row_idx,
                col_idx,
            },
        }
    }
}

/// Body of `POST /v1/algorithm-completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionPayload {
    pub algorithm_id: String,
    pub slide_name: String,
}

impl From<SessionSnapshot> for CompletionPayload {
    fn from(session: SessionSnapshot) -> Self {
        Self {
            algorithm_id: session.algorithm_id,
            slide_name: session.slide_name,
        }
    }
}

// =============================================================================
// Sink Trait
// =============================================================================

/// Destination for results produced by the dispatcher.
///
/// Each payload is handed over exactly once. An `Err` is fatal to the
/// dispatcher; implementations must not retry internally.
#[async_trait]
pub trait ResultSink: Send + Sync + 'static {
    async fn send_tile_result(&self, payload: &TileResultPayload) -> Result<(), ForwardError>;

    async fn send_completion(&self, payload: &CompletionPayload) -> Result<(), ForwardError>;
}

// =============================================================================
// HTTP Forwarder
// =============================================================================

/// Where the downstream service lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardTarget {
    /// `http://host.docker.internal:8001`
    Container,

    /// `http://localhost:8001`
    Local,

    /// An explicit base URL
    Custom(Url),
}

impl ForwardTarget {
    /// Select the target from the container-mode switch.
    pub fn from_container_mode(container_mode: bool) -> Self {
        if container_mode {
            ForwardTarget::Container
        } else {
            ForwardTarget::Local
        }
    }

    /// Base URL all endpoint paths are joined onto.
    pub fn base_url(&self) -> Result<Url, ForwardError> {
        let url = match self {
            ForwardTarget::Container => {
                Url::parse(&format!("http://{}:{}", CONTAINER_HOST, DOWNSTREAM_PORT))?
            }
            ForwardTarget::Local => {
                Url::parse(&format!("http://{}:{}", LOCAL_HOST, DOWNSTREAM_PORT))?
            }
            ForwardTarget::Custom(url) => url.clone(),
        };
        Ok(url)
    }
}

/// [`ResultSink`] that POSTs JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    tile_results_url: Url,
    completed_url: Url,
}

impl HttpForwarder {
    /// Create a forwarder with the default one-second timeout.
    pub fn new(target: ForwardTarget) -> Result<Self, ForwardError> {
        Self::with_timeout(target, DEFAULT_FORWARD_TIMEOUT)
    }

    /// Create a forwarder with a custom per-request timeout.
    pub fn with_timeout(target: ForwardTarget, timeout: Duration) -> Result<Self, ForwardError> {
        let base = target.base_url()?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ForwardError::Request {
                url: base.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            tile_results_url: endpoint_url(&base, TILE_RESULTS_PATH)?,
            completed_url: endpoint_url(&base, ALGORITHM_COMPLETED_PATH)?,
        })
    }

    pub fn tile_results_url(&self) -> &Url {
        &self.tile_results_url
    }

    pub fn completed_url(&self) -> &Url {
        &self.completed_url
    }

    async fn post<T: Serialize + Sync>(&self, url: &Url, body: &T) -> Result<(), ForwardError> {
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|source| ForwardError::Request {
                url: url.to_string(),
                source,
            })?;

        // Delivery is fire-and-forget past the transport layer: a rejected
        // payload is reported but does not stop the pipeline.
        let status = response.status();
        if status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Payload delivered");
        } else {
            warn!(url = %url, status = status.as_u16(), "Downstream rejected payload");
        }
        Ok(())
    }
}

/// Append `path` to the base URL's own path, keeping any prefix such as
/// `http://gateway/aggregator`.
fn endpoint_url(base: &Url, path: &str) -> Result<Url, ForwardError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(path.trim_start_matches('/').split('/'));
    Ok(url)
}

#[async_trait]
impl ResultSink for HttpForwarder {
    async fn send_tile_result(&self, payload: &TileResultPayload) -> Result<(), ForwardError> {
        self.post(&self.tile_results_url, payload).await
    }

    async fn send_completion(&self, payload: &CompletionPayload) -> Result<(), ForwardError> {
        self.post(&self.completed_url, payload).await
    }
}
