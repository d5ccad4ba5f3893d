//! The integrator-facing capability surface.
//!
//! An inline algorithm is anything implementing [`InlineAlgorithm`]: a
//! required per-tile [`detect`](InlineAlgorithm::detect) step plus optional
//! lifecycle notifications that default to no-ops.
//!
//! # Example
//!
//! ```ignore
//! use async_trait::async_trait;
//! use inline_algo::{AlgorithmError, Detection, InlineAlgorithm, TileSubmitted};
//!
//! struct Fixed;
//!
//! #[async_trait]
//! impl InlineAlgorithm for Fixed {
//!     async fn detect(&self, _tile: &TileSubmitted) -> Result<Vec<Detection>, AlgorithmError> {
//!         Ok(vec![Detection::new(1.0, 2.0, 1, "test_output")])
//!     }
//! }
//! ```

pub mod threshold;

use async_trait::async_trait;
use serde::de::Deserializer;
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::AlgorithmError;
use crate::scan::{ScanAbort, ScanEnd, ScanStart, TileSubmitted};

pub use threshold::{ThresholdDetector, ThresholdSettings};

// =============================================================================
// Detection
// =============================================================================

/// A single finding within a tile.
///
/// Serialized as the 4-element array `[x, y, class_id, label]`. Whole-number
/// coordinates are written as JSON integers so pixel positions stay integral
/// for downstream consumers. NaN or infinite coordinates fail to serialize,
/// which makes forwarding the tile fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Horizontal position within the tile, in pixels
    pub x: f64,

    /// Vertical position within the tile, in pixels
    pub y: f64,

    /// Class or confidence bucket
    pub class_id: i64,

    pub label: String,
}

impl Detection {
    pub fn new(x: f64, y: f64, class_id: i64, label: impl Into<String>) -> Self {
        Self {
            x,
            y,
            class_id,
            label: label.into(),
        }
    }
}

impl Serialize for Detection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(4)?;
        tuple.serialize_element(&Coordinate(self.x))?;
        tuple.serialize_element(&Coordinate(self.y))?;
        tuple.serialize_element(&self.class_id)?;
        tuple.serialize_element(&self.label)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Detection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (x, y, class_id, label) = <(f64, f64, i64, String)>::deserialize(deserializer)?;
        Ok(Detection {
            x,
            y,
            class_id,
            label,
        })
    }
}

struct Coordinate(f64);

impl Serialize for Coordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self.0;
        if !value.is_finite() {
            return Err(serde::ser::Error::custom(format!(
                "detection coordinate must be finite, got {}",
                value
            )));
        }
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            serializer.serialize_i64(value as i64)
        } else {
            serializer.serialize_f64(value)
        }
    }
}

// =============================================================================
// Capability Trait
// =============================================================================

/// Pluggable detection logic run by the dispatcher.
///
/// Every method runs on the single dispatch worker, one event at a time, so
/// a slow `detect` delays every event queued behind it. No timeout is
/// imposed. Any `Err` returned from any hook is fatal to the dispatcher;
/// integrators who want per-tile isolation must recover inside the hook.
///
/// CPU-heavy work should be moved off the async runtime with
/// `tokio::task::spawn_blocking`.
#[async_trait]
pub trait InlineAlgorithm: Send + Sync + 'static {
    /// Run detection on one submitted tile. An empty result is valid.
    async fn detect(&self, tile: &TileSubmitted) -> Result<Vec<Detection>, AlgorithmError>;

    /// Called after the session has been populated for a new scan.
    async fn on_scan_start(&self, _event: &ScanStart) -> Result<(), AlgorithmError> {
        Ok(())
    }

    /// Called after the completion payload has been forwarded.
    async fn on_scan_end(&self, _event: &ScanEnd) -> Result<(), AlgorithmError> {
        Ok(())
    }

    /// Called after the session has been cleared by an abort.
    async fn on_scan_abort(&self, _event: &ScanAbort) -> Result<(), AlgorithmError> {
        Ok(())
    }

    /// Called once the inbound server is about to accept requests.
    async fn on_server_start(&self) -> Result<(), AlgorithmError> {
        Ok(())
    }

    /// Called after the inbound server has shut down.
    async fn on_server_end(&self) -> Result<(), AlgorithmError> {
        Ok(())
    }
}
