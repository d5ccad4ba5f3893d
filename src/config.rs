//! Configuration management for the inline algorithm service.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `INLINE_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Commands
//!
//! - `serve` - run the algorithm: accept scanner events and forward results
//! - `receive` - run a stand-in downstream aggregation service
//!
//! # Environment Variables
//!
//! - `INLINE_HOST` - Server bind address (default: 0.0.0.0)
//! - `INLINE_PORT` - Server port (default: 8000)
//! - `INLINE_CONTAINER_MODE` - Forward to host.docker.internal instead of localhost
//! - `INLINE_DOWNSTREAM_URL` - Explicit downstream base URL
//! - `INLINE_FORWARD_TIMEOUT_MS` - Outbound request timeout (default: 1000)
//! - `INLINE_THRESHOLD` - Detector luma threshold (default: 77)
//! - `INLINE_CORS_ORIGINS` - Comma-separated allowed browser origins
//! - `INLINE_RECEIVER_PORT` - Port for the `receive` command (default: 8001)

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::algorithm::threshold::{
    ThresholdSettings, DEFAULT_CLASS_ID, DEFAULT_HIGH_PERCENTILE, DEFAULT_LABEL,
    DEFAULT_LOW_PERCENTILE, DEFAULT_THRESHOLD,
};
use crate::forward::{ForwardTarget, DOWNSTREAM_PORT};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default port for the scanner-facing API.
pub const DEFAULT_PORT: u16 = 8000;

/// Default outbound request timeout in milliseconds.
pub const DEFAULT_FORWARD_TIMEOUT_MS: u64 = 1000;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Inline algorithm runner for slide scanners.
///
/// Receives scan lifecycle events, runs detection on every submitted tile
/// and forwards the results to the aggregation service.
#[derive(Parser, Debug, Clone)]
#[command(name = "inline-algo")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Accept scanner events and run the detector
    Serve(ServeConfig),

    /// Run a local stand-in for the downstream aggregation service
    Receive(ReceiveConfig),
}

/// Options for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "INLINE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "INLINE_PORT")]
    pub port: u16,

    // =========================================================================
    // Forwarding Configuration
    // =========================================================================
    /// Forward results to host.docker.internal (container deployment)
    /// instead of localhost.
    #[arg(long, default_value_t = false, env = "INLINE_CONTAINER_MODE")]
    pub container_mode: bool,

    /// Explicit downstream base URL. Overrides --container-mode.
    #[arg(long, env = "INLINE_DOWNSTREAM_URL")]
    pub downstream_url: Option<String>,

    /// Timeout for each outbound request, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_FORWARD_TIMEOUT_MS, env = "INLINE_FORWARD_TIMEOUT_MS")]
    pub forward_timeout_ms: u64,

    // =========================================================================
    // Detector Configuration
    // =========================================================================
    /// Pixels darker than this luma value (0-255) are candidate detections.
    #[arg(long, default_value_t = DEFAULT_THRESHOLD, env = "INLINE_THRESHOLD")]
    pub threshold: u8,

    /// Lower area percentile; smaller regions are discarded.
    #[arg(long, default_value_t = DEFAULT_LOW_PERCENTILE, env = "INLINE_LOW_PERCENTILE")]
    pub low_percentile: f64,

    /// Upper area percentile; larger regions are discarded.
    #[arg(long, default_value_t = DEFAULT_HIGH_PERCENTILE, env = "INLINE_HIGH_PERCENTILE")]
    pub high_percentile: f64,

    /// Class id attached to every detection.
    #[arg(long, default_value_t = DEFAULT_CLASS_ID, env = "INLINE_CLASS_ID")]
    pub class_id: i64,

    /// Label attached to every detection.
    #[arg(long, default_value = DEFAULT_LABEL, env = "INLINE_LABEL")]
    pub label: String,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Origins allowed to call the scan API from a browser (comma-separated).
    /// Any origin is allowed when unset.
    #[arg(long, value_delimiter = ',', env = "INLINE_CORS_ORIGINS")]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref url) = self.downstream_url {
            Url::parse(url).map_err(|e| format!("Invalid downstream URL '{}': {}", url, e))?;
        }

        if self.forward_timeout_ms == 0 {
            return Err("forward_timeout_ms must be greater than 0".to_string());
        }

        let in_range = |p: f64| (0.0..=100.0).contains(&p);
        if !in_range(self.low_percentile) || !in_range(self.high_percentile) {
            return Err("Percentiles must be between 0 and 100".to_string());
        }
        if self.low_percentile >= self.high_percentile {
            return Err("low_percentile must be below high_percentile".to_string());
        }

        if self.label.is_empty() {
            return Err("Detection label must not be empty".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve the downstream target. Call `validate()` first.
    pub fn forward_target(&self) -> Result<ForwardTarget, url::ParseError> {
        match self.downstream_url {
            Some(ref url) => Ok(ForwardTarget::Custom(Url::parse(url)?)),
            None => Ok(ForwardTarget::from_container_mode(self.container_mode)),
        }
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }

    pub fn threshold_settings(&self) -> ThresholdSettings {
        ThresholdSettings {
            threshold: self.threshold,
            low_percentile: self.low_percentile,
            high_percentile: self.high_percentile,
            class_id: self.class_id,
            label: self.label.clone(),
        }
    }
}

/// Options for the `receive` command.
#[derive(Args, Debug, Clone)]
pub struct ReceiveConfig {
    /// Host address to bind the receiver to.
    #[arg(long, default_value = DEFAULT_HOST, env = "INLINE_RECEIVER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DOWNSTREAM_PORT, env = "INLINE_RECEIVER_PORT")]
    pub port: u16,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ReceiveConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Tests
// =============================================================================
