use std::error::Error as StdError;

use thiserror::Error;

/// Failure raised by an integrator-supplied algorithm hook.
///
/// The core never inspects or recovers from these; any `AlgorithmError`
/// reaching the dispatcher terminates it.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AlgorithmError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl AlgorithmError {
    /// Create an error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors produced while delivering a payload to the downstream service.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Network failure, connection refusal or timeout
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Downstream URL could not be built from the configured base
    #[error("invalid downstream url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ForwardError {
    /// Whether the failure was the request exceeding its timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ForwardError::Request { source, .. } if source.is_timeout())
    }
}

/// Which integrator hook raised an [`AlgorithmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    ScanStart,
    Detect,
    ScanEnd,
    ScanAbort,
}

impl std::fmt::Display for HookStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HookStage::ScanStart => "on_scan_start",
            HookStage::Detect => "detect",
            HookStage::ScanEnd => "on_scan_end",
            HookStage::ScanAbort => "on_scan_abort",
        };
        f.write_str(name)
    }
}

/// Fatal failures that terminate the dispatch loop.
///
/// There is no recoverable variant: every error here sets the process-wide
/// error signal and stops the worker.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A tile or end event arrived while no scan was active
    #[error("{event} event for slide '{slide_name}' received with no active scan")]
    NoActiveScan {
        event: &'static str,
        slide_name: String,
    },

    /// An integrator hook failed
    #[error("{stage} hook failed: {source}")]
    Algorithm {
        stage: HookStage,
        #[source]
        source: AlgorithmError,
    },

    /// The downstream service could not be reached
    #[error("forwarding failed: {0}")]
    Forward(#[from] ForwardError),
}

impl DispatchError {
    pub(crate) fn hook(stage: HookStage, source: AlgorithmError) -> Self {
        DispatchError::Algorithm { stage, source }
    }
}
