//! Per-scan state carried between dispatcher iterations.

/// Identifiers of the scan currently in progress.
///
/// Owned by the dispatcher alone, so it needs no synchronization. Both fields
/// are set together by [`ScanSession::start`] and cleared together by
/// [`ScanSession::clear`]; there is no way to observe one without the other.
#[derive(Debug, Default)]
pub struct ScanSession {
    active: Option<SessionSnapshot>,
}

/// Copy of the active session's identifiers, used to build payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub algorithm_id: String,
    pub slide_name: String,
}

impl ScanSession {
    /// Create an idle session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a scan, replacing whatever scan was active.
    ///
    /// No validation is performed: a second start before an end or abort
    /// silently takes over the session.
    pub fn start(&mut self, algorithm_id: impl Into<String>, slide_name: impl Into<String>) {
        self.active = Some(SessionSnapshot {
            algorithm_id: algorithm_id.into(),
            slide_name: slide_name.into(),
        });
    }

    /// Return to idle.
    pub fn clear(&mut self) {
        self.active = None;
    }

    /// Identifiers of the active scan, or `None` while idle.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.active.clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn algorithm_id(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.algorithm_id.as_str())
    }

    pub fn slide_name(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.slide_name.as_str())
    }
}
