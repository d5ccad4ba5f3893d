//! The single consumer of the event queue.
//!
//! # State Machine
//!
//! ```text
//!            ScanStart                      ScanStart (overwrites)
//!   ┌──────┐ ─────────────────────▶ ┌────────┐ ◀──┐
//!   │ Idle │                         │ Active │ ───┘
//!   └──────┘ ◀───────────────────── └────────┘ ◀──┐ TileSubmitted
//!      │  ▲     ScanEnd / ScanAbort      └────────┘
//!      │  └── ScanAbort
//!      │
//!      └── TileSubmitted / ScanEnd ──▶ terminated (fatal)
//! ```
//!
//! Events are handled strictly one at a time in enqueue order. The first
//! failure of any kind raises the [`ErrorSignal`] and stops the loop; events
//! still in the queue are never processed.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::algorithm::InlineAlgorithm;
use crate::error::{DispatchError, HookStage};
use crate::forward::{CompletionPayload, ResultSink, TileResultPayload};
use crate::scan::{
    EventReceiver, ScanAbort, ScanEnd, ScanEvent, ScanSession, ScanStart, SessionSnapshot,
    TileSubmitted,
};
use crate::signal::ErrorSignal;

/// Whether a scan is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Active,
}

/// Drains the event queue, runs the algorithm and forwards its results.
pub struct Dispatcher<A, F> {
    receiver: EventReceiver,
    session: ScanSession,
    algorithm: Arc<A>,
    sink: F,
    error_signal: ErrorSignal,
}

impl<A, F> Dispatcher<A, F>
where
    A: InlineAlgorithm,
    F: ResultSink,
{
    pub fn new(
        receiver: EventReceiver,
        algorithm: Arc<A>,
        sink: F,
        error_signal: ErrorSignal,
    ) -> Self {
        Self {
            receiver,
            session: ScanSession::new(),
            algorithm,
            sink,
            error_signal,
        }
    }

    pub fn state(&self) -> DispatchState {
        if self.session.is_active() {
            DispatchState::Active
        } else {
            DispatchState::Idle
        }
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    /// Process events until the queue closes or a fatal error occurs.
    ///
    /// A closed queue (every sender dropped) ends the loop with `Ok`. Any
    /// error raises the error signal before being returned.
    pub async fn run(mut self) -> Result<(), DispatchError> {
        info!("Dispatcher started");

        while let Some(event) = self.receiver.dequeue().await {
            let kind = event.kind();
            let slide_name = event.slide_name().to_string();

            if let Err(e) = self.handle(event).await {
                self.error_signal.set();
                error!(
                    event = kind,
                    slide_name = %slide_name,
                    pending = self.receiver.len(),
                    error = %e,
                    "Dispatcher terminated by fatal error"
                );
                return Err(e);
            }
        }

        info!("Event queue closed, dispatcher stopping");
        Ok(())
    }

    /// Apply one event to the session, invoking hooks and forwarding results.
    pub async fn handle(&mut self, event: ScanEvent) -> Result<(), DispatchError> {
        match event {
            ScanEvent::Start(start) => self.on_start(start).await,
            ScanEvent::Tile(tile) => self.on_tile(tile).await,
            ScanEvent::End(end) => self.on_end(end).await,
            ScanEvent::Abort(abort) => self.on_abort(abort).await,
        }
    }

    async fn on_start(&mut self, start: ScanStart) -> Result<(), DispatchError> {
        if let Some(previous) = self.session.snapshot() {
            // Overlapping scans are not isolated: the newer start wins.
            info!(
                previous_slide = %previous.slide_name,
                slide_name = %start.slide_name,
                "Scan started while another was active, replacing session"
            );
        }

        self.session.start(&start.algorithm_id, &start.slide_name);
        info!(
            algorithm_id = %start.algorithm_id,
            slide_name = %start.slide_name,
            stain_name = %start.stain_name,
            organ_name = %start.organ_name,
            "Scan started"
        );

        self.algorithm
            .on_scan_start(&start)
            .await
            .map_err(|e| DispatchError::hook(HookStage::ScanStart, e))
    }

    async fn on_tile(&mut self, tile: TileSubmitted) -> Result<(), DispatchError> {
        let session = self.active_session("tile", &tile.slide_name)?;

        let detections = self
            .algorithm
            .detect(&tile)
            .await
            .map_err(|e| DispatchError::hook(HookStage::Detect, e))?;

        let payload = TileResultPayload::new(
            &session,
            tile.tile_name,
            tile.row_idx,
            tile.col_idx,
            detections,
        );
        debug!(
            slide_name = %payload.slide_name,
            tile_name = %payload.tile_name,
            detections = payload.results.detection_array.len(),
            "Forwarding tile result"
        );

        self.sink.send_tile_result(&payload).await?;
        Ok(())
    }

    async fn on_end(&mut self, end: ScanEnd) -> Result<(), DispatchError> {
        let session = self.active_session("end", &end.slide_name)?;
        let payload = CompletionPayload::from(session);

        self.sink.send_completion(&payload).await?;
        info!(
            algorithm_id = %payload.algorithm_id,
            slide_name = %payload.slide_name,
            "Scan completed"
        );

        self.algorithm
            .on_scan_end(&end)
            .await
            .map_err(|e| DispatchError::hook(HookStage::ScanEnd, e))?;
        self.session.clear();
        Ok(())
    }

    async fn on_abort(&mut self, abort: ScanAbort) -> Result<(), DispatchError> {
        self.session.clear();
        info!(slide_name = %abort.slide_name, "Scan aborted");

        self.algorithm
            .on_scan_abort(&abort)
            .await
            .map_err(|e| DispatchError::hook(HookStage::ScanAbort, e))
    }

    fn active_session(
        &self,
        event: &'static str,
        slide_name: &str,
    ) -> Result<SessionSnapshot, DispatchError> {
        self.session
            .snapshot()
            .ok_or_else(|| DispatchError::NoActiveScan {
                event,
                slide_name: slide_name.to_string(),
            })
    }
}

/// Spawn the dispatcher as the dedicated worker task.
pub fn spawn_dispatcher<A, F>(
    receiver: EventReceiver,
    algorithm: Arc<A>,
    sink: F,
    error_signal: ErrorSignal,
) -> JoinHandle<Result<(), DispatchError>>
where
    A: InlineAlgorithm,
    F: ResultSink,
{
    tokio::spawn(Dispatcher::new(receiver, algorithm, sink, error_signal).run())
}
