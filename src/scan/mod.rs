//! Scan lifecycle events and the state threaded across them.
//!
//! ```text
//!  producers (HTTP handlers, simulators, tests)
//!        │  EventSender::enqueue (never blocks)
//!        ▼
//! ┌──────────────────┐
//! │    EventQueue    │  unbounded FIFO, many writers
//! └────────┬─────────┘
//!          │  EventReceiver::dequeue (single consumer)
//!          ▼
//! ┌──────────────────┐     ┌──────────────────┐
//! │    Dispatcher    │────▶│   ScanSession    │
//! └──────────────────┘     └──────────────────┘
//! ```

mod event;
mod queue;
mod session;

pub use event::{ScanAbort, ScanEnd, ScanEvent, ScanStart, TileSubmitted};
pub use queue::{event_queue, EventReceiver, EventSender, QueueClosed};
pub use session::{ScanSession, SessionSnapshot};
