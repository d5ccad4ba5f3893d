//! HTTP server layer: the producer side of the event queue.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │      PUT /v1/scan/start   POST /v1/scan/image-tile   ...        │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌────────────────────────────┐   │
//! │  │        handlers          │  │          routes            │   │
//! │  │ (parse body, enqueue)    │  │  (router, CORS, tracing)   │   │
//! │  └──────────────────────────┘  └────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, image_tile_handler, scan_abort_handler, scan_end_handler, scan_start_handler,
    AppState, HealthResponse,
};
pub use routes::{create_router, RouterConfig};
