//! Inline Algo - runs a detection algorithm inline with a slide scanner.
//!
//! This binary starts the HTTP server and wires the dispatcher to it.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inline_algo::{
    config::{Cli, Command, ReceiveConfig, ServeConfig},
    create_receiver_router, create_router, event_queue, spawn_dispatcher, AppState, ErrorSignal,
    HttpForwarder, InlineAlgorithm, ReceivedPayloads, RouterConfig, ThresholdDetector,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Receive(config) => run_receive(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let target = match config.forward_target() {
        Ok(target) => target,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let forwarder = match HttpForwarder::with_timeout(target, config.forward_timeout()) {
        Ok(forwarder) => forwarder,
        Err(e) => {
            error!("Failed to create result forwarder: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Tile results:  {}", forwarder.tile_results_url());
    info!("  Completion:    {}", forwarder.completed_url());
    info!("  Timeout:       {}ms", config.forward_timeout_ms);
    info!(
        "  Detector:      threshold={} percentiles={}..{} label='{}'",
        config.threshold, config.low_percentile, config.high_percentile, config.label
    );

    let algorithm = Arc::new(ThresholdDetector::new(config.threshold_settings()));
    let error_signal = ErrorSignal::new();
    let (events, receiver) = event_queue();

    let dispatcher = spawn_dispatcher(
        receiver,
        Arc::clone(&algorithm),
        forwarder,
        error_signal.clone(),
    );
    spawn_failure_watcher(error_signal.clone());

    if let Err(e) = algorithm.on_server_start().await {
        error!("on_server_start hook failed: {}", e);
        return ExitCode::FAILURE;
    }

    let mut router_config = RouterConfig::default().with_tracing(!config.no_tracing);
    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }
    let router = create_router(AppState::new(events, error_signal.clone()), router_config);

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Listening for scanner events on: http://{}", addr);
    info!("    PUT  /v1/scan/start");
    info!("    POST /v1/scan/image-tile");
    info!("    PUT  /v1/scan/end");
    info!("    PUT  /v1/scan/abort");
    info!("────────────────────────────────────────────────────────────────");

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    // The router (and its queue sender) is gone, so the dispatcher drains
    // whatever is left and stops on its own.
    match dispatcher.await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => warn!("Dispatcher had already stopped on a fatal error"),
        Err(e) => error!("Dispatcher task panicked: {}", e),
    }

    if let Err(e) = algorithm.on_server_end().await {
        error!("on_server_end hook failed: {}", e);
        return ExitCode::FAILURE;
    }

    if error_signal.is_set() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Log loudly once the dispatcher dies. The server keeps accepting events.
fn spawn_failure_watcher(error_signal: ErrorSignal) {
    tokio::spawn(async move {
        error_signal.wait().await;
        error!("Dispatcher has stopped; incoming scan events are accepted but no longer processed");
        error!("Restart the service to resume processing");
    });
}

// =============================================================================
// Receive Command
// =============================================================================

async fn run_receive(config: ReceiveConfig) -> ExitCode {
    init_logging(config.verbose);

    let router = create_receiver_router(ReceivedPayloads::new());
    let addr = config.bind_address();

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Aggregation stand-in listening on: http://{}", addr);
    info!("    POST /v1/tile-results");
    info!("    POST /v1/algorithm-completed");

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Shared
// =============================================================================

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "inline_algo=debug,tower_http=debug"
    } else {
        "inline_algo=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve when Ctrl-C is received.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
