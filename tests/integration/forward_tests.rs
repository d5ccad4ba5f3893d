//! Result forwarding against real downstream services.
//!
//! Tests verify:
//! - Payloads arrive at the aggregation endpoints with the expected bodies
//! - A stalled downstream is fatal once the request times out
//! - An unreachable downstream is fatal
//! - A rejected payload (non-2xx) is not fatal

use std::sync::Arc;
use std::time::Duration;

use inline_algo::{
    event_queue, CompletionPayload, Detection, DispatchError, Dispatcher, ErrorSignal,
    ForwardTarget, HttpForwarder, Received, ResultSink, SessionSnapshot, TileResultPayload,
};

use super::test_utils::{
    end, spawn_failing_receiver, spawn_receiver, spawn_stalling_receiver, start, tile,
    unreachable_url, ScriptedAlgorithm,
};

fn session() -> SessionSnapshot {
    SessionSnapshot {
        algorithm_id: "a1".to_string(),
        slide_name: "s1".to_string(),
    }
}

// =============================================================================
// Delivery
// =============================================================================

#[tokio::test]
async fn test_forwarder_delivers_payloads() {
    let (url, store) = spawn_receiver().await;
    let forwarder = HttpForwarder::new(ForwardTarget::Custom(url)).unwrap();

    let tile_payload = TileResultPayload::new(
        &session(),
        "t1",
        4,
        7,
        vec![Detection::new(5.0, 5.0, 1, "X")],
    );
    forwarder.send_tile_result(&tile_payload).await.unwrap();
    forwarder
        .send_completion(&CompletionPayload::from(session()))
        .await
        .unwrap();

    assert_eq!(
        store.all(),
        vec![
            Received::TileResult(tile_payload),
            Received::Completion(CompletionPayload {
                algorithm_id: "a1".to_string(),
                slide_name: "s1".to_string(),
            }),
        ]
    );
}

#[tokio::test]
async fn test_dispatcher_over_http() {
    let (url, store) = spawn_receiver().await;
    let forwarder = HttpForwarder::new(ForwardTarget::Custom(url)).unwrap();

    let (tx, rx) = event_queue();
    tx.enqueue(start("a1", "s1")).unwrap();
    tx.enqueue(tile("s1", "t1", 0, 0)).unwrap();
    tx.enqueue(tile("s1", "t2", 0, 1)).unwrap();
    tx.enqueue(end("s1")).unwrap();
    drop(tx);

    let algorithm = ScriptedAlgorithm::new()
        .with_detections("t2", vec![Detection::new(1.0, 2.0, 3, "Mitosis")]);
    let result = Dispatcher::new(rx, Arc::new(algorithm), forwarder, ErrorSignal::new())
        .run()
        .await;
    assert!(result.is_ok());

    let tiles = store.tile_results();
    assert_eq!(tiles.len(), 2);
    assert_eq!(tiles[0].tile_name, "t1");
    assert!(tiles[0].results.detection_array.is_empty());
    assert_eq!(
        tiles[1].results.detection_array,
        vec![Detection::new(1.0, 2.0, 3, "Mitosis")]
    );
    assert_eq!(store.completions().len(), 1);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_stalled_downstream_is_fatal() {
    let (url, arrivals) = spawn_stalling_receiver(Duration::from_millis(500)).await;
    let forwarder =
        HttpForwarder::with_timeout(ForwardTarget::Custom(url), Duration::from_millis(100))
            .unwrap();

    let (tx, rx) = event_queue();
    tx.enqueue(start("a1", "s1")).unwrap();
    tx.enqueue(tile("s1", "t1", 0, 0)).unwrap();
    tx.enqueue(tile("s1", "t2", 0, 1)).unwrap();
    tx.enqueue(end("s1")).unwrap();
    drop(tx);

    let signal = ErrorSignal::new();
    let result = Dispatcher::new(
        rx,
        Arc::new(ScriptedAlgorithm::new()),
        forwarder,
        signal.clone(),
    )
    .run()
    .await;

    match result {
        Err(DispatchError::Forward(e)) => assert!(e.is_timeout(), "unexpected error: {}", e),
        other => panic!("expected forward timeout, got {:?}", other),
    }
    assert!(signal.is_set());

    // Nothing after the timed-out tile was sent.
    assert_eq!(*arrivals.lock().unwrap(), vec!["t1".to_string()]);
}

#[tokio::test]
async fn test_unreachable_downstream_is_fatal() {
    let forwarder = HttpForwarder::with_timeout(
        ForwardTarget::Custom(unreachable_url().await),
        Duration::from_secs(2),
    )
    .unwrap();

    let error = forwarder
        .send_completion(&CompletionPayload::from(session()))
        .await
        .unwrap_err();
    assert!(!error.is_timeout());
    assert!(error.to_string().contains("/v1/algorithm-completed"));

    let (tx, rx) = event_queue();
    tx.enqueue(start("a1", "s1")).unwrap();
    tx.enqueue(tile("s1", "t1", 0, 0)).unwrap();
    drop(tx);

    let signal = ErrorSignal::new();
    let result = Dispatcher::new(
        rx,
        Arc::new(ScriptedAlgorithm::new()),
        forwarder,
        signal.clone(),
    )
    .run()
    .await;
    assert!(matches!(result, Err(DispatchError::Forward(_))));
    assert!(signal.is_set());
}

#[tokio::test]
async fn test_rejected_payload_is_not_fatal() {
    let forwarder = HttpForwarder::new(ForwardTarget::Custom(spawn_failing_receiver().await))
        .unwrap();

    let payload = TileResultPayload::new(&session(), "t1", 0, 0, Vec::new());
    assert!(forwarder.send_tile_result(&payload).await.is_ok());

    let (tx, rx) = event_queue();
    tx.enqueue(start("a1", "s1")).unwrap();
    tx.enqueue(tile("s1", "t1", 0, 0)).unwrap();
    tx.enqueue(end("s1")).unwrap();
    drop(tx);

    let signal = ErrorSignal::new();
    let result = Dispatcher::new(
        rx,
        Arc::new(ScriptedAlgorithm::new()),
        forwarder,
        signal.clone(),
    )
    .run()
    .await;
    assert!(result.is_ok());
    assert!(!signal.is_set());
}

#[tokio::test]
async fn test_forward_target_urls() {
    let local = HttpForwarder::new(ForwardTarget::Local).unwrap();
    assert_eq!(
        local.tile_results_url().as_str(),
        "http://localhost:8001/v1/tile-results"
    );

    let container = HttpForwarder::new(ForwardTarget::Container).unwrap();
    assert_eq!(
        container.completed_url().as_str(),
        "http://host.docker.internal:8001/v1/algorithm-completed"
    );
}
