//! Architectural Contract Test: Shutdown Determinism
//!
//! This test verifies that the listener lifecycle is deterministic.
//!
//! Constraints verified:
//! - stop() terminates both tasks promptly, even while idle
//! - An in-flight provider call completes before stop() returns
//! - A listener cannot be started twice
//! - A lost subscription is retried per the reconnect policy, then reported
//!   through ingestion_closed()
//!
//! If this test fails, someone has added:
//! - Tasks that ignore the stop signal
//! - Blocking waits without a timeout in the processing loop
//! - Silent hangs on a broken event stream

mod common;

use common::*;
use dnm_core::error::Error;
use dnm_core::{EventListener, ListenerState, ReconnectPolicy};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn stop_terminates_idle_listener_promptly() {
    let (source, _events) = ControlledEventSource::new();
    let manager = manager_for(MockProvider::new());
    let mut listener = EventListener::new(Arc::new(source), manager, fast_config());

    listener.start().unwrap();
    assert_eq!(listener.state(), ListenerState::Listening);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = tokio::time::timeout(Duration::from_secs(2), listener.stop()).await;
    assert!(result.is_ok(), "listener should stop within 2 seconds");
    assert_eq!(listener.state(), ListenerState::Stopped);
}

#[tokio::test]
async fn stop_waits_for_in_flight_call() {
    let provider = MockProvider::new().with_delay(Duration::from_millis(300));
    let (source, events) = ControlledEventSource::new();
    let manager = manager_for(MockProvider::sharing_state_with(&provider));
    let mut listener = EventListener::new(Arc::new(source), manager, fast_config());
    listener.start().unwrap();

    events.send(create_event("slow.example.com")).unwrap();
    assert!(eventually(|| !provider.calls().is_empty()).await);

    let report = listener.stop().await;

    // The call was not cancelled
    assert_eq!(provider.records(), vec!["slow".to_string()]);
    assert_eq!(report.actions_processed, 1);
}

#[tokio::test]
async fn queued_actions_are_not_started_after_stop() {
    let provider = MockProvider::new().with_delay(Duration::from_millis(200));
    let (source, events) = ControlledEventSource::new();
    let manager = manager_for(MockProvider::sharing_state_with(&provider));
    let mut listener = EventListener::new(Arc::new(source), manager, fast_config());
    listener.start().unwrap();

    for i in 0..5 {
        events
            .send(create_event(&format!("q{}.example.com", i)))
            .unwrap();
    }
    assert!(eventually(|| !provider.calls().is_empty()).await);

    let report = listener.stop().await;

    assert!(report.actions_processed < 5);
    assert_eq!(
        report.actions_processed + report.actions_discarded,
        report.actions_enqueued
    );
    assert_eq!(provider.calls().len() as u64, report.actions_processed);
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let (source, _events) = ControlledEventSource::new();
    let manager = manager_for(MockProvider::new());
    let mut listener = EventListener::new(Arc::new(source), manager, fast_config());

    listener.start().unwrap();
    assert!(matches!(listener.start(), Err(Error::Other(_))));

    listener.stop().await;
    assert!(listener.start().is_err(), "a stopped listener cannot restart");

    // Stopping again is a no-op
    listener.stop().await;
    assert_eq!(listener.state(), ListenerState::Stopped);
}

#[tokio::test]
async fn transport_error_without_reconnect_closes_ingestion() {
    let (source, events) = ControlledEventSource::new();
    let source = Arc::new(source);
    let manager = manager_for(MockProvider::new());
    let mut listener = EventListener::new(source.clone(), manager, fast_config());
    listener.start().unwrap();

    events.send(Err(Error::transport("connection reset"))).unwrap();

    let closed = tokio::time::timeout(Duration::from_secs(2), listener.ingestion_closed()).await;
    assert!(closed.is_ok(), "ingestion should report closure");
    assert_eq!(source.subscribe_count(), 1);

    let report = listener.stop().await;
    assert_eq!(report.reconnects, 0);
}

#[tokio::test]
async fn closed_stream_is_resubscribed() {
    let provider = MockProvider::new();
    let (source, mut senders) = ControlledEventSource::with_subscriptions(2);
    let source = Arc::new(source);
    let manager = manager_for(MockProvider::sharing_state_with(&provider));
    let config = fast_config().with_reconnect(ReconnectPolicy {
        max_attempts: 3,
        initial_backoff_ms: 10,
        max_backoff_ms: 40,
    });
    let mut listener = EventListener::new(source.clone(), manager, config);
    listener.start().unwrap();

    let second = senders.pop().unwrap();
    let first = senders.pop().unwrap();

    first.send(create_event("one.example.com")).unwrap();
    drop(first);

    second.send(create_event("two.example.com")).unwrap();

    assert!(eventually(|| provider.records().len() == 2).await);
    assert_eq!(provider.records(), vec!["one".to_string(), "two".to_string()]);
    assert_eq!(source.subscribe_count(), 2);

    let report = listener.stop().await;
    assert_eq!(report.reconnects, 1);
}

#[tokio::test]
async fn exhausted_reconnects_close_ingestion() {
    let (source, first) = ControlledEventSource::new();
    let source = Arc::new(source);
    let manager = manager_for(MockProvider::new());
    let config = fast_config().with_reconnect(ReconnectPolicy {
        max_attempts: 2,
        initial_backoff_ms: 5,
        max_backoff_ms: 10,
    });
    let mut listener = EventListener::new(source.clone(), manager, config);
    listener.start().unwrap();

    drop(first);

    let closed = tokio::time::timeout(Duration::from_secs(2), listener.ingestion_closed()).await;
    assert!(closed.is_ok(), "ingestion should give up after two reconnects");

    // The initial subscription plus two reconnects, each failing
    assert_eq!(source.subscribe_count(), 3);

    let report = listener.stop().await;
    assert_eq!(report.reconnects, 2);
}
