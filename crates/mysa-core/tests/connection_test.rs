#![allow(clippy::unwrap_used)]
// Integration tests for the lazily connected `TransportConnection`.

mod common;

use std::sync::atomic::Ordering;

use common::{settle, Harness};
use mysa_api::QoS;
use mysa_core::{ConnectionStatus, CoreError};

#[tokio::test]
async fn test_concurrent_callers_share_one_connection() {
    let harness = Harness::logged_in().await;
    let transport = &harness.transport;

    let results =
        futures_util::future::join_all((0..5).map(|_| transport.get_connection())).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(harness.connector.connects(), 1);
    assert_eq!(harness.broker.exchanges.load(Ordering::SeqCst), 1);
    assert!(harness.transport.is_connected());
    assert_eq!(
        harness.broker.last_id_token.lock().unwrap().as_deref(),
        Some("id-1")
    );
}

#[tokio::test]
async fn test_connect_options_follow_config() {
    let harness = Harness::logged_in().await;
    harness.transport.get_connection().await.unwrap();

    let options = harness.connector.options().pop().unwrap();
    assert_eq!(options.endpoint, "a3q27gia9qg3zy-ats.iot.us-east-1.amazonaws.com");
    assert_eq!(options.region, "us-east-1");
    assert!(options.clean_session);
    assert_eq!(options.keep_alive.as_secs(), 30);
    assert_eq!(options.ping_timeout.as_secs(), 3);
    assert_eq!(options.operation_timeout.as_secs(), 60);

    let suffix = options.client_id.strip_prefix("mysa-rs-").unwrap();
    assert!(uuid::Uuid::parse_str(suffix).is_ok(), "{}", options.client_id);
}

#[tokio::test]
async fn test_each_connection_gets_a_new_client_id() {
    let harness = Harness::logged_in().await;
    harness.transport.get_connection().await.unwrap();
    harness.transport.disconnect().await.unwrap();
    harness.transport.get_connection().await.unwrap();

    let options = harness.connector.options();
    assert_eq!(options.len(), 2);
    assert_ne!(options[0].client_id, options[1].client_id);
}

#[tokio::test]
async fn test_connect_requires_a_session() {
    let harness = Harness::new();
    let err = harness.transport.get_connection().await.err().unwrap();
    assert!(err.is_unauthenticated(), "got {err:?}");
    assert_eq!(harness.connector.connects(), 0);
    assert!(!harness.transport.is_connected());
}

#[tokio::test]
async fn test_failed_connect_returns_to_disconnected() {
    let harness = Harness::logged_in().await;
    harness.connector.failing_connects.store(1, Ordering::SeqCst);

    let err = harness.transport.get_connection().await.err().unwrap();
    assert!(matches!(err, CoreError::Transport { .. }), "got {err:?}");
    assert_eq!(*harness.transport.status().borrow(), ConnectionStatus::Disconnected);

    harness.transport.get_connection().await.unwrap();
    assert!(harness.transport.is_connected());
}

#[tokio::test]
async fn test_unsolicited_close_clears_the_cache() {
    let harness = Harness::logged_in().await;
    harness.transport.get_connection().await.unwrap();

    harness.connector.connection(0).close();
    settle().await;
    assert!(!harness.transport.is_connected());

    harness.transport.get_connection().await.unwrap();
    assert_eq!(harness.connector.connects(), 2);
}

#[tokio::test]
async fn test_stale_watcher_does_not_clear_newer_connection() {
    let harness = Harness::logged_in().await;
    harness.transport.get_connection().await.unwrap();
    harness.transport.disconnect().await.unwrap();
    harness.transport.get_connection().await.unwrap();
    settle().await;

    // The first connection's token fired on disconnect; the second must survive.
    assert!(harness.transport.is_connected());
    assert_eq!(harness.connector.connects(), 2);
}

#[tokio::test]
async fn test_publish_passes_topic_and_qos() {
    let harness = Harness::logged_in().await;
    harness
        .transport
        .publish("/v1/dev/d1/in", br#"{"a":1}"#.to_vec(), true)
        .await
        .unwrap();
    harness
        .transport
        .publish("/v1/dev/d1/in", br#"{"a":2}"#.to_vec(), false)
        .await
        .unwrap();

    let published = harness.connector.latest().published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].topic, "/v1/dev/d1/in");
    assert_eq!(published[0].qos, QoS::AtLeastOnce);
    assert_eq!(published[1].qos, QoS::AtMostOnce);
}

#[tokio::test]
async fn test_publish_failure_maps_to_transport_publish() {
    let harness = Harness::logged_in().await;
    harness.transport.get_connection().await.unwrap();
    harness
        .connector
        .latest()
        .failing_publishes
        .store(1, Ordering::SeqCst);

    let err = harness
        .transport
        .publish("/v1/dev/d1/in", b"{}".to_vec(), true)
        .await
        .unwrap_err();

    assert!(
        matches!(err, CoreError::TransportPublish { attempts: 1, ref cause } if cause.contains("timed out")),
        "got {err:?}"
    );
    assert!(harness.transport.is_connected());
}

#[tokio::test]
async fn test_publish_retries_once_on_a_closed_connection() {
    let harness = Harness::logged_in().await;
    harness.transport.get_connection().await.unwrap();

    // Closed, but the watcher has not run yet.
    harness.connector.connection(0).close();
    harness
        .transport
        .publish("/v1/dev/d1/in", b"{}".to_vec(), true)
        .await
        .unwrap();

    assert_eq!(harness.connector.connects(), 2);
    assert_eq!(harness.connector.connection(1).published().len(), 1);
}

#[tokio::test]
async fn test_disconnect_closes_and_resets() {
    let harness = Harness::logged_in().await;
    let mut status = harness.transport.status();
    harness.transport.get_connection().await.unwrap();
    assert_eq!(*status.borrow_and_update(), ConnectionStatus::Connected);

    harness.transport.disconnect().await.unwrap();

    assert!(!harness.transport.is_connected());
    assert_eq!(*status.borrow_and_update(), ConnectionStatus::Disconnected);

    assert!(harness.connector.connection(0).is_closed());
}

#[tokio::test]
async fn test_disconnect_without_connection_is_a_no_op() {
    let harness = Harness::new();
    harness.transport.disconnect().await.unwrap();
    assert_eq!(harness.connector.connects(), 0);
}
