//! Connection lifecycle: bounded dialing, handshake ordering, and
//! frame handling.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::Instant;

use common::{ack_frame, endpoint, error_frame, event_frame, MockConnector, MockFrame};
use zeekmgmt_client::{events, ClientError, Connection, ConnectionState, Received};
use zeekmgmt_wire::{Event, Topic, Value};

fn connection(connector: &MockConnector, attempts: u32) -> Connection<MockConnector> {
    Connection::with_endpoint(
        connector.clone(),
        endpoint(),
        attempts,
        Duration::from_millis(100),
    )
}

fn noop_event(reqid: &str) -> Event {
    Event::new(events::TEST_NOOP_REQUEST, vec![Value::string(reqid)])
}

#[tokio::test(start_paused = true)]
async fn connect_retries_until_a_dial_succeeds() {
    let connector = MockConnector::new();
    connector.push_failure("connection refused");
    connector.push_failure("connection refused");
    connector.push_session(vec![ack_frame()]);

    let mut conn = connection(&connector, 5);
    conn.connect(&[Topic::controller()]).await.unwrap();

    assert_eq!(connector.dial_count(), 3);
    assert_eq!(conn.state(), ConnectionState::Ready);
}

#[tokio::test(start_paused = true)]
async fn exhausted_attempts_name_the_endpoint_and_count() {
    let connector = MockConnector::new();
    for _ in 0..3 {
        connector.push_failure("connection refused");
    }

    let mut conn = connection(&connector, 3);
    let err = conn.connect(&[Topic::controller()]).await.unwrap_err();

    match err {
        ClientError::Connection {
            endpoint,
            attempts,
            reason,
        } => {
            assert!(endpoint.contains("127.0.0.1:2149"));
            assert_eq!(attempts, 3);
            assert_eq!(reason, "connection refused");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn handshake_precedes_any_publish() {
    let connector = MockConnector::new();
    connector.push_session(vec![ack_frame()]);

    let mut conn = connection(&connector, 1);
    conn.connect(&[Topic::controller()]).await.unwrap();
    conn.publish(&Topic::controller(), &noop_event("req-1"))
        .await
        .unwrap();

    let sent = connector.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], r#"["zeek/management/controller"]"#);
    assert!(sent[1].contains("data-message"), "{}", sent[1]);
}

#[tokio::test(start_paused = true)]
async fn data_arriving_before_the_ack_is_not_lost() {
    let response = Event::new(events::TEST_TIMEOUT_RESPONSE, vec![Value::string("req-1")]);
    let connector = MockConnector::new();
    connector.push_session(vec![
        event_frame(&Topic::controller(), &response),
        ack_frame(),
    ]);

    let mut conn = connection(&connector, 1);
    conn.connect(&[Topic::controller()]).await.unwrap();

    let received = conn
        .receive(Instant::now() + Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(
        received,
        Received::Event {
            topic: Topic::controller(),
            event: response,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn publish_without_a_session_is_rejected() {
    let connector = MockConnector::new();
    let mut conn = connection(&connector, 1);
    let err = conn
        .publish(&Topic::controller(), &noop_event("req-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotReady));
}

#[tokio::test(start_paused = true)]
async fn new_topic_on_a_live_session_rehandshakes_with_the_union() {
    let connector = MockConnector::new();
    connector.push_session(vec![ack_frame()]);
    connector.push_session(vec![ack_frame()]);

    let mut conn = connection(&connector, 1);
    conn.connect(&[Topic::controller()]).await.unwrap();
    conn.connect(&[Topic::agent("instance-1")]).await.unwrap();

    assert_eq!(connector.dial_count(), 2);
    assert_eq!(conn.topics().len(), 2);
    let sent = connector.sent();
    assert_eq!(sent[0], r#"["zeek/management/controller"]"#);
    assert!(sent[1].contains("zeek/management/agent/instance-1"));
    assert!(sent[1].contains("zeek/management/controller"));

    // A covered topic is a no-op: no third dial.
    conn.connect(&[Topic::controller()]).await.unwrap();
    assert_eq!(connector.dial_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn receive_hits_the_deadline_when_nothing_arrives() {
    let connector = MockConnector::new();
    connector.push_session(vec![ack_frame()]);

    let mut conn = connection(&connector, 1);
    conn.connect(&[Topic::controller()]).await.unwrap();

    let received = conn
        .receive(Instant::now() + Duration::from_secs(20))
        .await
        .unwrap();
    assert_eq!(received, Received::Deadline);
    assert!(conn.is_ready());
}

#[tokio::test(start_paused = true)]
async fn broker_error_frames_surface_as_errors() {
    let connector = MockConnector::new();
    connector.push_session(vec![
        ack_frame(),
        error_frame("deserialization_failed", "bad frame"),
    ]);

    let mut conn = connection(&connector, 1);
    conn.connect(&[Topic::controller()]).await.unwrap();

    let err = conn
        .receive(Instant::now() + Duration::from_secs(5))
        .await
        .unwrap_err();
    match err {
        ClientError::Broker { code, context } => {
            assert_eq!(code, "deserialization_failed");
            assert_eq!(context, "bad frame");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn non_event_payloads_are_errors_not_skips() {
    let connector = MockConnector::new();
    connector.push_session(vec![
        ack_frame(),
        common::event_payload_frame(&Topic::controller(), &Value::Count(1)),
    ]);

    let mut conn = connection(&connector, 1);
    conn.connect(&[Topic::controller()]).await.unwrap();

    let err = conn
        .receive(Instant::now() + Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Wire(_)), "{err}");
}

#[tokio::test(start_paused = true)]
async fn peer_close_tears_the_session_down() {
    let connector = MockConnector::new();
    connector.push_session(vec![ack_frame(), MockFrame::Close]);

    let mut conn = connection(&connector, 1);
    conn.connect(&[Topic::controller()]).await.unwrap();

    let err = conn
        .receive(Instant::now() + Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport { .. }), "{err}");
    assert_eq!(conn.state(), ConnectionState::Disconnected);

    // close() afterwards stays a no-op.
    conn.close().await;
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}
