//! End-to-end command confirmation through the session loop
//!
//! A scripted transport delivers payloads on a subscribed topic; the tests
//! check what, if anything, ends up on the confirmation topic.

mod test_helpers;

use cmdconfirm::protocol::QoS;
use cmdconfirm::session::{Session, StaticTopicSource};
use cmdconfirm::testing::MockTransport;
use test_helpers::{drain, mock_session};

const CONFIRM_TOPIC: &str = "command/confirm";

async fn started_session(topics: &str) -> Session<MockTransport> {
    let mut session = mock_session();
    let mut source = StaticTopicSource::new([topics]);
    session.start(&mut source).await.unwrap();
    session
}

fn confirmations(session: &Session<MockTransport>) -> Vec<String> {
    session
        .gateway()
        .transport()
        .published_to(CONFIRM_TOPIC)
        .iter()
        .skip(1) // handshake
        .map(|m| m.payload_text())
        .collect()
}

#[tokio::test]
async fn test_command_is_confirmed_on_confirm_topic() {
    let mut session = started_session("devices/lamp").await;

    session
        .gateway_mut()
        .transport_mut()
        .push_message("devices/lamp", r#"{"message":"hi","message_id":5,"message_type":"COMMAND"}"#);
    drain(&mut session).await;

    assert_eq!(
        confirmations(&session),
        vec![r#"{"message_type":"CONFIRMATION","message_id":5}"#.to_string()]
    );

    let published = session.gateway().transport().published_to(CONFIRM_TOPIC);
    assert!(published.iter().all(|m| m.qos == QoS::AtLeastOnce && !m.retain));
}

#[tokio::test]
async fn test_non_command_message_is_not_confirmed() {
    let mut session = started_session("devices/lamp").await;

    session
        .gateway_mut()
        .transport_mut()
        .push_message("devices/lamp", r#"{"message":"hi","message_type":"INFO"}"#);
    drain(&mut session).await;

    assert!(confirmations(&session).is_empty());
}

#[tokio::test]
async fn test_negative_message_id_is_not_confirmed() {
    let mut session = started_session("devices/lamp").await;

    session
        .gateway_mut()
        .transport_mut()
        .push_message("devices/lamp", r#"{"message_id":-1,"message_type":"COMMAND"}"#);
    drain(&mut session).await;

    assert!(confirmations(&session).is_empty());
}

#[tokio::test]
async fn test_malformed_payload_does_not_stop_processing() {
    let mut session = started_session("devices/lamp").await;

    let transport = session.gateway_mut().transport_mut();
    transport.push_message("devices/lamp", "not json");
    transport.push_message("devices/lamp", r#"{"message_id":7,"message_type":"COMMAND"}"#);
    drain(&mut session).await;

    assert_eq!(
        confirmations(&session),
        vec![r#"{"message_type":"CONFIRMATION","message_id":7}"#.to_string()]
    );
}

#[tokio::test]
async fn test_commands_are_confirmed_in_arrival_order_across_topics() {
    let mut session = started_session("devices/lamp devices/fan").await;

    let transport = session.gateway_mut().transport_mut();
    transport.push_message("devices/fan", r#"{"message_id":1,"message_type":"COMMAND"}"#);
    transport.push_message("devices/lamp", r#"{"message_id":2,"message_type":"COMMAND"}"#);
    transport.push_message("devices/fan", r#"{"message_id":3,"message_type":"COMMAND"}"#);
    drain(&mut session).await;

    assert_eq!(
        confirmations(&session),
        vec![
            r#"{"message_type":"CONFIRMATION","message_id":1}"#.to_string(),
            r#"{"message_type":"CONFIRMATION","message_id":2}"#.to_string(),
            r#"{"message_type":"CONFIRMATION","message_id":3}"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_wildcard_subscription_receives_commands() {
    let mut session = started_session("devices/+").await;

    session
        .gateway_mut()
        .transport_mut()
        .push_message("devices/heater", r#"{"message_id":11,"message_type":"COMMAND"}"#);
    drain(&mut session).await;

    assert_eq!(
        confirmations(&session),
        vec![r#"{"message_type":"CONFIRMATION","message_id":11}"#.to_string()]
    );
}

#[tokio::test]
async fn test_message_on_unsubscribed_topic_is_ignored() {
    let mut session = started_session("devices/lamp").await;

    session
        .gateway_mut()
        .transport_mut()
        .push_message("other/topic", r#"{"message_id":4,"message_type":"COMMAND"}"#);
    drain(&mut session).await;

    assert!(confirmations(&session).is_empty());
}

#[tokio::test]
async fn test_unacknowledged_confirmation_is_not_retried() {
    let mut session = started_session("devices/lamp").await;

    let transport = session.gateway_mut().transport_mut();
    transport.withhold_acks();
    transport.push_message("devices/lamp", r#"{"message_id":9,"message_type":"COMMAND"}"#);
    drain(&mut session).await;
    session.run_once().await;

    assert_eq!(confirmations(&session).len(), 1);
}
