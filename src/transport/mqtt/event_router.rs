//! Pure routing of rumqttc events into transport events

use crate::transport::{InboundMessage, TransportEvent};
use rumqttc::{ConnectReturnCode, Event, Outgoing, Packet, SubscribeReasonCode};
use tracing::debug;

/// Stateless mapping from rumqttc events to [`TransportEvent`]
pub struct EventRouter;

impl EventRouter {
    /// Route a single rumqttc event (pure function)
    pub fn route_mqtt_event(event: &Event) -> TransportEvent {
        match event {
            Event::Incoming(incoming) => Self::route_incoming(incoming),
            Event::Outgoing(outgoing) => Self::route_outgoing(outgoing),
        }
    }

    fn route_incoming(packet: &Packet) -> TransportEvent {
        match packet {
            Packet::ConnAck(connack) if connack.code == ConnectReturnCode::Success => {
                TransportEvent::ConnectionAcknowledged
            }
            Packet::ConnAck(connack) => {
                TransportEvent::Disconnected(format!("connection refused: {:?}", connack.code))
            }
            Packet::Publish(publish) => TransportEvent::MessageReceived(InboundMessage {
                topic: publish.topic.clone(),
                payload: publish.payload.clone(),
                retain: publish.retain,
            }),
            Packet::PubAck(puback) => TransportEvent::PublishAcknowledged(puback.pkid),
            Packet::PubComp(pubcomp) => TransportEvent::PublishAcknowledged(pubcomp.pkid),
            Packet::SubAck(suback) => TransportEvent::SubscribeAcknowledged {
                packet_id: suback.pkid,
                rejected: Self::is_subscription_rejected(&suback.return_codes),
            },
            Packet::Disconnect => TransportEvent::Disconnected("broker sent DISCONNECT".to_string()),
            other => {
                debug!(target: "mqtt_transport", "MQTT event: {:?}", other);
                TransportEvent::Other
            }
        }
    }

    fn route_outgoing(outgoing: &Outgoing) -> TransportEvent {
        match outgoing {
            Outgoing::Publish(pkid) => TransportEvent::PublishSent(*pkid),
            Outgoing::Subscribe(pkid) => TransportEvent::SubscribeSent(*pkid),
            _ => TransportEvent::Other,
        }
    }

    /// Any failure code in a SUBACK rejects the subscription (pure function)
    pub fn is_subscription_rejected(return_codes: &[SubscribeReasonCode]) -> bool {
        return_codes.is_empty()
            || return_codes
                .iter()
                .any(|code| matches!(code, SubscribeReasonCode::Failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rumqttc::{ConnAck, PubAck, PubComp, Publish, QoS, SubAck};

    #[test]
    fn test_route_connack() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
        }));
        assert_eq!(
            EventRouter::route_mqtt_event(&connack),
            TransportEvent::ConnectionAcknowledged
        );
    }

    #[test]
    fn test_route_refused_connack() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::NotAuthorized,
        }));
        assert!(matches!(
            EventRouter::route_mqtt_event(&connack),
            TransportEvent::Disconnected(reason) if reason.contains("NotAuthorized")
        ));
    }

    #[test]
    fn test_route_publish() {
        let mut publish = Publish::new("devices/lamp", QoS::AtLeastOnce, "hello");
        publish.retain = true;
        let event = Event::Incoming(Packet::Publish(publish));

        match EventRouter::route_mqtt_event(&event) {
            TransportEvent::MessageReceived(message) => {
                assert_eq!(message.topic, "devices/lamp");
                assert_eq!(message.payload, Bytes::from("hello"));
                assert!(message.retain);
            }
            other => panic!("Expected MessageReceived, got {other:?}"),
        }
    }

    #[test]
    fn test_route_acknowledgements() {
        let puback = Event::Incoming(Packet::PubAck(PubAck::new(7)));
        assert_eq!(
            EventRouter::route_mqtt_event(&puback),
            TransportEvent::PublishAcknowledged(7)
        );

        let pubcomp = Event::Incoming(Packet::PubComp(PubComp::new(9)));
        assert_eq!(
            EventRouter::route_mqtt_event(&pubcomp),
            TransportEvent::PublishAcknowledged(9)
        );
    }

    #[test]
    fn test_route_suback() {
        let granted = Event::Incoming(Packet::SubAck(SubAck::new(
            3,
            vec![SubscribeReasonCode::Success(QoS::AtLeastOnce)],
        )));
        assert_eq!(
            EventRouter::route_mqtt_event(&granted),
            TransportEvent::SubscribeAcknowledged {
                packet_id: 3,
                rejected: false
            }
        );

        let refused = Event::Incoming(Packet::SubAck(SubAck::new(
            4,
            vec![SubscribeReasonCode::Failure],
        )));
        assert_eq!(
            EventRouter::route_mqtt_event(&refused),
            TransportEvent::SubscribeAcknowledged {
                packet_id: 4,
                rejected: true
            }
        );
    }

    #[test]
    fn test_route_disconnect() {
        let event = Event::Incoming(Packet::Disconnect);
        assert!(matches!(
            EventRouter::route_mqtt_event(&event),
            TransportEvent::Disconnected(_)
        ));
    }

    #[test]
    fn test_route_outgoing() {
        assert_eq!(
            EventRouter::route_mqtt_event(&Event::Outgoing(Outgoing::Publish(11))),
            TransportEvent::PublishSent(11)
        );
        assert_eq!(
            EventRouter::route_mqtt_event(&Event::Outgoing(Outgoing::Subscribe(12))),
            TransportEvent::SubscribeSent(12)
        );
        assert_eq!(
            EventRouter::route_mqtt_event(&Event::Outgoing(Outgoing::PingReq)),
            TransportEvent::Other
        );
    }

    #[test]
    fn test_housekeeping_is_other() {
        let event = Event::Incoming(Packet::PingResp);
        assert_eq!(EventRouter::route_mqtt_event(&event), TransportEvent::Other);
    }

    #[test]
    fn test_is_subscription_rejected() {
        assert!(!EventRouter::is_subscription_rejected(&[
            SubscribeReasonCode::Success(QoS::AtMostOnce),
            SubscribeReasonCode::Success(QoS::AtLeastOnce),
        ]));
        assert!(EventRouter::is_subscription_rejected(&[
            SubscribeReasonCode::Success(QoS::AtLeastOnce),
            SubscribeReasonCode::Failure,
        ]));
        assert!(EventRouter::is_subscription_rejected(&[]));
    }
}
