//! Wire format of the signaling protocol.
//!
//! Every frame is a JSON object with a mandatory `type` tag. Inbound frames
//! are validated once here and become a [`ClientMessage`]; everything the
//! relay writes back is a [`ServerMessage`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::MessageError;
use crate::registry::ClientId;

/// The three directed message types the relay forwards between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "offer" => Some(SignalKind::Offer),
            "answer" => Some(SignalKind::Answer),
            "ice-candidate" => Some(SignalKind::IceCandidate),
            _ => None,
        }
    }
}

/// A directed signal as asserted by the client.
///
/// `sender` and `target` are kept as the client wrote them; `data` is opaque
/// and `Some(Value::Null)` for an explicit `null`, `None` when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub kind: SignalKind,
    pub sender: Value,
    pub target: Value,
    pub data: Option<Value>,
}

impl Signal {
    /// Registry ids are strings, any other target can never match.
    pub fn target_id(&self) -> Option<&str> {
        self.target.as_str()
    }

    pub fn claimed_sender(&self) -> ClientId {
        match &self.sender {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Signal(Signal),
    Ping,
    /// Well-formed frame with a `type` the relay does not handle.
    Unknown(String),
}

// Loose shape of any inbound frame, checked per type in `ClientMessage::parse`
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    sender: Option<Value>,
    target: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    data: Option<Value>,
}

// A field that is present maps to `Some`, even when it is `null`
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let tag = envelope.kind.ok_or(MessageError::MissingType)?;

        if let Some(kind) = SignalKind::from_tag(&tag) {
            let sender = envelope.sender.filter(truthy).ok_or(MessageError::MissingField {
                kind: kind.as_str(),
                field: "sender",
            })?;
            let target = envelope.target.filter(truthy).ok_or(MessageError::MissingField {
                kind: kind.as_str(),
                field: "target",
            })?;
            return Ok(ClientMessage::Signal(Signal {
                kind,
                sender,
                target,
                data: envelope.data,
            }));
        }

        match tag.as_str() {
            "ping" => Ok(ClientMessage::Ping),
            _ => Ok(ClientMessage::Unknown(tag)),
        }
    }

    pub fn parse_binary(bytes: &[u8]) -> Result<Self, MessageError> {
        let text = std::str::from_utf8(bytes).map_err(|_| MessageError::NotUtf8)?;
        Self::parse(text)
    }
}

/// Frames written by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Connect {
        id: ClientId,
        clients: Vec<ClientId>,
    },
    UserJoined {
        id: ClientId,
    },
    UserLeft {
        id: ClientId,
    },
    Offer {
        #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        sender: ClientId,
    },
    Answer {
        #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        sender: ClientId,
    },
    IceCandidate {
        #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        sender: ClientId,
    },
    Pong,
}

impl ServerMessage {
    pub fn signal(kind: SignalKind, sender: ClientId, data: Option<Value>) -> Self {
        match kind {
            SignalKind::Offer => ServerMessage::Offer { data, sender },
            SignalKind::Answer => ServerMessage::Answer { data, sender },
            SignalKind::IceCandidate => ServerMessage::IceCandidate { data, sender },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_offer_with_opaque_data() {
        let text = r#"{"type":"offer","sender":"a","target":"b","data":{"sdp":"v=0","type":"offer"}}"#;
        let msg = ClientMessage::parse(text).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Signal(Signal {
                kind: SignalKind::Offer,
                sender: "a".into(),
                target: "b".into(),
                data: Some(json!({"sdp": "v=0", "type": "offer"})),
            })
        );
    }

    #[test]
    fn parses_ice_candidate_tag() {
        let text = r#"{"type":"ice-candidate","sender":"a","target":"b","data":{"candidate":"c"}}"#;
        match ClientMessage::parse(text).unwrap() {
            ClientMessage::Signal(signal) => assert_eq!(signal.kind, SignalKind::IceCandidate),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn signal_without_target_is_rejected() {
        let err = ClientMessage::parse(r#"{"type":"answer","sender":"a"}"#).unwrap_err();
        assert!(matches!(
            err,
            MessageError::MissingField { kind: "answer", field: "target" }
        ));
    }

    #[test]
    fn signal_without_sender_is_rejected() {
        let err = ClientMessage::parse(r#"{"type":"offer","target":"b"}"#).unwrap_err();
        assert!(matches!(err, MessageError::MissingField { field: "sender", .. }));
    }

    #[test]
    fn explicit_null_data_is_kept_apart_from_absent_data() {
        let text = r#"{"type":"ice-candidate","sender":"a","target":"b","data":null}"#;
        match ClientMessage::parse(text).unwrap() {
            ClientMessage::Signal(signal) => assert_eq!(signal.data, Some(Value::Null)),
            other => panic!("unexpected {:?}", other),
        }

        let text = r#"{"type":"ice-candidate","sender":"a","target":"b"}"#;
        match ClientMessage::parse(text).unwrap() {
            ClientMessage::Signal(signal) => assert_eq!(signal.data, None),
            other => panic!("unexpected {:?}", other),
        }

        let forwarded = ServerMessage::signal(SignalKind::IceCandidate, "a".into(), Some(Value::Null));
        let encoded = forwarded.to_json().unwrap();
        assert_eq!(encoded, r#"{"type":"ice-candidate","data":null,"sender":"a"}"#);
        assert_eq!(serde_json::from_str::<ServerMessage>(&encoded).unwrap(), forwarded);
    }

    #[test]
    fn non_string_sender_is_accepted_when_truthy() {
        let text = r#"{"type":"offer","sender":42,"target":"b","data":{}}"#;
        match ClientMessage::parse(text).unwrap() {
            ClientMessage::Signal(signal) => {
                assert_eq!(signal.sender, json!(42));
                assert_eq!(signal.claimed_sender(), "42");
                assert_eq!(signal.target_id(), Some("b"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn falsy_sender_or_target_is_rejected() {
        for text in [
            r#"{"type":"offer","sender":"","target":"b"}"#,
            r#"{"type":"offer","sender":0,"target":"b"}"#,
            r#"{"type":"offer","sender":null,"target":"b"}"#,
            r#"{"type":"offer","sender":false,"target":"b"}"#,
        ] {
            assert!(
                matches!(ClientMessage::parse(text), Err(MessageError::MissingField { field: "sender", .. })),
                "{}",
                text
            );
        }
        let err = ClientMessage::parse(r#"{"type":"answer","sender":"a","target":""}"#).unwrap_err();
        assert!(matches!(err, MessageError::MissingField { field: "target", .. }));
    }

    #[test]
    fn ping_and_unknown_types() {
        assert_eq!(ClientMessage::parse(r#"{"type":"ping"}"#).unwrap(), ClientMessage::Ping);
        assert_eq!(
            ClientMessage::parse(r#"{"type":"chat","text":"hi"}"#).unwrap(),
            ClientMessage::Unknown("chat".into())
        );
    }

    #[test]
    fn malformed_frames() {
        assert!(matches!(ClientMessage::parse("not json"), Err(MessageError::Json(_))));
        assert!(matches!(ClientMessage::parse("[1,2]"), Err(MessageError::Json(_))));
        assert!(matches!(ClientMessage::parse(r#"{"id":"x"}"#), Err(MessageError::MissingType)));
        assert!(matches!(
            ClientMessage::parse_binary(&[0xff, 0xfe]),
            Err(MessageError::NotUtf8)
        ));
    }

    #[test]
    fn server_frames_match_wire_shape() {
        let connect = ServerMessage::Connect { id: "b".into(), clients: vec!["a".into()] };
        assert_eq!(
            serde_json::to_value(&connect).unwrap(),
            json!({"type": "connect", "id": "b", "clients": ["a"]})
        );

        let joined = ServerMessage::UserJoined { id: "b".into() };
        assert_eq!(
            serde_json::to_value(&joined).unwrap(),
            json!({"type": "user-joined", "id": "b"})
        );

        assert_eq!(
            serde_json::to_value(ServerMessage::Pong).unwrap(),
            json!({"type": "pong"})
        );

        let forwarded = ServerMessage::signal(
            SignalKind::IceCandidate,
            "a".into(),
            Some(json!({"candidate": "candidate:1"})),
        );
        assert_eq!(
            serde_json::to_value(&forwarded).unwrap(),
            json!({"type": "ice-candidate", "data": {"candidate": "candidate:1"}, "sender": "a"})
        );
    }

    #[test]
    fn forwarded_signal_without_data_omits_field() {
        let forwarded = ServerMessage::signal(SignalKind::Answer, "a".into(), None);
        assert_eq!(forwarded.to_json().unwrap(), r#"{"type":"answer","sender":"a"}"#);
    }
}
