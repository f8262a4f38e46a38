//! Wire protocol: client frames, bridge envelopes, and reserved signal names.
//!
//! Browsers talk to the gateway over WebSocket with one JSON object per text
//! frame. Workers talk to the gateway's process bridge over the pub/sub bus
//! with one JSON object per line. Both directions share the inner
//! `{signal, payload}` message shape.

pub mod payload;
pub mod sanitize;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use payload::Payload;
pub use sanitize::{sanitize, SanitizeError};

/// Reserved signal carrying the connect acknowledgment (and, on the bridge,
/// the connect notification).
pub const CONNECT_SIGNAL: &str = "__connect";
/// Reserved signal telling a worker that a session went away.
pub const DISCONNECT_SIGNAL: &str = "__disconnect";
/// Reserved signal carrying action start/end notifications.
pub const ACTION_SIGNAL: &str = "__action";
/// Reserved payload key holding a client-supplied action id.
pub const ACTION_ID_KEY: &str = "__action_id";
/// Reserved signal mirroring a session datastore change: `{key: value}`.
pub const DATA_SIGNAL: &str = "__data";

/// Env var telling a launched worker where the bridge publishes (`host:port`).
pub const BRIDGE_ENV: &str = "SIGNALBENCH_BRIDGE";
/// Env var telling a launched worker which namespace it serves.
pub const NAMESPACE_ENV: &str = "SIGNALBENCH_NAMESPACE";

/// Frame keys a client may use for the connect handshake. `__connect` is the
/// key older clients send.
const CONNECT_KEYS: [&str; 2] = ["connect", "__connect"];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A malformed or out-of-state inbound frame.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame must contain both `signal` and `payload`")]
    MissingKeys,
    #[error("`signal` must be a string")]
    InvalidSignal,
    #[error("connect handshake id must be a string or null")]
    InvalidConnect,
    #[error("connection already has a session")]
    AlreadyConnected,
    #[error("no session connected yet")]
    NotConnected,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client frames
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An inbound client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// `{"connect": <id|null>}`. An empty id counts as no id.
    Connect { session_id: Option<String> },
    /// `{"signal": <name>, "payload": <value>}`.
    Signal { signal: String, payload: Value },
}

impl ClientFrame {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut obj) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        if let Some(key) = CONNECT_KEYS.iter().find(|k| obj.contains_key(**k)) {
            let session_id = match obj.remove(*key) {
                Some(Value::String(s)) if !s.is_empty() => Some(s),
                Some(Value::String(_)) | Some(Value::Null) | None => None,
                Some(_) => return Err(ProtocolError::InvalidConnect),
            };
            return Ok(ClientFrame::Connect { session_id });
        }

        match (obj.remove("signal"), obj.remove("payload")) {
            (Some(Value::String(signal)), Some(payload)) => {
                Ok(ClientFrame::Signal { signal, payload })
            }
            (Some(_), Some(_)) => Err(ProtocolError::InvalidSignal),
            _ => Err(ProtocolError::MissingKeys),
        }
    }
}

/// `{signal, payload}`: the outbound client frame and the inner message of a
/// bridge envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
    pub signal: String,
    #[serde(default)]
    pub payload: Value,
}

impl SignalMessage {
    pub fn new(signal: impl Into<String>, payload: Value) -> Self {
        Self {
            signal: signal.into(),
            payload,
        }
    }

    /// `__action {id, status}`.
    pub fn action(id: &str, status: ActionStatus) -> Self {
        Self::new(
            ACTION_SIGNAL,
            serde_json::json!({ "id": id, "status": status }),
        )
    }

    /// `__connect {session_id}`.
    pub fn connect_ack(session_id: &str) -> Self {
        Self::new(
            CONNECT_SIGNAL,
            serde_json::json!({ "session_id": session_id }),
        )
    }

    /// `__data {key: value}`. A removed key carries `null`.
    pub fn data_change(key: &str, value: Value) -> Self {
        let mut payload = serde_json::Map::new();
        payload.insert(key.to_owned(), value);
        Self::new(DATA_SIGNAL, Value::Object(payload))
    }
}

/// Phase of an action bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Start,
    End,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bridge frames
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A session-tagged message between the bridge and a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEnvelope {
    pub session_id: String,
    pub namespace: String,
    pub payload: SignalMessage,
}

/// Bridge → worker: "publish your replies on this port".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitMessage {
    pub namespace: String,
    pub publish_on_port: u16,
}

/// Worker → bridge: handshake acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyMessage {
    pub namespace: String,
    pub ready: bool,
}

/// Any line that can travel on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BusFrame {
    Envelope(BridgeEnvelope),
    Init(InitMessage),
    Ready(ReadyMessage),
}

impl BusFrame {
    pub fn namespace(&self) -> &str {
        match self {
            BusFrame::Envelope(e) => &e.namespace,
            BusFrame::Init(i) => &i.namespace,
            BusFrame::Ready(r) => &r.namespace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_connect_null() {
        let frame = ClientFrame::parse(r#"{"connect": null}"#).unwrap();
        assert_eq!(frame, ClientFrame::Connect { session_id: None });
    }

    #[test]
    fn parse_connect_with_id_and_legacy_key() {
        let frame = ClientFrame::parse(r#"{"connect": "abc12345"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Connect {
                session_id: Some("abc12345".into())
            }
        );
        let legacy = ClientFrame::parse(r#"{"__connect": "xyz"}"#).unwrap();
        assert_eq!(
            legacy,
            ClientFrame::Connect {
                session_id: Some("xyz".into())
            }
        );
    }

    #[test]
    fn parse_connect_empty_string_means_no_id() {
        let frame = ClientFrame::parse(r#"{"connect": ""}"#).unwrap();
        assert_eq!(frame, ClientFrame::Connect { session_id: None });
    }

    #[test]
    fn parse_connect_rejects_numbers() {
        assert!(matches!(
            ClientFrame::parse(r#"{"connect": 5}"#),
            Err(ProtocolError::InvalidConnect)
        ));
    }

    #[test]
    fn parse_signal() {
        let frame =
            ClientFrame::parse(r#"{"signal": "run", "payload": {"my_param": "x"}}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Signal {
                signal: "run".into(),
                payload: json!({"my_param": "x"}),
            }
        );
    }

    #[test]
    fn parse_signal_with_null_payload_keeps_null() {
        let frame = ClientFrame::parse(r#"{"signal": "f", "payload": null}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Signal {
                signal: "f".into(),
                payload: Value::Null,
            }
        );
    }

    #[test]
    fn parse_rejects_missing_payload() {
        assert!(matches!(
            ClientFrame::parse(r#"{"signal": "run"}"#),
            Err(ProtocolError::MissingKeys)
        ));
        assert!(matches!(
            ClientFrame::parse(r#"{"payload": 1}"#),
            Err(ProtocolError::MissingKeys)
        ));
    }

    #[test]
    fn parse_rejects_non_objects_and_garbage() {
        assert!(matches!(
            ClientFrame::parse("[1, 2]"),
            Err(ProtocolError::NotAnObject)
        ));
        assert!(matches!(
            ClientFrame::parse("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            ClientFrame::parse(r#"{"signal": 3, "payload": 1}"#),
            Err(ProtocolError::InvalidSignal)
        ));
    }

    #[test]
    fn action_message_shape() {
        let msg = SignalMessage::action("a1", ActionStatus::Start);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"signal": "__action", "payload": {"id": "a1", "status": "start"}})
        );
    }

    #[test]
    fn connect_ack_shape() {
        let msg = SignalMessage::connect_ack("abcd1234");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"signal": "__connect", "payload": {"session_id": "abcd1234"}})
        );
    }

    #[test]
    fn data_change_shape() {
        let msg = SignalMessage::data_change("cli_args", json!(["--flag"]));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"signal": "__data", "payload": {"cli_args": ["--flag"]}})
        );
        assert_eq!(SignalMessage::data_change("gone", Value::Null).payload, json!({"gone": null}));
    }

    #[test]
    fn bus_frame_distinguishes_shapes() {
        let env: BusFrame = serde_json::from_value(json!({
            "session_id": "s1",
            "namespace": "ns",
            "payload": {"signal": "ping", "payload": 1}
        }))
        .unwrap();
        assert!(matches!(env, BusFrame::Envelope(_)));

        let init: BusFrame =
            serde_json::from_value(json!({"namespace": "ns", "publish_on_port": 4242})).unwrap();
        assert_eq!(
            init,
            BusFrame::Init(InitMessage {
                namespace: "ns".into(),
                publish_on_port: 4242
            })
        );

        let ready: BusFrame =
            serde_json::from_value(json!({"namespace": "ns", "ready": true})).unwrap();
        assert!(matches!(ready, BusFrame::Ready(_)));
        assert_eq!(ready.namespace(), "ns");
    }

    #[test]
    fn envelope_without_inner_payload_defaults_to_null() {
        let env: BridgeEnvelope = serde_json::from_value(json!({
            "session_id": "s1",
            "namespace": "ns",
            "payload": {"signal": "__disconnect"}
        }))
        .unwrap();
        assert_eq!(env.payload.payload, Value::Null);
    }
}
