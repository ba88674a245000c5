//! Envelope, the record exchanged between peers.
//!
//! On the wire an envelope is a JSON object:
//!
//! ```text
//! { "sender": "<peer id>", "no": 7, "sessionId": "open-peer-channel:*",
//!   "type": "tick", "data": {...}, "internal": false, "error": "..." }
//! ```
//!
//! `sender`, `no`, `sessionId`, `type` and `data` must be present. Anything
//! that does not decode into an [`Envelope`] is not part of the protocol and
//! gets dropped by the receiver.

use crate::error::WireError;
use openpeer_types::{PeerId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Internal type of the self-registration handshake.
pub const SELF_REGISTER: &str = "SelfRegister";
/// Internal type of a remote procedure call request.
pub const REMOTE_CALL: &str = "RemoteCall";
/// Internal type of a remote procedure call result.
pub const REMOTE_CALL_RESULT: &str = "RemoteCallResult";

/// A wire protocol envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Identity of the sending channel.
    pub sender: PeerId,
    /// Sequence number. Fresh for requests, echoed for replies.
    pub no: u64,
    /// Session the sender belongs to.
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    /// Event type, or one of the reserved internal types.
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload. May be `null` but must be present.
    pub data: Value,
    /// Protocol-control envelope (handshake or RPC).
    #[serde(default)]
    pub internal: bool,
    /// Failure message, only set on failed call results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload of a `RemoteCall` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Name of the registered procedure to run.
    pub verb: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

/// What a validated envelope means to the receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Handshake request or acknowledgment.
    SelfRegister,
    /// Run a registered procedure and reply.
    RemoteCall(CallRequest),
    /// Outcome of a call we issued: the return value or the failure message.
    RemoteCallResult(Result<Value, String>),
    /// Internal envelope of a type this version does not know.
    UnknownInternal(String),
    /// Application event.
    Event { kind: String, data: Value },
    /// Internal envelope whose payload has the wrong shape.
    Malformed(String),
}

impl Envelope {
    /// Build an envelope with no error.
    pub fn new(
        sender: PeerId,
        no: u64,
        session_id: SessionId,
        kind: impl Into<String>,
        data: Value,
        internal: bool,
    ) -> Self {
        Self {
            sender,
            no,
            session_id,
            kind: kind.into(),
            data,
            internal,
            error: None,
        }
    }

    /// Attach a failure message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Validate an arbitrary inbound value.
    ///
    /// Only JSON objects carrying all required fields are accepted; arrays
    /// are rejected even though serde would map them positionally.
    pub fn from_value(value: Value) -> Result<Self, WireError> {
        if !value.is_object() {
            return Err(WireError::Malformed("not an object".to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Serialize to a JSON value, for transports that carry structured data.
    pub fn to_value(&self) -> Result<Value, WireError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Classify the envelope. Called once per inbound message.
    pub fn classify(&self) -> Inbound {
        if !self.internal {
            return Inbound::Event {
                kind: self.kind.clone(),
                data: self.data.clone(),
            };
        }
        match self.kind.as_str() {
            SELF_REGISTER => Inbound::SelfRegister,
            REMOTE_CALL => match CallRequest::from_data(&self.data) {
                Some(request) => Inbound::RemoteCall(request),
                None => Inbound::Malformed(format!("{REMOTE_CALL} payload: {}", self.data)),
            },
            REMOTE_CALL_RESULT => match self.error.as_deref() {
                Some(message) if !message.is_empty() => {
                    Inbound::RemoteCallResult(Err(message.to_string()))
                }
                _ => Inbound::RemoteCallResult(Ok(self.data.clone())),
            },
            other => Inbound::UnknownInternal(other.to_string()),
        }
    }
}

impl CallRequest {
    /// Build a request for `verb` with positional arguments.
    pub fn new(verb: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            verb: verb.into(),
            args,
        }
    }

    /// Accept either `{ "verb": ..., "args": [...] }` or a bare verb string.
    fn from_data(data: &Value) -> Option<Self> {
        match data {
            Value::String(verb) => Some(Self::new(verb.clone(), Vec::new())),
            Value::Object(_) => serde_json::from_value(data.clone()).ok(),
            _ => None,
        }
    }
}

/// Encode an envelope as JSON bytes.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, WireError> {
    Ok(serde_json::to_vec(envelope)?)
}

/// Decode JSON bytes into an envelope.
pub fn decode_envelope(body: &[u8]) -> Result<Envelope, WireError> {
    let value: Value = serde_json::from_slice(body)?;
    Envelope::from_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(kind: &str, data: Value, internal: bool) -> Envelope {
        Envelope::new(
            PeerId::from("peer-a"),
            1,
            SessionId::default(),
            kind,
            data,
            internal,
        )
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(envelope("tick", json!({"n": 1}), false)).unwrap();
        assert_eq!(
            json,
            json!({
                "sender": "peer-a",
                "no": 1,
                "sessionId": "open-peer-channel:*",
                "type": "tick",
                "data": {"n": 1},
                "internal": false,
            })
        );
    }

    #[test]
    fn test_error_serialized_only_when_set() {
        let env = envelope(REMOTE_CALL_RESULT, Value::Null, true).with_error("boom");
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["error"], "boom");
        assert_eq!(json["data"], Value::Null);
    }

    #[test]
    fn test_missing_required_field_rejected() {
        for field in ["sender", "no", "sessionId", "type", "data"] {
            let mut value = serde_json::to_value(envelope("x", json!(1), false)).unwrap();
            value.as_object_mut().unwrap().remove(field);
            assert!(
                Envelope::from_value(value).is_err(),
                "envelope without {field} must be rejected"
            );
        }
    }

    #[test]
    fn test_null_data_is_present() {
        let value = json!({
            "sender": "p", "no": 3, "sessionId": "open-peer-channel:*",
            "type": "x", "data": null
        });
        let env = Envelope::from_value(value).unwrap();
        assert_eq!(env.data, Value::Null);
        assert!(!env.internal);
        assert_eq!(env.error, None);
    }

    #[test]
    fn test_non_objects_rejected() {
        assert!(Envelope::from_value(json!("hello")).is_err());
        assert!(Envelope::from_value(json!(42)).is_err());
        assert!(Envelope::from_value(json!(["p", 1, "s", "t", null, false])).is_err());
    }

    #[test]
    fn test_extra_fields_ignored() {
        let value = json!({
            "sender": "p", "no": 3, "sessionId": "s", "type": "x",
            "data": 1, "origin": "https://example.com"
        });
        assert!(Envelope::from_value(value).is_ok());
    }

    #[test]
    fn test_classify_event() {
        let inbound = envelope("tick", json!({"n": 1}), false).classify();
        assert_eq!(
            inbound,
            Inbound::Event {
                kind: "tick".to_string(),
                data: json!({"n": 1})
            }
        );
    }

    #[test]
    fn test_reserved_type_without_internal_flag_is_an_event() {
        let inbound = envelope(SELF_REGISTER, Value::Null, false).classify();
        assert!(matches!(inbound, Inbound::Event { .. }));
    }

    #[test]
    fn test_classify_remote_call() {
        let inbound =
            envelope(REMOTE_CALL, json!({"verb": "add", "args": [1, 2]}), true).classify();
        assert_eq!(
            inbound,
            Inbound::RemoteCall(CallRequest::new("add", vec![json!(1), json!(2)]))
        );
    }

    #[test]
    fn test_classify_bare_string_call() {
        let inbound = envelope(REMOTE_CALL, json!("greet"), true).classify();
        assert_eq!(inbound, Inbound::RemoteCall(CallRequest::new("greet", vec![])));
    }

    #[test]
    fn test_classify_malformed_call() {
        let inbound = envelope(REMOTE_CALL, json!(17), true).classify();
        assert!(matches!(inbound, Inbound::Malformed(_)));
        let inbound = envelope(REMOTE_CALL, json!({"args": []}), true).classify();
        assert!(matches!(inbound, Inbound::Malformed(_)));
    }

    #[test]
    fn test_classify_call_result() {
        let ok = envelope(REMOTE_CALL_RESULT, json!("hi"), true).classify();
        assert_eq!(ok, Inbound::RemoteCallResult(Ok(json!("hi"))));

        let err = envelope(REMOTE_CALL_RESULT, Value::Null, true)
            .with_error("greet is not defined")
            .classify();
        assert_eq!(
            err,
            Inbound::RemoteCallResult(Err("greet is not defined".to_string()))
        );
    }

    #[test]
    fn test_classify_unknown_internal() {
        let inbound = envelope("Heartbeat", Value::Null, true).classify();
        assert_eq!(inbound, Inbound::UnknownInternal("Heartbeat".to_string()));
    }

    #[test]
    fn test_codec_bytes() {
        let env = envelope(REMOTE_CALL, json!({"verb": "greet", "args": []}), true);
        let bytes = encode_envelope(&env).unwrap();
        assert_eq!(decode_envelope(&bytes).unwrap(), env);
        assert!(decode_envelope(b"not json").is_err());
    }
}
