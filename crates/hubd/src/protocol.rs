//! # Wire Protocol
//!
//! Hub messages as UTF-8 JSON objects, each terminated by the ASCII record
//! separator (`0x1E`). The `type` field selects the message kind.
//!
//! ## Inbound
//! - `1` invocation: `target`, `arguments`, optional `invocationId`.
//! - `4` stream invocation: as `1`, but `invocationId` is required.
//! - `5` cancel invocation: `invocationId`.
//! - `6` ping, `7` close.
//!
//! ## Outbound
//! - `1` invocation, `2` stream item, `3` completion, `6` ping, `7` close.

use std::fmt;

use hubcore::Completion;
use hubcore::Message;
use hubcore::Value;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Number;
use serde_json::json;

pub const RECORD_SEPARATOR: u8 = 0x1E;

const INVOCATION: u8 = 1;
const STREAM_ITEM: u8 = 2;
const COMPLETION: u8 = 3;
const STREAM_INVOCATION: u8 = 4;
const CANCEL_INVOCATION: u8 = 5;
const PING: u8 = 6;
const CLOSE: u8 = 7;

#[derive(Debug)]
pub enum Error {
    /// The frame was not a JSON object of the expected layout.
    Json(serde_json::Error),
    /// The `type` field named no known inbound message.
    UnknownType(u8),
    /// A field required by the message type was absent.
    MissingField { message_type: u8, field: &'static str },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "Malformed frame: {}", e),
            Self::UnknownType(t) => write!(f, "Unknown message type {}", t),
            Self::MissingField { message_type, field } => {
                write!(f, "Message type {} requires field '{}'", message_type, field)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A decoded client-to-server message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Invocation { invocation_id: Option<String>, target: String, arguments: Vec<Value> },
    StreamInvocation { invocation_id: String, target: String, arguments: Vec<Value> },
    CancelInvocation { invocation_id: String },
    Ping,
    Close { error: Option<String> },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(rename = "type")]
    message_type: u8,
    #[serde(default)]
    invocation_id: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Decodes one frame, without its terminator.
pub fn decode(frame: &[u8]) -> Result<Inbound> {
    let raw: RawFrame = serde_json::from_slice(frame)?;
    let message_type = raw.message_type;
    let required = |value: Option<String>, field: &'static str| value.ok_or(Error::MissingField { message_type, field });

    let inbound = match message_type {
        INVOCATION => Inbound::Invocation {
            invocation_id: raw.invocation_id,
            target: required(raw.target, "target")?,
            arguments: raw.arguments.into_iter().map(from_json).collect(),
        },
        STREAM_INVOCATION => Inbound::StreamInvocation {
            invocation_id: required(raw.invocation_id, "invocationId")?,
            target: required(raw.target, "target")?,
            arguments: raw.arguments.into_iter().map(from_json).collect(),
        },
        CANCEL_INVOCATION => Inbound::CancelInvocation { invocation_id: required(raw.invocation_id, "invocationId")? },
        PING => Inbound::Ping,
        CLOSE => Inbound::Close { error: raw.error },
        other => return Err(Error::UnknownType(other)),
    };
    Ok(inbound)
}

/// Encodes a hub message as a terminated frame.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    let frame = match message {
        Message::Invocation { method, args } => json!({
            "type": INVOCATION,
            "target": method,
            "arguments": args.iter().map(to_json).collect::<Vec<_>>(),
        }),
        Message::StreamItem { token, item } => json!({
            "type": STREAM_ITEM,
            "invocationId": token,
            "item": to_json(item),
        }),
        Message::Completion { token, completion } => match completion {
            Completion::Void => json!({ "type": COMPLETION, "invocationId": token }),
            Completion::Value(value) => json!({
                "type": COMPLETION,
                "invocationId": token,
                "result": to_json(value),
            }),
            Completion::Failed(failure) => json!({
                "type": COMPLETION,
                "invocationId": token,
                "error": failure.message,
                "errorKind": failure.kind.as_str(),
            }),
        },
    };
    terminate(&frame)
}

/// The keep-alive frame.
pub fn encode_ping() -> Result<Vec<u8>> {
    terminate(&json!({ "type": PING }))
}

pub fn encode_close(error: Option<&str>) -> Result<Vec<u8>> {
    match error {
        Some(error) => terminate(&json!({ "type": CLOSE, "error": error })),
        None => terminate(&json!({ "type": CLOSE })),
    }
}

fn terminate(frame: &serde_json::Value) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(frame)?;
    bytes.push(RECORD_SEPARATOR);
    Ok(bytes)
}

/// Integral numbers become `Int`; anything else numeric becomes `Float`.
pub fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(fields) => Value::Record(fields.into_iter().map(|(k, v)| (k, from_json(v))).collect()),
    }
}

/// Non-finite floats have no JSON form and are sent as `null`.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number(Number::from(*i)),
        Value::Float(f) => Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Record(fields) => {
            serde_json::Value::Object(fields.iter().map(|(k, v)| (k.clone(), to_json(v))).collect::<Map<_, _>>())
        }
    }
}

#[cfg(test)]
mod tests {
    use hubcore::Failure;
    use hubcore::FailureKind;

    use super::*;

    fn parse(frame: &[u8]) -> serde_json::Value {
        assert_eq!(frame.last(), Some(&RECORD_SEPARATOR));
        serde_json::from_slice(&frame[..frame.len() - 1]).unwrap()
    }

    #[test]
    fn test_decode_invocation() {
        let frame = br#"{"type":1,"invocationId":"7","target":"Send","arguments":["a",2,2.5,{"x":null}]}"#;
        let expected = Inbound::Invocation {
            invocation_id: Some("7".into()),
            target: "Send".into(),
            arguments: vec![
                Value::String("a".into()),
                Value::Int(2),
                Value::Float(2.5),
                Value::record([("x", Value::Null)]),
            ],
        };
        assert_eq!(decode(frame).unwrap(), expected);
    }

    #[test]
    fn test_decode_non_blocking_invocation() {
        let frame = br#"{"type":1,"target":"Send","arguments":[]}"#;
        match decode(frame).unwrap() {
            Inbound::Invocation { invocation_id, arguments, .. } => {
                assert_eq!(invocation_id, None);
                assert!(arguments.is_empty());
            }
            other => panic!("Expected invocation, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_stream_invocation_requires_id() {
        let frame = br#"{"type":4,"target":"StreamCounterValuesToClient","arguments":[3,10]}"#;
        let err = decode(frame).unwrap_err();
        assert!(matches!(err, Error::MissingField { message_type: 4, field: "invocationId" }));
    }

    #[test]
    fn test_decode_control_messages() {
        assert_eq!(
            decode(br#"{"type":5,"invocationId":"s"}"#).unwrap(),
            Inbound::CancelInvocation { invocation_id: "s".into() }
        );
        assert_eq!(decode(br#"{"type":6}"#).unwrap(), Inbound::Ping);
        assert_eq!(decode(br#"{"type":7}"#).unwrap(), Inbound::Close { error: None });
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(b"not json"), Err(Error::Json(_))));
        assert!(matches!(decode(br#"{"type":42}"#), Err(Error::UnknownType(42))));
        assert!(matches!(decode(br#"{"target":"Send"}"#), Err(Error::Json(_))));
    }

    #[test]
    fn test_encode_completions() {
        let void = Message::Completion { token: "1".into(), completion: Completion::Void };
        assert_eq!(parse(&encode(&void).unwrap()), json!({ "type": 3, "invocationId": "1" }));

        let failed = Message::Completion {
            token: "2".into(),
            completion: Completion::Failed(Failure { kind: FailureKind::MethodNotFound, message: "nope".into() }),
        };
        assert_eq!(
            parse(&encode(&failed).unwrap()),
            json!({ "type": 3, "invocationId": "2", "error": "nope", "errorKind": "MethodNotFound" })
        );
    }

    #[test]
    fn test_encode_invocation_and_item() {
        let invocation = Message::Invocation {
            method: "OnMessage".into(),
            args: vec![Value::String("a".into()), Value::Null],
        };
        assert_eq!(
            parse(&encode(&invocation).unwrap()),
            json!({ "type": 1, "target": "OnMessage", "arguments": ["a", null] })
        );

        let item = Message::StreamItem { token: "s".into(), item: Value::Float(f64::NAN) };
        assert_eq!(parse(&encode(&item).unwrap()), json!({ "type": 2, "invocationId": "s", "item": null }));
    }

    #[test]
    fn test_encode_ping_and_close() {
        assert_eq!(parse(&encode_ping().unwrap()), json!({ "type": 6 }));
        assert_eq!(parse(&encode_close(Some("bye")).unwrap()), json!({ "type": 7, "error": "bye" }));
    }
}
