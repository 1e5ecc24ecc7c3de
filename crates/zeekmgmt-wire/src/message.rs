//! WebSocket transport envelopes.
//!
//! After the opening handshake (a JSON array of topic strings sent by
//! the client), every frame carries one envelope distinguished by its
//! `type` key: the peer acks the subscription, then data messages and
//! error reports flow in either direction. A data message flattens the
//! value's tag and payload into the envelope itself alongside the
//! topic.

use serde_json::json;

use crate::error::WireError;
use crate::topic::Topic;
use crate::value::Value;

/// Builds the opening handshake frame for a subscription set.
pub fn handshake(topics: &[Topic]) -> String {
    let names: Vec<&str> = topics.iter().map(Topic::as_str).collect();
    json!(names).to_string()
}

/// Builds an outbound data-message frame.
pub fn data_message(topic: &Topic, value: &Value) -> String {
    let mut encoded = value.encode();
    if let Some(obj) = encoded.as_object_mut() {
        obj.insert("type".to_owned(), json!("data-message"));
        obj.insert("topic".to_owned(), json!(topic.as_str()));
    }
    encoded.to_string()
}

/// One parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// The peer confirmed the handshake; the subscription set is live.
    Ack { endpoint: String, version: String },
    /// A published value on one of our subscribed topics.
    Data { topic: Topic, value: Value },
    /// A broker-level error report.
    Error { code: String, context: String },
}

impl InboundMessage {
    /// Parses one frame, dispatching on the `type` key.
    pub fn from_wire(text: &str) -> Result<Self, WireError> {
        let frame: serde_json::Value = serde_json::from_str(text)
            .map_err(|err| WireError::value(format!("frame is not well-formed JSON: {err}")))?;
        let obj = frame
            .as_object()
            .ok_or_else(|| WireError::value("frame is not a JSON object"))?;
        let kind = obj
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| WireError::value("frame lacks a \"type\" key"))?;

        match kind {
            "ack" => {
                let endpoint = require_str(obj, "endpoint")?;
                let version = require_str(obj, "version")?;
                Ok(InboundMessage::Ack { endpoint, version })
            }
            "data-message" => {
                let topic = require_str(obj, "topic")?;
                // The tag and payload sit beside "type" and "topic";
                // decoding the whole object works because the decoder
                // only looks at its two keys.
                let value = Value::decode(&frame)
                    .map_err(|err| WireError::value(format!("data-message payload: {err}")))?;
                Ok(InboundMessage::Data {
                    topic: Topic::from_wire(topic),
                    value,
                })
            }
            "error" => {
                let code = require_str(obj, "code")?;
                let context = require_str(obj, "context")?;
                Ok(InboundMessage::Error { code, context })
            }
            other => Err(WireError::value(format!(
                "unknown frame type \"{other}\""
            ))),
        }
    }
}

fn require_str(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<String, WireError> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| WireError::value(format!("frame lacks a string \"{key}\" key")))
}
