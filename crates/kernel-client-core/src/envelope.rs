//! Kernel protocol envelope as carried over the websocket channel.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Kernel messaging protocol version written into outbound headers.
pub const PROTOCOL_VERSION: &str = "5.2";

/// JSON object used for content, metadata and header maps.
pub type JsonMap = Map<String, Value>;

/// Channel an envelope travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Request/reply pairs addressed to one requester.
    Shell,
    /// Kernel-wide broadcast of status and outputs.
    Iopub,
    /// Input requests from the kernel.
    Stdin,
    /// Interrupt and shutdown requests.
    Control,
}

impl Channel {
    /// Wire name of the channel.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Iopub => "iopub",
            Self::Stdin => "stdin",
            Self::Control => "control",
        }
    }

    /// Whether this is the broadcast channel.
    #[must_use]
    pub const fn is_broadcast(self) -> bool {
        matches!(self, Self::Iopub)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message header.
///
/// Inbound headers only need `msg_id` and `msg_type`; the remaining
/// fields default to empty strings. Keys this type does not know about
/// (`username`, `subshell_id`, ...) round-trip through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Unique id of this message.
    pub msg_id: String,
    /// Session of the sending client.
    #[serde(default)]
    pub session: String,
    /// Messaging protocol version.
    #[serde(default)]
    pub version: String,
    /// RFC 3339 creation timestamp.
    #[serde(default)]
    pub date: String,
    /// Message kind, e.g. `execute_request` or `status`.
    pub msg_type: String,
    /// Any other header keys.
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// One protocol message unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Binary buffers attached to the message.
    #[serde(default)]
    pub buffers: Vec<Value>,
    /// Channel the message travels on.
    pub channel: Channel,
    /// This message's header.
    pub header: Header,
    /// Header of the request being answered; empty when unsolicited.
    pub parent_header: JsonMap,
    /// Message-type specific payload.
    #[serde(default)]
    pub content: JsonMap,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: JsonMap,
}

impl Envelope {
    /// Decode an envelope from a websocket text frame.
    ///
    /// # Errors
    /// Returns `ProtocolViolation` if the text is not JSON or lacks
    /// required envelope fields.
    pub fn from_json(text: &str) -> Result<Self, ProtocolViolation> {
        serde_json::from_str(text).map_err(ProtocolViolation::Decode)
    }

    /// Encode the envelope as a JSON string.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The header's `msg_id`.
    #[must_use]
    pub fn msg_id(&self) -> &str {
        &self.header.msg_id
    }

    /// The header's `msg_type`.
    #[must_use]
    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    /// `msg_id` of the request this envelope replies to.
    ///
    /// Unsolicited messages (e.g. the `starting` status) carry an empty
    /// parent header and return `None`.
    #[must_use]
    pub fn parent_msg_id(&self) -> Option<&str> {
        self.parent_header.get("msg_id").and_then(Value::as_str)
    }

    /// Whether this envelope answers the request with the given `msg_id`.
    #[must_use]
    pub fn is_reply_to(&self, msg_id: &str) -> bool {
        self.parent_msg_id() == Some(msg_id)
    }

    /// `content.execution_state`, if present.
    #[must_use]
    pub fn execution_state(&self) -> Option<&str> {
        self.content.get("execution_state").and_then(Value::as_str)
    }

    /// Whether this envelope reports the kernel as idle.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.execution_state() == Some("idle")
    }
}

/// Malformed inbound envelope.
#[derive(Debug, Error)]
pub enum ProtocolViolation {
    #[error("Undecodable envelope: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("Malformed {msg_type} content: {source}")]
    Content {
        msg_type: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unexpected binary frame that is not UTF-8")]
    NonUtf8Frame,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn status(parent: &str, state: &str) -> Value {
        json!({
            "channel": "iopub",
            "header": {"msg_id": "s1", "msg_type": "status", "session": "k", "version": "5.3", "date": "now", "username": "kernel"},
            "parent_header": {"msg_id": parent},
            "content": {"execution_state": state},
            "metadata": {},
            "msg_id": "s1",
            "msg_type": "status",
        })
    }

    #[test]
    fn test_decode_inbound_status() {
        let env = Envelope::from_json(&status("req-1", "idle").to_string()).unwrap();
        assert_eq!(env.channel, Channel::Iopub);
        assert_eq!(env.msg_type(), "status");
        assert!(env.is_reply_to("req-1"));
        assert!(!env.is_reply_to("req-2"));
        assert!(env.is_idle());
        assert!(env.buffers.is_empty());
        assert_eq!(env.header.extra.get("username"), Some(&json!("kernel")));
    }

    #[test]
    fn test_empty_parent_header_has_no_parent_id() {
        let mut value = status("x", "starting");
        value["parent_header"] = json!({});
        let env: Envelope = serde_json::from_value(value).unwrap();
        assert_eq!(env.parent_msg_id(), None);
        assert!(!env.is_idle());
    }

    #[test]
    fn test_missing_fields_are_protocol_violations() {
        let err = Envelope::from_json(r#"{"channel": "iopub", "content": {}}"#).unwrap_err();
        assert!(matches!(err, ProtocolViolation::Decode(_)));

        let err = Envelope::from_json("not json").unwrap_err();
        assert!(matches!(err, ProtocolViolation::Decode(_)));

        let mut value = status("x", "idle");
        value["channel"] = json!("heartbeat");
        assert!(serde_json::from_value::<Envelope>(value).is_err());
    }

    #[test]
    fn test_wire_shape() {
        let env: Envelope = serde_json::from_value(status("p", "busy")).unwrap();
        let encoded: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(encoded["channel"], "iopub");
        assert_eq!(encoded["header"]["username"], "kernel");
        assert_eq!(encoded["buffers"], json!([]));
        assert!(encoded.get("msg_type").is_none());
    }
}
