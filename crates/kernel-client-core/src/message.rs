//! Envelope construction with protocol header defaults.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::envelope::{Channel, Envelope, Header, JsonMap, PROTOCOL_VERSION};
use crate::error::ConfigurationError;

/// Content of an `execute_request`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteRequest {
    pub silent: bool,
    pub store_history: bool,
    pub user_expressions: JsonMap,
    pub allow_stdin: bool,
    pub stop_on_error: bool,
    pub code: String,
}

impl ExecuteRequest {
    /// Request content with the client's default flags.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            silent: false,
            store_history: true,
            user_expressions: JsonMap::new(),
            allow_stdin: true,
            stop_on_error: true,
            code: code.into(),
        }
    }
}

impl From<ExecuteRequest> for JsonMap {
    fn from(req: ExecuteRequest) -> Self {
        // plain struct of bools, strings and a map; serializes to an object
        match serde_json::to_value(req) {
            Ok(Value::Object(map)) => map,
            _ => Self::new(),
        }
    }
}

/// Builds envelopes stamped with one client session id.
#[derive(Debug, Clone)]
pub struct MessageFactory {
    session_id: String,
}

impl MessageFactory {
    /// Create a factory for the given session.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }

    /// Session id written into every header.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Start building an envelope on `channel`.
    #[must_use]
    pub fn envelope(&self, channel: Channel) -> EnvelopeBuilder<'_> {
        EnvelopeBuilder {
            factory: self,
            channel,
            msg_type: None,
            header: None,
            content: None,
            buffers: None,
            metadata: None,
            parent_header: None,
        }
    }

    /// `execute_request` for `code` on the shell channel.
    ///
    /// # Errors
    /// Never fails in practice; the msg_type is always set.
    pub fn execute_request(&self, code: &str) -> Result<Envelope, ConfigurationError> {
        self.envelope(Channel::Shell)
            .msg_type("execute_request")
            .content(ExecuteRequest::new(code).into())
            .build()
    }

    /// `kernel_info_request` on the shell channel.
    ///
    /// # Errors
    /// Never fails in practice; the msg_type is always set.
    pub fn kernel_info_request(&self) -> Result<Envelope, ConfigurationError> {
        self.envelope(Channel::Shell)
            .msg_type("kernel_info_request")
            .build()
    }
}

/// Builder returned by [`MessageFactory::envelope`].
#[derive(Debug)]
#[must_use]
pub struct EnvelopeBuilder<'a> {
    factory: &'a MessageFactory,
    channel: Channel,
    msg_type: Option<String>,
    header: Option<JsonMap>,
    content: Option<JsonMap>,
    buffers: Option<Vec<Value>>,
    metadata: Option<JsonMap>,
    parent_header: Option<JsonMap>,
}

impl EnvelopeBuilder<'_> {
    /// Message type; overrides any `msg_type` in a supplied header.
    pub fn msg_type(mut self, msg_type: impl Into<String>) -> Self {
        self.msg_type = Some(msg_type.into());
        self
    }

    /// Partial header. Missing keys are filled with defaults at build time.
    pub fn header(mut self, header: JsonMap) -> Self {
        self.header = Some(header);
        self
    }

    pub fn content(mut self, content: JsonMap) -> Self {
        self.content = Some(content);
        self
    }

    pub fn buffers(mut self, buffers: Vec<Value>) -> Self {
        self.buffers = Some(buffers);
        self
    }

    pub fn metadata(mut self, metadata: JsonMap) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn parent_header(mut self, parent_header: JsonMap) -> Self {
        self.parent_header = Some(parent_header);
        self
    }

    /// Resolve the header and assemble the envelope.
    ///
    /// # Errors
    /// Returns `ConfigurationError::MissingMsgType` if neither the builder
    /// nor the supplied header names a non-empty msg_type, and
    /// `ConfigurationError::InvalidHeader` if a supplied header field has
    /// the wrong type.
    pub fn build(self) -> Result<Envelope, ConfigurationError> {
        let mut header = self.header.unwrap_or_default();
        header
            .entry("msg_id")
            .or_insert_with(|| Uuid::new_v4().to_string().into());
        header
            .entry("session")
            .or_insert_with(|| self.factory.session_id.clone().into());
        header
            .entry("version")
            .or_insert_with(|| PROTOCOL_VERSION.into());
        header
            .entry("date")
            .or_insert_with(|| Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true).into());
        if let Some(msg_type) = self.msg_type {
            header.insert("msg_type".into(), msg_type.into());
        }
        let has_msg_type = header
            .get("msg_type")
            .and_then(Value::as_str)
            .is_some_and(|t| !t.is_empty());
        if !has_msg_type {
            return Err(ConfigurationError::MissingMsgType);
        }

        let header: Header = serde_json::from_value(Value::Object(header))
            .map_err(ConfigurationError::InvalidHeader)?;

        Ok(Envelope {
            buffers: self.buffers.unwrap_or_default(),
            channel: self.channel,
            header,
            parent_header: self.parent_header.unwrap_or_default(),
            content: self.content.unwrap_or_default(),
            metadata: self.metadata.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> JsonMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_defaults_filled() {
        let factory = MessageFactory::new("session-a");
        let env = factory.kernel_info_request().unwrap();

        assert_eq!(env.channel, Channel::Shell);
        assert_eq!(env.header.msg_type, "kernel_info_request");
        assert_eq!(env.header.session, "session-a");
        assert_eq!(env.header.version, "5.2");
        assert!(env.header.date.ends_with('Z'));
        assert!(Uuid::parse_str(&env.header.msg_id).is_ok());
        assert!(env.content.is_empty());
        assert!(env.parent_header.is_empty());
    }

    #[test]
    fn test_msg_ids_are_unique() {
        let factory = MessageFactory::new("s");
        let a = factory.kernel_info_request().unwrap();
        let b = factory.kernel_info_request().unwrap();
        assert_ne!(a.msg_id(), b.msg_id());
    }

    #[test]
    fn test_supplied_header_fields_are_kept() {
        let factory = MessageFactory::new("s");
        let env = factory
            .envelope(Channel::Control)
            .header(map(json!({
                "msg_id": "fixed",
                "date": "2020-01-01T00:00:00Z",
                "msg_type": "interrupt_request",
                "username": "someone",
            })))
            .build()
            .unwrap();

        assert_eq!(env.msg_id(), "fixed");
        assert_eq!(env.header.date, "2020-01-01T00:00:00Z");
        assert_eq!(env.msg_type(), "interrupt_request");
        assert_eq!(env.header.session, "s");
        assert_eq!(env.header.extra.get("username"), Some(&json!("someone")));
    }

    #[test]
    fn test_explicit_msg_type_overrides_header() {
        let factory = MessageFactory::new("s");
        let env = factory
            .envelope(Channel::Shell)
            .header(map(json!({"msg_type": "old"})))
            .msg_type("new")
            .build()
            .unwrap();
        assert_eq!(env.msg_type(), "new");
    }

    #[test]
    fn test_missing_msg_type_is_rejected() {
        let factory = MessageFactory::new("s");
        let err = factory.envelope(Channel::Shell).build().unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingMsgType));

        let err = factory
            .envelope(Channel::Shell)
            .header(map(json!({"msg_type": ""})))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingMsgType));
    }

    #[test]
    fn test_execute_request_content() {
        let factory = MessageFactory::new("s");
        let env = factory.execute_request("1 + 1").unwrap();
        assert_eq!(
            Value::Object(env.content),
            json!({
                "silent": false,
                "store_history": true,
                "user_expressions": {},
                "allow_stdin": true,
                "stop_on_error": true,
                "code": "1 + 1",
            })
        );
    }

    #[test]
    fn test_execute_request_flags_reach_content() {
        let mut request = ExecuteRequest::new("x");
        request.silent = true;
        request.store_history = false;
        request.user_expressions.insert("y".into(), json!("1 + 1"));

        let content = JsonMap::from(request);
        assert_eq!(content["silent"], json!(true));
        assert_eq!(content["store_history"], json!(false));
        assert_eq!(content["user_expressions"], json!({"y": "1 + 1"}));
        assert_eq!(content.len(), 6);
    }
}
