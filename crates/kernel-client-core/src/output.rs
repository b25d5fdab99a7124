//! Classification and accumulation of broadcast-channel outputs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::{Envelope, JsonMap, ProtocolViolation};

/// `stream` content.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamContent {
    /// `stdout` or `stderr`.
    pub name: String,
    pub text: String,
}

/// `execute_result` / `display_data` content.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataContent {
    pub data: JsonMap,
    #[serde(default)]
    pub metadata: JsonMap,
    #[serde(default)]
    pub execution_count: Option<i64>,
}

/// `error` content.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorContent {
    pub ename: String,
    pub evalue: String,
    pub traceback: Vec<String>,
}

/// Typed view of a broadcast envelope, keyed by msg_type.
#[derive(Debug, Clone, PartialEq)]
pub enum IopubContent {
    /// Kernel state change (`busy`, `idle`, `starting`).
    Status { execution_state: Option<String> },
    /// Echo of the code being run.
    ExecuteInput { code: Option<String>, execution_count: Option<i64> },
    /// Text written to stdout or stderr.
    Stream(StreamContent),
    /// Value of the last expression.
    ExecuteResult(DataContent),
    /// Rich output shown during execution.
    DisplayData(DataContent),
    /// Uncaught exception.
    Error(ErrorContent),
    /// Any msg_type this client does not interpret.
    Other { msg_type: String, content: JsonMap },
}

impl IopubContent {
    /// Decode an envelope's content according to its msg_type.
    ///
    /// # Errors
    /// Returns `ProtocolViolation::Content` if an output message lacks
    /// the fields its type requires.
    pub fn parse(envelope: &Envelope) -> Result<Self, ProtocolViolation> {
        let msg_type = envelope.msg_type();
        let content = &envelope.content;
        let parsed = match msg_type {
            "status" => Self::Status {
                execution_state: envelope.execution_state().map(str::to_owned),
            },
            "execute_input" => Self::ExecuteInput {
                code: content.get("code").and_then(Value::as_str).map(str::to_owned),
                execution_count: content.get("execution_count").and_then(Value::as_i64),
            },
            "stream" => Self::Stream(decode(msg_type, content)?),
            "execute_result" => Self::ExecuteResult(decode(msg_type, content)?),
            "display_data" => Self::DisplayData(decode(msg_type, content)?),
            "error" => Self::Error(decode(msg_type, content)?),
            _ => Self::Other {
                msg_type: msg_type.to_owned(),
                content: content.clone(),
            },
        };
        Ok(parsed)
    }

    /// The output record this message contributes, if any.
    #[must_use]
    pub fn into_output(self) -> Option<OutputRecord> {
        match self {
            Self::Stream(StreamContent { name, text }) => Some(OutputRecord::Stream { name, text }),
            Self::ExecuteResult(DataContent {
                data,
                metadata,
                execution_count,
            }) => Some(OutputRecord::ExecuteResult {
                data,
                metadata,
                execution_count,
            }),
            Self::DisplayData(DataContent { data, metadata, .. }) => {
                Some(OutputRecord::DisplayData { data, metadata })
            }
            Self::Error(ErrorContent {
                ename,
                evalue,
                traceback,
            }) => Some(OutputRecord::Error {
                ename,
                evalue,
                traceback,
            }),
            Self::Status { .. } | Self::ExecuteInput { .. } | Self::Other { .. } => None,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    msg_type: &str,
    content: &JsonMap,
) -> Result<T, ProtocolViolation> {
    serde_json::from_value(Value::Object(content.clone())).map_err(|source| {
        ProtocolViolation::Content {
            msg_type: msg_type.to_owned(),
            source,
        }
    })
}

/// One classified unit of program output, in notebook output shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum OutputRecord {
    /// Text from a named stream.
    Stream {
        name: String,
        text: String,
    },
    /// Result value keyed by mime type.
    ExecuteResult {
        data: JsonMap,
        metadata: JsonMap,
        execution_count: Option<i64>,
    },
    /// Displayed value keyed by mime type.
    DisplayData {
        data: JsonMap,
        metadata: JsonMap,
    },
    /// Exception name, value and formatted traceback.
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

/// Outputs and execution counter of one execute call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Outputs in arrival order.
    pub outputs: Vec<OutputRecord>,
    /// Last non-zero counter reported by the kernel.
    pub execution_count: Option<i64>,
}

/// Accumulates outputs from broadcast envelopes until the kernel is idle.
#[derive(Debug, Default)]
pub struct OutputAggregator {
    outputs: Vec<OutputRecord>,
    execution_count: Option<i64>,
}

impl OutputAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one envelope into the aggregate.
    ///
    /// Returns `true` once the envelope reports the kernel idle. Only
    /// broadcast envelopes are inspected; an idle status is never
    /// recorded as output.
    ///
    /// # Errors
    /// Returns `ProtocolViolation` for output messages with malformed
    /// content.
    pub fn process(&mut self, envelope: &Envelope) -> Result<bool, ProtocolViolation> {
        if !envelope.channel.is_broadcast() {
            return Ok(false);
        }
        if envelope.is_idle() {
            return Ok(true);
        }

        if let Some(record) = IopubContent::parse(envelope)?.into_output() {
            tracing::trace!(msg_type = envelope.msg_type(), "recorded output");
            self.outputs.push(record);
        }

        // 0 and null are not counts
        if let Some(count) = envelope
            .content
            .get("execution_count")
            .and_then(Value::as_i64)
            .filter(|count| *count != 0)
        {
            self.execution_count = Some(count);
        }

        Ok(false)
    }

    /// Snapshot of the accumulated outputs.
    #[must_use]
    pub fn result(&self) -> ExecutionResult {
        ExecutionResult {
            outputs: self.outputs.clone(),
            execution_count: self.execution_count,
        }
    }

    /// Consume the aggregator into its result.
    #[must_use]
    pub fn into_result(self) -> ExecutionResult {
        ExecutionResult {
            outputs: self.outputs,
            execution_count: self.execution_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::envelope::Channel;

    fn envelope(channel: &str, msg_type: &str, content: Value) -> Envelope {
        serde_json::from_value(json!({
            "channel": channel,
            "header": {"msg_id": "m", "msg_type": msg_type},
            "parent_header": {"msg_id": "req"},
            "content": content,
            "metadata": {},
        }))
        .unwrap()
    }

    #[test]
    fn test_stream_then_idle() {
        let mut agg = OutputAggregator::new();
        assert!(!agg.process(&envelope("iopub", "status", json!({"execution_state": "busy"}))).unwrap());
        assert!(!agg
            .process(&envelope("iopub", "execute_input", json!({"code": "print(1)", "execution_count": 1})))
            .unwrap());
        assert!(!agg
            .process(&envelope("iopub", "stream", json!({"name": "stdout", "text": "1\n"})))
            .unwrap());
        assert!(agg.process(&envelope("iopub", "status", json!({"execution_state": "idle"}))).unwrap());

        let result = agg.result();
        assert_eq!(result.execution_count, Some(1));
        assert_eq!(
            result.outputs,
            vec![OutputRecord::Stream {
                name: "stdout".into(),
                text: "1\n".into()
            }]
        );
    }

    #[test]
    fn test_non_broadcast_is_ignored() {
        let mut agg = OutputAggregator::new();
        let reply = envelope(
            "shell",
            "execute_reply",
            json!({"status": "ok", "execution_count": 7, "execution_state": "idle"}),
        );
        assert!(!agg.process(&reply).unwrap());
        assert_eq!(agg.result(), ExecutionResult::default());
    }

    #[test]
    fn test_idle_is_never_recorded() {
        let mut agg = OutputAggregator::new();
        let odd = envelope(
            "iopub",
            "stream",
            json!({"name": "stdout", "text": "x", "execution_state": "idle", "execution_count": 3}),
        );
        assert!(agg.process(&odd).unwrap());
        assert!(agg.result().outputs.is_empty());
        assert_eq!(agg.result().execution_count, None);
    }

    #[test]
    fn test_execution_count_last_write_wins_and_ignores_zero() {
        let mut agg = OutputAggregator::new();
        agg.process(&envelope("iopub", "execute_input", json!({"code": "", "execution_count": 4})))
            .unwrap();
        agg.process(&envelope(
            "iopub",
            "execute_result",
            json!({"data": {"text/plain": "2"}, "metadata": {}, "execution_count": 5}),
        ))
        .unwrap();
        agg.process(&envelope("iopub", "execute_input", json!({"code": "", "execution_count": 0})))
            .unwrap();
        agg.process(&envelope("iopub", "execute_input", json!({"code": "", "execution_count": null})))
            .unwrap();
        assert_eq!(agg.result().execution_count, Some(5));
    }

    #[test]
    fn test_output_variants() {
        let mut agg = OutputAggregator::new();
        agg.process(&envelope(
            "iopub",
            "display_data",
            json!({"data": {"image/png": "aGk="}, "metadata": {"width": 1}, "transient": {}}),
        ))
        .unwrap();
        agg.process(&envelope(
            "iopub",
            "error",
            json!({"ename": "ZeroDivisionError", "evalue": "division by zero", "traceback": ["tb"]}),
        ))
        .unwrap();
        agg.process(&envelope("iopub", "clear_output", json!({"wait": false})))
            .unwrap();

        let outputs = agg.into_result().outputs;
        assert_eq!(outputs.len(), 2);
        assert!(matches!(&outputs[0], OutputRecord::DisplayData { metadata, .. } if metadata["width"] == 1));
        assert!(matches!(&outputs[1], OutputRecord::Error { ename, .. } if ename == "ZeroDivisionError"));
    }

    #[test]
    fn test_malformed_output_is_protocol_violation() {
        let mut agg = OutputAggregator::new();
        let err = agg
            .process(&envelope("iopub", "stream", json!({"name": "stdout"})))
            .unwrap_err();
        assert!(matches!(err, ProtocolViolation::Content { ref msg_type, .. } if msg_type == "stream"));
    }

    #[test]
    fn test_result_is_idempotent() {
        let mut agg = OutputAggregator::new();
        agg.process(&envelope("iopub", "stream", json!({"name": "stderr", "text": "w"})))
            .unwrap();
        assert_eq!(agg.result(), agg.result());
    }

    #[test]
    fn test_unknown_type_falls_back() {
        let env = envelope("iopub", "comm_open", json!({"comm_id": "c"}));
        let parsed = IopubContent::parse(&env).unwrap();
        assert!(matches!(parsed, IopubContent::Other { ref msg_type, .. } if msg_type == "comm_open"));
        assert_eq!(env.channel, Channel::Iopub);
    }

    #[test]
    fn test_output_record_notebook_shape() {
        let record = OutputRecord::Stream {
            name: "stdout".into(),
            text: "hello world\n".into(),
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"output_type": "stream", "name": "stdout", "text": "hello world\n"})
        );
    }
}
