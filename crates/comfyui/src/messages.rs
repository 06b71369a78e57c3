//! ComfyUI WebSocket message types and parser.
//!
//! ComfyUI sends JSON messages over WebSocket with the shape
//! `{"type": "<kind>", "data": {...}}`.  Only a handful of kinds
//! matter to the tracker; everything else collapses into
//! [`ComfyMessage::Other`] and is ignored.

use serde::Deserialize;

/// WebSocket message kinds the tracker cares about.
///
/// Deserialized via the `"type"` tag with associated `"data"` content.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComfyMessage {
    /// Server status broadcast (queue depth, etc.).
    #[serde(rename = "status")]
    Status(StatusData),

    /// A specific node is executing, or the prompt finished when
    /// `node` is `None`.
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Step-level progress within a long-running node.
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A node finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedData),

    /// Execution failed with an error.
    #[serde(rename = "execution_error")]
    ExecutionError(ErrorData),

    /// Any other message kind (`execution_start`, `execution_cached`,
    /// crystools extensions, ...).  Ignored.
    #[serde(other, deserialize_with = "ignore_contents")]
    Other,
}

/// Consume and discard whatever `data` payload accompanies an unknown
/// message kind so `#[serde(other)]` can accept it.
fn ignore_contents<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde::de::IgnoredAny::deserialize(deserializer).map(|_| ())
}

/// Queue status information.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

/// Current queue state.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

/// Execution queue statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i32,
}

/// Payload for `executing` messages.
///
/// `node: None` is the authoritative completion signal for the prompt
/// named by `prompt_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    pub prompt_id: String,
}

/// Payload for `progress` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Current step number.
    pub value: i32,
    /// Total number of steps.
    pub max: i32,
}

/// Payload for `executed` messages (per-node output).
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    pub node: String,
    /// Raw output value (file descriptors etc.).
    pub output: serde_json::Value,
    pub prompt_id: String,
}

/// Payload for `execution_error` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    pub node_id: String,
    pub exception_message: String,
    pub exception_type: String,
}

/// Parse a ComfyUI WebSocket text frame into a typed message.
///
/// Returns `Err` only for malformed JSON; unknown `type` values parse
/// to [`ComfyMessage::Other`].
pub fn parse_message(text: &str) -> Result<ComfyMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_message() {
        let json = r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":2}}}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            ComfyMessage::Status(data) => {
                assert_eq!(data.status.exec_info.queue_remaining, 2);
            }
            other => panic!("Expected Status, got {other:?}"),
        }
    }

    #[test]
    fn parse_executing_with_node() {
        let json = r#"{"type":"executing","data":{"node":"125","prompt_id":"xyz"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            ComfyMessage::Executing(data) => {
                assert_eq!(data.node.as_deref(), Some("125"));
                assert_eq!(data.prompt_id, "xyz");
            }
            other => panic!("Expected Executing, got {other:?}"),
        }
    }

    #[test]
    fn parse_executing_completion_signal() {
        let json = r#"{"type":"executing","data":{"node":null,"prompt_id":"xyz"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            ComfyMessage::Executing(data) => {
                assert!(data.node.is_none());
                assert_eq!(data.prompt_id, "xyz");
            }
            other => panic!("Expected Executing, got {other:?}"),
        }
    }

    #[test]
    fn parse_progress_message() {
        let json = r#"{"type":"progress","data":{"value":3,"max":30}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            ComfyMessage::Progress(data) => {
                assert_eq!(data.value, 3);
                assert_eq!(data.max, 30);
            }
            other => panic!("Expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn parse_execution_error_message() {
        let json = r#"{"type":"execution_error","data":{"prompt_id":"abc","node_id":"270","exception_message":"out of memory","exception_type":"RuntimeError"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            ComfyMessage::ExecutionError(data) => {
                assert_eq!(data.prompt_id, "abc");
                assert_eq!(data.node_id, "270");
                assert_eq!(data.exception_message, "out of memory");
            }
            other => panic!("Expected ExecutionError, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_parses_to_other() {
        let json = r#"{"type":"execution_cached","data":{"prompt_id":"abc","nodes":["1"]}}"#;
        let msg = parse_message(json).unwrap();
        assert!(matches!(msg, ComfyMessage::Other));
    }

    #[test]
    fn invalid_json_returns_error() {
        assert!(parse_message("not json at all").is_err());
    }
}
