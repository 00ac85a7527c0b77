//! Wire format of the agent executor's event stream: newline-delimited
//! JSON, one event per line. The only required field is `kind`; unknown
//! kinds must be preserved for display, never dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    pub kind: String,
    #[serde(
        default,
        rename = "sessionId",
        skip_serializing_if = "Option::is_none"
    )]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventKind {
    AgentText,
    ToolInvocation,
    ToolResult,
    Status,
    Result,
    Error,
    Aborted,
    StreamDone,
    Unknown,
}

impl StreamEventKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "agent_text" => Self::AgentText,
            "tool_invocation" => Self::ToolInvocation,
            "tool_result" => Self::ToolResult,
            "status" => Self::Status,
            "result" => Self::Result,
            "error" => Self::Error,
            "aborted" => Self::Aborted,
            "stream_done" => Self::StreamDone,
            _ => Self::Unknown,
        }
    }
}

/// `agent_text` payload. `text` is always the FULL current text of the
/// in-progress message, not a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTextData {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocationData {
    /// Opaque correlation id pairing this invocation with its result.
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultData {
    pub id: String,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusData {
    #[serde(default)]
    pub message: String,
}

/// `result` payload; `text` covers agents that emit only a final summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub message: String,
}
