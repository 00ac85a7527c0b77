//! Normalized conversation items — the unit the UI renders, derived from
//! the raw stream by the parser. Items are upserted by id: re-emitting an
//! item with the same id replaces it in place.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::risk::RiskTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePhase {
    Completed,
    Streaming,
    ActiveStreaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationPayload {
    Message {
        text: String,
        phase: MessagePhase,
    },
    #[serde(rename_all = "camelCase")]
    ToolInvocation {
        correlation_id: String,
        tool: String,
        risk: RiskTier,
        status: ToolRunStatus,
        parameters: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        correlation_id: String,
        output: Value,
        is_error: bool,
        /// A result whose invocation was never seen still renders, tagged.
        orphan: bool,
    },
    #[serde(rename_all = "camelCase")]
    Prompt {
        prompt_id: String,
        title: String,
    },
    PlanReview {
        plan: Value,
        status: ToolRunStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Loading {
        text: String,
    },
    Error {
        message: String,
    },
    Unknown {
        kind: String,
        raw: Value,
    },
}

/// One renderable row. `sort_order` is monotonic within a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationItem {
    pub id: String,
    pub sort_order: u64,
    #[serde(flatten)]
    pub payload: ConversationPayload,
}
