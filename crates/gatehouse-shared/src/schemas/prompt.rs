//! Interactive prompt records — the durable unit of the cross-process
//! permission protocol.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::risk::RiskTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PromptStatus {
    Pending,
    Answered,
    Timeout,
}

impl PromptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Answered => "answered",
            Self::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "answered" => Some(Self::Answered),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }

    /// Answered and timeout are final; a prompt never leaves them.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PromptType {
    ToolPermission,
    Delegation,
    PlanReview,
}

impl PromptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolPermission => "tool_permission",
            Self::Delegation => "delegation",
            Self::PlanReview => "plan_review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tool_permission" => Some(Self::ToolPermission),
            "delegation" => Some(Self::Delegation),
            "plan_review" => Some(Self::PlanReview),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
#[ts(rename_all = "camelCase")]
pub struct PromptOption {
    pub id: String,
    pub label: String,
    pub value: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_recommended: bool,
}

/// The standard three-way option set for tool-permission prompts.
///
/// Option ids are load-bearing: the orchestrator maps "1" to allow-once,
/// "2" to deny and "3" to allow-and-remember.
pub fn default_options() -> Vec<PromptOption> {
    vec![
        PromptOption {
            id: "1".into(),
            label: "Allow once".into(),
            value: "yes".into(),
            is_default: false,
            is_recommended: true,
        },
        PromptOption {
            id: "2".into(),
            label: "Deny".into(),
            value: "no".into(),
            is_default: true,
            is_recommended: false,
        },
        PromptOption {
            id: "3".into(),
            label: "Allow and don't ask again".into(),
            value: "yes_dont_ask".into(),
            is_default: false,
            is_recommended: false,
        },
    ]
}

/// Typed context per prompt type, with an opaque `extra` bag for
/// forward-compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
#[ts(tag = "type")]
pub enum PromptContext {
    #[serde(rename_all = "camelCase")]
    #[ts(rename_all = "camelCase")]
    ToolPermission {
        tool_name: String,
        action: String,
        resource: String,
        parameters: Value,
        risk_tier: RiskTier,
        #[serde(skip_serializing_if = "Option::is_none")]
        working_directory: Option<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        extra: HashMap<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    #[ts(rename_all = "camelCase")]
    PlanReview {
        plan: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        working_directory: Option<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        extra: HashMap<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    #[ts(rename_all = "camelCase")]
    Opaque {
        #[serde(default)]
        extra: HashMap<String, Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
#[ts(rename_all = "camelCase")]
pub struct InteractivePrompt {
    pub id: String,
    pub conversation_id: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "type")]
    #[ts(rename = "type")]
    pub prompt_type: PromptType,
    pub title: String,
    pub message: String,
    pub options: Vec<PromptOption>,
    pub context: PromptContext,
    pub status: PromptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<String>,
    pub timeout_at: i64,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<i64>,
    /// Set when the prompt could not be persisted and lives only in memory.
    #[serde(default)]
    pub fallback_storage: bool,
}

impl InteractivePrompt {
    pub fn option(&self, option_id: &str) -> Option<&PromptOption> {
        self.options.iter().find(|o| o.id == option_id)
    }
}

/// Body of the prompt-creation call from the agent bridge to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromptRequest {
    pub conversation_id: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "type")]
    pub prompt_type: PromptType,
    pub title: String,
    pub message: String,
    /// Empty means "use the standard three-way option set".
    #[serde(default)]
    pub options: Vec<PromptOption>,
    pub context: PromptContext,
    /// Clamped server-side to the 300 s protocol cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}
