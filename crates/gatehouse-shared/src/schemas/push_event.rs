//! Real-time events pushed to connected UI clients over WebSocket, plus the
//! client-to-hub acknowledgment message.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use super::prompt::InteractivePrompt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "type")]
#[ts(export)]
#[ts(tag = "type")]
pub enum PushEvent {
    /// A new prompt needs a human decision; the client must ack receipt.
    #[serde(rename = "interactive_prompt")]
    #[ts(rename = "interactive_prompt")]
    PromptCreated {
        #[serde(rename = "deliveryId")]
        delivery_id: String,
        #[serde(rename = "requiresAck")]
        requires_ack: bool,
        prompt: InteractivePrompt,
    },
    /// Lightweight project-level FYI; no ack expected.
    #[serde(rename = "permission_request")]
    #[ts(rename = "permission_request")]
    PermissionNotice {
        #[serde(rename = "promptId")]
        prompt_id: String,
        #[serde(rename = "conversationId")]
        conversation_id: String,
        #[serde(rename = "projectId")]
        project_id: String,
        tool: String,
    },
    /// Last-resort broadcast to every connected client; best-effort, lossy.
    #[serde(rename = "emergency_prompt")]
    #[ts(rename = "emergency_prompt")]
    EmergencyPrompt {
        #[serde(rename = "deliveryId")]
        delivery_id: String,
        prompt: InteractivePrompt,
    },
    /// Client → hub: confirms a prompt push was received.
    #[serde(rename = "prompt_received_confirmation")]
    #[ts(rename = "prompt_received_confirmation")]
    PromptReceivedConfirmation {
        #[serde(rename = "deliveryId")]
        delivery_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        client: Option<Value>,
    },
}
