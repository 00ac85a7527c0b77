//! Turns the executor's raw NDJSON stream into ConversationItems.
//!
//! One parser per conversation, fed line by line in arrival order. Items
//! are upserted by id downstream, so re-emitting an id replaces the item
//! in place; `sort_order` is assigned once per id and stays stable across
//! re-emissions.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use gatehouse_shared::risk::{self, RiskTier};
use gatehouse_shared::schemas::{
    AgentTextData, ConversationItem, ConversationPayload, ErrorData, MessagePhase, ResultData,
    StatusData, StreamEvent, StreamEventKind, ToolInvocationData, ToolResultData, ToolRunStatus,
};

/// Tools whose invocation is a plan put before the operator rather than an
/// action to execute.
pub const PLAN_REVIEW_TOOLS: &[&str] = &["exit_plan_mode", "present_plan"];

/// Receives every rendered item; called in emission order.
pub type ItemSink = Box<dyn FnMut(ConversationItem) + Send>;

/// What the permission layer said about one tool invocation.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub allowed: bool,
    pub reason: String,
    /// Set when a human was asked; the UI links the invocation to it.
    pub prompt_id: Option<String>,
}

/// Seam to the permission layer, object-safe for test stubs.
pub trait PermissionProbe: Send + Sync {
    fn check<'a>(
        &'a self,
        invocation: &'a ToolInvocationData,
        risk: RiskTier,
    ) -> Pin<Box<dyn Future<Output = ProbeOutcome> + Send + 'a>>;
}

struct OpenTool {
    item_id: String,
    tool: String,
    risk: RiskTier,
    parameters: Value,
    plan_review: bool,
    reason: Option<String>,
}

pub struct StreamEventParser {
    probe: Arc<dyn PermissionProbe>,
    sink: ItemSink,
    session_id: Option<String>,
    next_sort: u64,
    sort_orders: HashMap<String, u64>,
    /// The one in-flight text accumulator: (item id, current full text).
    streaming: Option<(String, String)>,
    open_tools: HashMap<String, OpenTool>,
}

impl StreamEventParser {
    pub fn new(probe: Arc<dyn PermissionProbe>, sink: ItemSink) -> Self {
        Self {
            probe,
            sink,
            session_id: None,
            next_sort: 0,
            sort_orders: HashMap::new(),
            streaming: None,
            open_tools: HashMap::new(),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Feed one raw line. Never fails; bad input becomes error items.
    pub async fn consume(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            trace!("skipping empty stream line");
            return;
        }

        let event: StreamEvent = match serde_json::from_str(line) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "malformed stream line");
                self.emit_error(format!("unparseable stream line: {e}"));
                return;
            }
        };

        if let Some(ref incoming) = event.session_id {
            match self.session_id {
                None => self.session_id = Some(incoming.clone()),
                Some(ref known) if known != incoming => {
                    warn!(known = %known, incoming = %incoming, "conflicting session id ignored");
                }
                _ => {}
            }
        }

        match StreamEventKind::parse(&event.kind) {
            StreamEventKind::AgentText => self.on_agent_text(event.data),
            StreamEventKind::ToolInvocation => {
                self.demote_streaming();
                self.on_tool_invocation(event.data).await;
            }
            StreamEventKind::ToolResult => {
                self.demote_streaming();
                self.on_tool_result(event.data);
            }
            StreamEventKind::Status => {
                self.demote_streaming();
                self.on_status(event.data);
            }
            StreamEventKind::Result => self.on_result(event.data),
            StreamEventKind::Error => {
                self.demote_streaming();
                self.on_error_event(event.data);
            }
            StreamEventKind::Aborted => self.on_aborted(),
            StreamEventKind::StreamDone => self.finalize_streaming(),
            StreamEventKind::Unknown => {
                self.demote_streaming();
                self.on_unknown(event.kind, event.data);
            }
        }
    }

    /// A non-text event interleaving with an open message: the text is
    /// still unfinished, but no longer the actively updating row. The
    /// next agent_text event promotes it back.
    fn demote_streaming(&mut self) {
        if let Some((id, text)) = self.streaming.clone() {
            self.emit(
                &id,
                ConversationPayload::Message {
                    text,
                    phase: MessagePhase::Streaming,
                },
            );
        }
    }

    fn emit(&mut self, id: &str, payload: ConversationPayload) {
        let sort_order = match self.sort_orders.get(id) {
            Some(&s) => s,
            None => {
                let s = self.next_sort;
                self.next_sort += 1;
                self.sort_orders.insert(id.to_string(), s);
                s
            }
        };
        (self.sink)(ConversationItem {
            id: id.to_string(),
            sort_order,
            payload,
        });
    }

    fn emit_error(&mut self, message: String) {
        let id = format!("error-{}", uuid::Uuid::new_v4());
        self.emit(&id, ConversationPayload::Error { message });
    }

    /// `agent_text` always carries the FULL text so far: the accumulator
    /// replaces its content in place rather than appending.
    fn on_agent_text(&mut self, data: Value) {
        let data: AgentTextData = match serde_json::from_value(data) {
            Ok(d) => d,
            Err(e) => {
                self.emit_error(format!("bad agent_text payload: {e}"));
                return;
            }
        };

        let id = match self.streaming {
            Some((ref id, ref mut text)) => {
                *text = data.text.clone();
                id.clone()
            }
            None => {
                let id = format!("msg-{}", uuid::Uuid::new_v4());
                self.streaming = Some((id.clone(), data.text.clone()));
                id
            }
        };

        self.emit(
            &id,
            ConversationPayload::Message {
                text: data.text,
                phase: MessagePhase::ActiveStreaming,
            },
        );
    }

    async fn on_tool_invocation(&mut self, data: Value) {
        let data: ToolInvocationData = match serde_json::from_value(data) {
            Ok(d) => d,
            Err(e) => {
                self.emit_error(format!("bad tool_invocation payload: {e}"));
                return;
            }
        };

        let risk = risk::classify(&data.tool);
        let plan_review = PLAN_REVIEW_TOOLS.contains(&data.tool.as_str());
        let item_id = format!("tool-{}", data.id);

        self.emit_tool(
            &item_id,
            &data,
            risk,
            plan_review,
            ToolRunStatus::Pending,
            None,
        );

        let outcome = self.probe.check(&data, risk).await;

        if let Some(ref prompt_id) = outcome.prompt_id {
            self.emit(
                &format!("prompt-{prompt_id}"),
                ConversationPayload::Prompt {
                    prompt_id: prompt_id.clone(),
                    title: format!("Permission required: {}", data.tool),
                },
            );
        }

        let (status, reason) = if outcome.allowed {
            (ToolRunStatus::Running, None)
        } else {
            debug!(tool = %data.tool, reason = %outcome.reason, "tool invocation blocked");
            (ToolRunStatus::Denied, Some(outcome.reason))
        };
        self.emit_tool(&item_id, &data, risk, plan_review, status, reason.clone());

        self.open_tools.insert(
            data.id.clone(),
            OpenTool {
                item_id,
                tool: data.tool,
                risk,
                parameters: data.parameters,
                plan_review,
                reason,
            },
        );
    }

    fn emit_tool(
        &mut self,
        item_id: &str,
        data: &ToolInvocationData,
        risk: RiskTier,
        plan_review: bool,
        status: ToolRunStatus,
        reason: Option<String>,
    ) {
        let payload = if plan_review {
            ConversationPayload::PlanReview {
                plan: data.parameters.clone(),
                status,
                reason,
            }
        } else {
            ConversationPayload::ToolInvocation {
                correlation_id: data.id.clone(),
                tool: data.tool.clone(),
                risk,
                status,
                parameters: data.parameters.clone(),
                reason,
            }
        };
        self.emit(item_id, payload);
    }

    fn on_tool_result(&mut self, data: Value) {
        let data: ToolResultData = match serde_json::from_value(data) {
            Ok(d) => d,
            Err(e) => {
                self.emit_error(format!("bad tool_result payload: {e}"));
                return;
            }
        };

        let orphan = match self.open_tools.remove(&data.id) {
            Some(open) => {
                let status = if data.is_error {
                    ToolRunStatus::Failed
                } else {
                    ToolRunStatus::Completed
                };
                let payload = if open.plan_review {
                    ConversationPayload::PlanReview {
                        plan: open.parameters.clone(),
                        status,
                        reason: open.reason.clone(),
                    }
                } else {
                    ConversationPayload::ToolInvocation {
                        correlation_id: data.id.clone(),
                        tool: open.tool.clone(),
                        risk: open.risk,
                        status,
                        parameters: open.parameters.clone(),
                        reason: open.reason.clone(),
                    }
                };
                self.emit(&open.item_id.clone(), payload);
                false
            }
            None => {
                debug!(correlation_id = %data.id, "result without a matching invocation");
                true
            }
        };

        self.emit(
            &format!("result-{}", data.id),
            ConversationPayload::ToolResult {
                correlation_id: data.id,
                output: data.output,
                is_error: data.is_error,
                orphan,
            },
        );
    }

    fn on_status(&mut self, data: Value) {
        let data: StatusData = serde_json::from_value(data).unwrap_or(StatusData {
            message: String::new(),
        });
        // One loading row per conversation, replaced on every status
        self.emit("loading", ConversationPayload::Loading { text: data.message });
    }

    fn on_result(&mut self, data: Value) {
        let data: ResultData = serde_json::from_value(data).unwrap_or(ResultData { text: None });

        if self.streaming.is_some() {
            self.finalize_streaming();
            return;
        }

        // Some executors only emit a final summary
        if let Some(text) = data.text.filter(|t| !t.is_empty()) {
            let id = format!("msg-{}", uuid::Uuid::new_v4());
            self.emit(
                &id,
                ConversationPayload::Message {
                    text,
                    phase: MessagePhase::Completed,
                },
            );
        }
    }

    fn on_error_event(&mut self, data: Value) {
        let data: ErrorData = serde_json::from_value(data).unwrap_or(ErrorData {
            message: "unknown stream error".into(),
        });
        self.emit_error(data.message);
    }

    /// An aborted run throws its partial message away.
    fn on_aborted(&mut self) {
        if let Some((id, _)) = self.streaming.take() {
            debug!(item_id = %id, "stream aborted, dropping partial message");
        }
        self.open_tools.clear();
    }

    fn on_unknown(&mut self, kind: String, raw: Value) {
        let id = format!("unknown-{}", uuid::Uuid::new_v4());
        self.emit(&id, ConversationPayload::Unknown { kind, raw });
    }

    /// Close the accumulator: non-empty text becomes a completed message,
    /// empty text is discarded entirely.
    fn finalize_streaming(&mut self) {
        if let Some((id, text)) = self.streaming.take() {
            if text.is_empty() {
                return;
            }
            self.emit(
                &id,
                ConversationPayload::Message {
                    text,
                    phase: MessagePhase::Completed,
                },
            );
        }
    }
}
