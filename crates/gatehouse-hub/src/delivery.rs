//! Prompt delivery with ordered fallback. Channels are tried in tier
//! order until one accepts the prompt; every attempt is recorded so the
//! caller can see which tier finally worked.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};

use tracing::{debug, warn};

use gatehouse_shared::schemas::{InteractivePrompt, PushEvent};
use gatehouse_shared::timing::ACK_EXPIRY_MS;

use crate::store::{prompts, Store};
use crate::ws::connection_manager::ConnectionManager;

/// Trait for prompt delivery channels.
///
/// Uses `Pin<Box<dyn Future>>` return types for object safety, enabling
/// `dyn DeliveryChannel` in ordered collections.
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Attempt delivery. Ok(true) means the channel accepted the prompt
    /// and no further tier should run.
    fn deliver<'a>(
        &'a self,
        prompt: &'a InteractivePrompt,
        delivery_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + 'a>>;
}

/// Outcome of a delivery run across the channel tiers.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub delivered: bool,
    pub attempts: u32,
    pub channels_used: Vec<&'static str>,
}

struct PendingAck {
    prompt_id: String,
    created_at: i64,
}

/// Orchestrates prompt delivery across all registered channels and
/// tracks which deliveries the client side has confirmed.
pub struct DeliveryService {
    channels: Vec<Arc<dyn DeliveryChannel>>,
    pending_acks: StdMutex<HashMap<String, PendingAck>>,
    /// Confirmed prompts: prompt id to ack time. Re-delivery policy is the
    /// caller's; this only answers "was it acknowledged?".
    acked: StdMutex<HashMap<String, i64>>,
}

impl DeliveryService {
    pub fn new(channels: Vec<Arc<dyn DeliveryChannel>>) -> Self {
        Self {
            channels,
            pending_acks: StdMutex::new(HashMap::new()),
            acked: StdMutex::new(HashMap::new()),
        }
    }

    /// Push a prompt through the tiers in order. Every attempt gets its
    /// own delivery id so acks can be matched to the tier that carried
    /// the prompt.
    pub async fn deliver(&self, prompt: &InteractivePrompt, now: i64) -> DeliveryReport {
        let mut report = DeliveryReport {
            delivered: false,
            attempts: 0,
            channels_used: Vec::new(),
        };

        for channel in &self.channels {
            let delivery_id = uuid::Uuid::new_v4().to_string();
            report.attempts += 1;
            report.channels_used.push(channel.name());

            match channel.deliver(prompt, &delivery_id).await {
                Ok(true) => {
                    self.pending_acks.lock().unwrap_or_else(|e| e.into_inner()).insert(
                        delivery_id.clone(),
                        PendingAck {
                            prompt_id: prompt.id.clone(),
                            created_at: now,
                        },
                    );
                    debug!(
                        prompt_id = %prompt.id,
                        channel = channel.name(),
                        delivery_id = %delivery_id,
                        "prompt delivered"
                    );
                    report.delivered = true;
                    return report;
                }
                Ok(false) => {
                    debug!(
                        prompt_id = %prompt.id,
                        channel = channel.name(),
                        "channel had no takers, escalating"
                    );
                }
                Err(e) => {
                    warn!(
                        prompt_id = %prompt.id,
                        channel = channel.name(),
                        error = %e,
                        "delivery channel failed, escalating"
                    );
                }
            }
        }

        warn!(prompt_id = %prompt.id, "all delivery channels exhausted");
        report
    }

    /// Record a client confirmation. Returns the prompt the delivery
    /// belonged to, or None for unknown/expired delivery ids.
    pub fn handle_ack(&self, delivery_id: &str, now: i64) -> Option<String> {
        let ack = self
            .pending_acks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(delivery_id)?;
        self.acked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(ack.prompt_id.clone(), now);
        Some(ack.prompt_id)
    }

    /// Whether any delivery of this prompt was confirmed within the ack
    /// window.
    pub fn acknowledged(&self, prompt_id: &str) -> bool {
        self.acked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(prompt_id)
    }

    /// Drop confirmations never received within the expiry window, and
    /// received ones past it. Returns how many pending entries were swept.
    pub fn sweep_acks(&self, now: i64) -> usize {
        let mut acks = self.pending_acks.lock().unwrap_or_else(|e| e.into_inner());
        let before = acks.len();
        acks.retain(|delivery_id, ack| {
            let keep = now - ack.created_at < ACK_EXPIRY_MS;
            if !keep {
                warn!(
                    delivery_id = %delivery_id,
                    prompt_id = %ack.prompt_id,
                    "delivery never confirmed within ack window"
                );
            }
            keep
        });
        let swept = before - acks.len();
        drop(acks);

        self.acked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, acked_at| now - *acked_at < ACK_EXPIRY_MS);
        swept
    }

    pub fn pending_ack_count(&self) -> usize {
        self.pending_acks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// Primary tier: push the full prompt to clients watching the
/// conversation or its owning project.
pub struct ConversationWsChannel {
    connections: Arc<ConnectionManager>,
}

impl ConversationWsChannel {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }
}

impl DeliveryChannel for ConversationWsChannel {
    fn name(&self) -> &'static str {
        "conversation_ws"
    }

    fn deliver<'a>(
        &'a self,
        prompt: &'a InteractivePrompt,
        delivery_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let event = PushEvent::PromptCreated {
                delivery_id: delivery_id.to_string(),
                requires_ack: true,
                prompt: prompt.clone(),
            };
            let msg = serde_json::to_string(&event)?;
            // Clients in both rooms get it twice; they dedupe on delivery id
            let delivered = self
                .connections
                .send_to_conversation(&prompt.conversation_id, &msg)
                .await
                + self.connections.send_to_project(&prompt.project_id, &msg).await;
            Ok(delivered > 0)
        })
    }
}

/// Secondary tier: flag the prompt for pull-based pickup and nudge the
/// wider project room. Succeeds as long as the flag lands, even with no
/// listener connected right now.
pub struct PickupChannel {
    store: Arc<Store>,
    connections: Arc<ConnectionManager>,
}

impl PickupChannel {
    pub fn new(store: Arc<Store>, connections: Arc<ConnectionManager>) -> Self {
        Self { store, connections }
    }
}

impl DeliveryChannel for PickupChannel {
    fn name(&self) -> &'static str {
        "pickup"
    }

    fn deliver<'a>(
        &'a self,
        prompt: &'a InteractivePrompt,
        _delivery_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let flagged = prompts::mark_for_pickup(&self.store.conn(), &prompt.id);
            if !flagged {
                return Ok(false);
            }

            let tool = prompts::context_tool(&prompt.context)
                .map(|(t, _, _)| t.to_string())
                .unwrap_or_default();
            let notice = PushEvent::PermissionNotice {
                prompt_id: prompt.id.clone(),
                conversation_id: prompt.conversation_id.clone(),
                project_id: prompt.project_id.clone(),
                tool,
            };
            if let Ok(msg) = serde_json::to_string(&notice) {
                self.connections
                    .send_to_project(&prompt.project_id, &msg)
                    .await;
            }
            Ok(true)
        })
    }
}

/// Emergency tier: fan the prompt out to every connected client.
pub struct EmergencyBroadcastChannel {
    connections: Arc<ConnectionManager>,
}

impl EmergencyBroadcastChannel {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }
}

impl DeliveryChannel for EmergencyBroadcastChannel {
    fn name(&self) -> &'static str {
        "emergency_broadcast"
    }

    fn deliver<'a>(
        &'a self,
        prompt: &'a InteractivePrompt,
        delivery_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let event = PushEvent::EmergencyPrompt {
                delivery_id: delivery_id.to_string(),
                prompt: prompt.clone(),
            };
            let msg = serde_json::to_string(&event)?;
            Ok(self.connections.broadcast_all(&msg).await > 0)
        })
    }
}

/// Standard tier ordering.
pub fn default_channels(
    store: Arc<Store>,
    connections: Arc<ConnectionManager>,
) -> Vec<Arc<dyn DeliveryChannel>> {
    vec![
        Arc::new(ConversationWsChannel::new(connections.clone())),
        Arc::new(PickupChannel::new(store, connections.clone())),
        Arc::new(EmergencyBroadcastChannel::new(connections)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connection_manager::{WsConnection, WsOutMessage};
    use gatehouse_shared::risk::RiskTier;
    use gatehouse_shared::schemas::{
        default_options, PromptContext, PromptStatus, PromptType,
    };
    use serde_json::json;
    use tokio::sync::mpsc;

    fn sample_prompt(id: &str) -> InteractivePrompt {
        InteractivePrompt {
            id: id.into(),
            conversation_id: "conv-1".into(),
            project_id: "proj-1".into(),
            session_id: None,
            prompt_type: PromptType::ToolPermission,
            title: "Run shell command".into(),
            message: "bash wants to run `cargo publish`".into(),
            options: default_options(),
            context: PromptContext::ToolPermission {
                tool_name: "bash".into(),
                action: "run".into(),
                resource: "cargo publish".into(),
                parameters: json!({}),
                risk_tier: RiskTier::High,
                working_directory: None,
                extra: Default::default(),
            },
            status: PromptStatus::Pending,
            selected_option: None,
            timeout_at: 999_999,
            created_at: 0,
            responded_at: None,
            fallback_storage: false,
        }
    }

    async fn connect(
        mgr: &ConnectionManager,
        id: &str,
        conversation_id: Option<&str>,
        project_id: Option<&str>,
    ) -> mpsc::UnboundedReceiver<WsOutMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            id: id.into(),
            conversation_id: conversation_id.map(Into::into),
            project_id: project_id.map(Into::into),
            tx,
        };
        mgr.add_connection(conn).await;
        rx
    }

    fn service(store: &Arc<Store>, mgr: &Arc<ConnectionManager>) -> DeliveryService {
        DeliveryService::new(default_channels(store.clone(), mgr.clone()))
    }

    #[tokio::test]
    async fn primary_tier_wins_when_conversation_watched() {
        let store = Arc::new(Store::new_in_memory().unwrap());
        let mgr = Arc::new(ConnectionManager::new());
        let mut rx = connect(&mgr, "c1", Some("conv-1"), Some("proj-1")).await;
        let svc = service(&store, &mgr);

        let prompt = sample_prompt("p1");
        prompts::create_prompt(&store.conn(), &prompt).unwrap();

        let report = svc.deliver(&prompt, 1_000).await;
        assert!(report.delivered);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.channels_used, vec!["conversation_ws"]);
        assert_eq!(svc.pending_ack_count(), 1);

        let WsOutMessage::Text(raw) = rx.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        let event: PushEvent = serde_json::from_str(&raw).unwrap();
        match event {
            PushEvent::PromptCreated {
                requires_ack,
                prompt,
                ..
            } => {
                assert!(requires_ack);
                assert_eq!(prompt.id, "p1");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn project_room_counts_for_the_primary_tier() {
        let store = Arc::new(Store::new_in_memory().unwrap());
        let mgr = Arc::new(ConnectionManager::new());
        // Watching the project, not the conversation
        let mut rx = connect(&mgr, "c1", None, Some("proj-1")).await;
        let svc = service(&store, &mgr);

        let prompt = sample_prompt("p1");
        prompts::create_prompt(&store.conn(), &prompt).unwrap();

        let report = svc.deliver(&prompt, 1_000).await;
        assert!(report.delivered);
        assert_eq!(report.channels_used, vec!["conversation_ws"]);

        let WsOutMessage::Text(raw) = rx.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        assert!(raw.contains("interactive_prompt"));
    }

    #[tokio::test]
    async fn falls_back_to_pickup_when_no_room_is_watched() {
        let store = Arc::new(Store::new_in_memory().unwrap());
        let mgr = Arc::new(ConnectionManager::new());
        let svc = service(&store, &mgr);

        let prompt = sample_prompt("p1");
        prompts::create_prompt(&store.conn(), &prompt).unwrap();

        let report = svc.deliver(&prompt, 1_000).await;
        assert!(report.delivered);
        assert_eq!(report.attempts, 2);
        assert_eq!(report.channels_used, vec!["conversation_ws", "pickup"]);

        // Pickup flag is set for the polling endpoint
        let pending = prompts::pending_pickup(&store.conn(), Some("conv-1"), None);
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn emergency_broadcast_is_the_last_resort() {
        let store = Arc::new(Store::new_in_memory().unwrap());
        let mgr = Arc::new(ConnectionManager::new());
        // Connected but in no relevant room
        let mut rx = connect(&mgr, "c1", Some("conv-other"), Some("proj-other")).await;
        let svc = service(&store, &mgr);

        // Prompt never persisted: pickup flag cannot land
        let prompt = sample_prompt("p1");
        let report = svc.deliver(&prompt, 1_000).await;
        assert!(report.delivered);
        assert_eq!(
            report.channels_used,
            vec!["conversation_ws", "pickup", "emergency_broadcast"]
        );

        let WsOutMessage::Text(raw) = rx.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        assert!(raw.contains("emergency_prompt"));
    }

    #[tokio::test]
    async fn all_tiers_exhausted_reports_failure() {
        let store = Arc::new(Store::new_in_memory().unwrap());
        let mgr = Arc::new(ConnectionManager::new());
        let svc = service(&store, &mgr);

        let report = svc.deliver(&sample_prompt("p1"), 1_000).await;
        assert!(!report.delivered);
        assert_eq!(report.attempts, 3);
        assert_eq!(svc.pending_ack_count(), 0);
    }

    #[tokio::test]
    async fn acks_resolve_and_expire() {
        let store = Arc::new(Store::new_in_memory().unwrap());
        let mgr = Arc::new(ConnectionManager::new());
        let mut rx = connect(&mgr, "c1", Some("conv-1"), None).await;
        let svc = service(&store, &mgr);

        let prompt = sample_prompt("p1");
        prompts::create_prompt(&store.conn(), &prompt).unwrap();
        svc.deliver(&prompt, 1_000).await;

        let WsOutMessage::Text(raw) = rx.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        let PushEvent::PromptCreated { delivery_id, .. } = serde_json::from_str(&raw).unwrap()
        else {
            panic!("expected prompt_created");
        };

        assert_eq!(svc.handle_ack(&delivery_id, 1_500).as_deref(), Some("p1"));
        assert_eq!(svc.handle_ack(&delivery_id, 1_500), None);
        assert!(svc.acknowledged("p1"));
        assert!(!svc.acknowledged("p-unknown"));

        // Unacked deliveries are swept after the expiry window
        svc.deliver(&prompt, 2_000).await;
        assert_eq!(svc.sweep_acks(2_000 + ACK_EXPIRY_MS - 1), 0);
        assert_eq!(svc.sweep_acks(2_000 + ACK_EXPIRY_MS), 1);
        assert_eq!(svc.pending_ack_count(), 0);

        // The acknowledged record itself ages out on the same window
        assert!(!svc.acknowledged("p1"));
    }
}
