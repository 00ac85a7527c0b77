//! Prompt lifecycle on the hub side: creation, delivery, response and
//! expiry. If the store rejects an insert the prompt is parked in an
//! in-memory registry instead, so delivery still happens and the client
//! can still answer it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tracing::{error, info, warn};

use gatehouse_shared::schemas::{
    default_options, CreatePromptRequest, InteractivePrompt, PromptStatus,
};
use gatehouse_shared::timing::{DEFAULT_PROMPT_TIMEOUT_MS, MAX_PROMPT_TIMEOUT_MS};

use crate::delivery::{DeliveryReport, DeliveryService};
use crate::store::prompts::{self, RespondOutcome};
use crate::store::{now_millis, Store};

pub struct PromptService {
    store: Arc<Store>,
    delivery: Arc<DeliveryService>,
    /// Prompts the store could not hold. Answered and expired in place.
    fallback: StdMutex<HashMap<String, InteractivePrompt>>,
}

impl PromptService {
    pub fn new(store: Arc<Store>, delivery: Arc<DeliveryService>) -> Self {
        Self {
            store,
            delivery,
            fallback: StdMutex::new(HashMap::new()),
        }
    }

    fn fallback_lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, InteractivePrompt>> {
        self.fallback.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a prompt and push it out. Returns the stored prompt,
    /// flagged when it only lives in the fallback registry.
    pub async fn create(&self, req: CreatePromptRequest) -> (InteractivePrompt, DeliveryReport) {
        let now = now_millis();
        let timeout_ms = req
            .timeout_ms
            .unwrap_or(DEFAULT_PROMPT_TIMEOUT_MS)
            .min(MAX_PROMPT_TIMEOUT_MS);
        let options = if req.options.is_empty() {
            default_options()
        } else {
            req.options
        };

        let mut prompt = InteractivePrompt {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: req.conversation_id,
            project_id: req.project_id,
            session_id: req.session_id,
            prompt_type: req.prompt_type,
            title: req.title,
            message: req.message,
            options,
            context: req.context,
            status: PromptStatus::Pending,
            selected_option: None,
            timeout_at: now + timeout_ms as i64,
            created_at: now,
            responded_at: None,
            fallback_storage: false,
        };

        if let Err(e) = prompts::create_prompt(&self.store.conn(), &prompt) {
            error!(prompt_id = %prompt.id, error = %e, "store rejected prompt, using fallback registry");
            prompt.fallback_storage = true;
            self.fallback_lock().insert(prompt.id.clone(), prompt.clone());
        }

        let report = self.delivery.deliver(&prompt, now).await;
        info!(
            prompt_id = %prompt.id,
            delivered = report.delivered,
            attempts = report.attempts,
            fallback = prompt.fallback_storage,
            "prompt created"
        );
        (prompt, report)
    }

    pub fn get(&self, id: &str) -> Option<InteractivePrompt> {
        if let Some(p) = prompts::get_prompt(&self.store.conn(), id) {
            return Some(p);
        }
        self.fallback_lock().get(id).cloned()
    }

    /// Submit a response. The pending check runs under the same lock (or
    /// the same SQL statement) as the write, so only the first submission
    /// lands.
    pub fn respond(&self, id: &str, selected_option: &str) -> RespondOutcome {
        let now = now_millis();
        let outcome = match prompts::respond_prompt(&self.store.conn(), id, selected_option, now) {
            Ok(o) => o,
            Err(e) => {
                warn!(prompt_id = %id, error = %e, "store respond failed, checking fallback registry");
                RespondOutcome::NotFound
            }
        };
        if !matches!(outcome, RespondOutcome::NotFound) {
            return outcome;
        }

        let mut fallback = self.fallback_lock();
        match fallback.get_mut(id) {
            Some(p) if p.status == PromptStatus::Pending => {
                p.status = PromptStatus::Answered;
                p.selected_option = Some(selected_option.to_string());
                p.responded_at = Some(now);
                RespondOutcome::Updated(p.clone())
            }
            Some(p) => RespondOutcome::NotPending(p.status),
            None => RespondOutcome::NotFound,
        }
    }

    /// Time a prompt out early, at the requester's initiative.
    pub fn expire(&self, id: &str) -> bool {
        let now = now_millis();
        if prompts::expire_prompt(&self.store.conn(), id, now) {
            return true;
        }
        let mut fallback = self.fallback_lock();
        match fallback.get_mut(id) {
            Some(p) if p.status == PromptStatus::Pending => {
                p.status = PromptStatus::Timeout;
                p.responded_at = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Sweep overdue pending prompts in both storage tiers.
    pub fn expire_due(&self) -> usize {
        let now = now_millis();
        let mut expired = prompts::expire_due(&self.store.conn(), now);

        let mut fallback = self.fallback_lock();
        for p in fallback.values_mut() {
            if p.status == PromptStatus::Pending && p.timeout_at <= now {
                p.status = PromptStatus::Timeout;
                p.responded_at = Some(now);
                expired += 1;
            }
        }
        // Terminal fallback prompts linger briefly for late polls, then go
        fallback.retain(|_, p| {
            p.status == PromptStatus::Pending
                || p.responded_at.map(|t| now - t < 60_000).unwrap_or(true)
        });

        if expired > 0 {
            warn!(expired, "prompts timed out without a response");
        }
        expired
    }

    pub fn pending_pickup(
        &self,
        conversation_id: Option<&str>,
        project_id: Option<&str>,
    ) -> Vec<InteractivePrompt> {
        prompts::pending_pickup(&self.store.conn(), conversation_id, project_id)
    }
}
