//! Client side of the interactive prompt protocol: bounded-retry create,
//! then a poll loop against the hub until the prompt reaches a terminal
//! state. Every failure path resolves to a deny; the caller is never
//! left waiting on an answer that cannot come.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, warn};

use gatehouse_shared::schemas::{CreatePromptRequest, InteractivePrompt, PromptStatus};
use gatehouse_shared::timing::{
    CREATE_RETRY_BACKOFF_MS, MAX_CONSECUTIVE_POLL_ERRORS, POLL_INTERVAL_MS,
};

use crate::api::ApiClient;

/// Transport seam between the orchestrator and the hub, object-safe so
/// tests can swap in a scripted mock.
pub trait PromptTransport: Send + Sync {
    fn health(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    fn create_prompt<'a>(
        &'a self,
        req: &'a CreatePromptRequest,
    ) -> Pin<Box<dyn Future<Output = Result<InteractivePrompt>> + Send + 'a>>;

    fn get_prompt<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InteractivePrompt>>> + Send + 'a>>;

    fn expire_prompt<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

impl PromptTransport for ApiClient {
    fn health(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.health())
    }

    fn create_prompt<'a>(
        &'a self,
        req: &'a CreatePromptRequest,
    ) -> Pin<Box<dyn Future<Output = Result<InteractivePrompt>> + Send + 'a>> {
        Box::pin(self.create_prompt(req))
    }

    fn get_prompt<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InteractivePrompt>>> + Send + 'a>> {
        Box::pin(self.get_prompt(id))
    }

    fn expire_prompt<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.expire_prompt(id))
    }
}

/// How the protocol run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    /// A human picked an option.
    Answered,
    /// Deadline passed without an answer.
    Timeout,
    /// The hub no longer knows the prompt.
    Vanished,
    /// The hub could not be reached (create or too many poll failures).
    Unreachable,
}

#[derive(Debug, Clone)]
pub struct PromptDecision {
    pub approved: bool,
    /// The human asked for a standing rule; the hub records it.
    pub remember: bool,
    pub reason: String,
    pub outcome: PromptOutcome,
    /// Id of the prompt this run created, if creation got that far.
    pub prompt_id: Option<String>,
}

impl PromptDecision {
    fn denied(reason: impl Into<String>, outcome: PromptOutcome) -> Self {
        Self {
            approved: false,
            remember: false,
            reason: reason.into(),
            outcome,
            prompt_id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub poll_interval: Duration,
    pub create_backoff: Vec<Duration>,
    pub max_consecutive_poll_errors: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            create_backoff: CREATE_RETRY_BACKOFF_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            max_consecutive_poll_errors: MAX_CONSECUTIVE_POLL_ERRORS,
        }
    }
}

pub struct PromptOrchestrator {
    transport: Arc<dyn PromptTransport>,
    config: OrchestratorConfig,
}

impl PromptOrchestrator {
    pub fn new(transport: Arc<dyn PromptTransport>, config: OrchestratorConfig) -> Self {
        Self { transport, config }
    }

    /// Run the full protocol for one prompt. Never returns before the
    /// prompt is terminal, unreachable, or past its deadline.
    pub async fn request_decision(&self, req: CreatePromptRequest) -> PromptDecision {
        let prompt = match self.create_with_retry(&req).await {
            Some(p) => p,
            None => {
                return PromptDecision::denied(
                    "hub unreachable, denying by default",
                    PromptOutcome::Unreachable,
                );
            }
        };

        let prompt_id = prompt.id.clone();
        let mut decision = self.wait_for_answer(prompt).await;
        decision.prompt_id = Some(prompt_id);
        decision
    }

    async fn create_with_retry(&self, req: &CreatePromptRequest) -> Option<InteractivePrompt> {
        for (attempt, backoff) in self.config.create_backoff.iter().enumerate() {
            if let Err(e) = self.transport.health().await {
                debug!(attempt, error = %e, "hub health probe failed");
            } else {
                match self.transport.create_prompt(req).await {
                    Ok(prompt) => {
                        debug!(prompt_id = %prompt.id, attempt, "prompt created");
                        return Some(prompt);
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "prompt creation failed");
                    }
                }
            }
            tokio::time::sleep(*backoff).await;
        }
        warn!("prompt creation attempts exhausted");
        None
    }

    async fn wait_for_answer(&self, prompt: InteractivePrompt) -> PromptDecision {
        let budget_ms = (prompt.timeout_at - prompt.created_at).max(0) as u64;
        let deadline = Instant::now() + Duration::from_millis(budget_ms);
        let mut consecutive_errors: u32 = 0;

        loop {
            if Instant::now() >= deadline {
                // Best-effort server-side expiry so the hub UI agrees
                if let Err(e) = self.transport.expire_prompt(&prompt.id).await {
                    debug!(prompt_id = %prompt.id, error = %e, "expire call failed");
                }
                return PromptDecision::denied(
                    "prompt timed out without a response",
                    PromptOutcome::Timeout,
                );
            }

            tokio::time::sleep(self.config.poll_interval).await;

            match self.transport.get_prompt(&prompt.id).await {
                Ok(Some(current)) => {
                    consecutive_errors = 0;
                    match current.status {
                        PromptStatus::Pending => continue,
                        PromptStatus::Answered => return resolve_answer(&current),
                        PromptStatus::Timeout => {
                            return PromptDecision::denied(
                                "prompt timed out without a response",
                                PromptOutcome::Timeout,
                            );
                        }
                    }
                }
                Ok(None) => {
                    return PromptDecision::denied(
                        "prompt no longer exists on the hub",
                        PromptOutcome::Vanished,
                    );
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        prompt_id = %prompt.id,
                        consecutive_errors,
                        error = %e,
                        "prompt poll failed"
                    );
                    if consecutive_errors >= self.config.max_consecutive_poll_errors {
                        return PromptDecision::denied(
                            "too many consecutive poll failures",
                            PromptOutcome::Unreachable,
                        );
                    }
                }
            }
        }
    }
}

/// Map an answered prompt's option onto a decision. Option ids follow the
/// standard three-way set; anything unrecognized denies.
fn resolve_answer(prompt: &InteractivePrompt) -> PromptDecision {
    match prompt.selected_option.as_deref() {
        Some("1") => PromptDecision {
            approved: true,
            remember: false,
            reason: "approved by operator".into(),
            outcome: PromptOutcome::Answered,
            prompt_id: None,
        },
        Some("3") => PromptDecision {
            approved: true,
            remember: true,
            reason: "approved by operator (remembered)".into(),
            outcome: PromptOutcome::Answered,
            prompt_id: None,
        },
        Some("2") => PromptDecision {
            approved: false,
            remember: false,
            reason: "denied by operator".into(),
            outcome: PromptOutcome::Answered,
            prompt_id: None,
        },
        other => PromptDecision {
            approved: false,
            remember: false,
            reason: format!("unrecognized option {other:?}, denying"),
            outcome: PromptOutcome::Answered,
            prompt_id: None,
        },
    }
}
