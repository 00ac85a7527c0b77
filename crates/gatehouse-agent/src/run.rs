//! The bridge process: executor NDJSON on stdin, conversation items on
//! stdout, permission checks against the hub in between.

use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use gatehouse_shared::risk::RiskTier;
use gatehouse_shared::schemas::{
    CreatePromptRequest, PromptContext, PromptType, ToolInvocationData, Verdict,
};
use gatehouse_shared::timing::MAX_PROMPT_TIMEOUT_MS;

use crate::api::ApiClient;
use crate::config::Configuration;
use crate::orchestrator::{OrchestratorConfig, PromptOrchestrator};
use crate::stream::{PermissionProbe, ProbeOutcome, StreamEventParser, PLAN_REVIEW_TOOLS};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub conversation_id: String,
    pub project_id: String,
    pub session_id: Option<String>,
}

/// Permission seam backed by the hub: rule lookup first, interactive
/// prompt when the rules are silent. Fails closed on any transport error.
struct GateProbe {
    api: Arc<ApiClient>,
    orchestrator: PromptOrchestrator,
    conversation_id: String,
    project_id: String,
    session_id: Option<String>,
}

impl GateProbe {
    fn prompt_request(
        &self,
        invocation: &ToolInvocationData,
        risk: RiskTier,
    ) -> CreatePromptRequest {
        if PLAN_REVIEW_TOOLS.contains(&invocation.tool.as_str()) {
            CreatePromptRequest {
                conversation_id: self.conversation_id.clone(),
                project_id: self.project_id.clone(),
                session_id: self.session_id.clone(),
                prompt_type: PromptType::PlanReview,
                title: "Plan review".into(),
                message: "The agent has a plan ready for review.".into(),
                options: Vec::new(),
                context: PromptContext::PlanReview {
                    plan: invocation.parameters.clone(),
                    working_directory: invocation.working_directory.clone(),
                    extra: HashMap::new(),
                },
                timeout_ms: Some(MAX_PROMPT_TIMEOUT_MS),
            }
        } else {
            CreatePromptRequest {
                conversation_id: self.conversation_id.clone(),
                project_id: self.project_id.clone(),
                session_id: self.session_id.clone(),
                prompt_type: PromptType::ToolPermission,
                title: format!("Permission required: {}", invocation.tool),
                message: format!(
                    "The agent wants to {} {}",
                    invocation.action, invocation.resource
                ),
                options: Vec::new(),
                context: PromptContext::ToolPermission {
                    tool_name: invocation.tool.clone(),
                    action: invocation.action.clone(),
                    resource: invocation.resource.clone(),
                    parameters: invocation.parameters.clone(),
                    risk_tier: risk,
                    working_directory: invocation.working_directory.clone(),
                    extra: HashMap::new(),
                },
                timeout_ms: None,
            }
        }
    }

    async fn check_invocation(
        &self,
        invocation: &ToolInvocationData,
        risk: RiskTier,
    ) -> ProbeOutcome {
        let decision = match self
            .api
            .decide(
                &invocation.tool,
                &invocation.action,
                &invocation.resource,
                &self.project_id,
            )
            .await
        {
            Ok(d) => d,
            Err(e) => {
                warn!(tool = %invocation.tool, error = %e, "permission check failed, denying");
                return ProbeOutcome {
                    allowed: false,
                    reason: "permission check unavailable, denying by default".into(),
                    prompt_id: None,
                };
            }
        };

        match decision.verdict {
            Verdict::AutoAllow => ProbeOutcome {
                allowed: true,
                reason: decision.reason,
                prompt_id: None,
            },
            Verdict::AutoDeny => ProbeOutcome {
                allowed: false,
                reason: decision.reason,
                prompt_id: None,
            },
            Verdict::NeedsPrompt => {
                debug!(tool = %invocation.tool, "no rule matched, asking the operator");
                let req = self.prompt_request(invocation, decision.risk);
                let answer = self.orchestrator.request_decision(req).await;
                ProbeOutcome {
                    allowed: answer.approved,
                    reason: answer.reason,
                    prompt_id: answer.prompt_id,
                }
            }
        }
    }
}

impl PermissionProbe for GateProbe {
    fn check<'a>(
        &'a self,
        invocation: &'a ToolInvocationData,
        risk: RiskTier,
    ) -> Pin<Box<dyn Future<Output = ProbeOutcome> + Send + 'a>> {
        Box::pin(self.check_invocation(invocation, risk))
    }
}

/// Run the bridge until stdin closes.
pub async fn run_bridge(opts: RunOptions) -> Result<()> {
    let mut config = Configuration::create()?;
    config.load_with_settings()?;

    let api = Arc::new(ApiClient::new(&config)?);
    if let Err(e) = api.health().await {
        warn!(error = %e, "hub not reachable at startup, tool calls will be denied until it is");
    }

    let probe: Arc<dyn PermissionProbe> = Arc::new(GateProbe {
        api: Arc::clone(&api),
        orchestrator: PromptOrchestrator::new(api, OrchestratorConfig::default()),
        conversation_id: opts.conversation_id.clone(),
        project_id: opts.project_id.clone(),
        session_id: opts.session_id.clone(),
    });

    let stdout = std::io::stdout();
    let sink: crate::stream::ItemSink = Box::new(move |item| {
        let mut out = stdout.lock();
        match serde_json::to_string(&item) {
            Ok(json) => {
                if writeln!(out, "{json}").and_then(|_| out.flush()).is_err() {
                    warn!("stdout gone, dropping conversation item");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize conversation item"),
        }
    });

    let mut parser = StreamEventParser::new(probe, sink);

    info!(
        conversation_id = %opts.conversation_id,
        project_id = %opts.project_id,
        "bridge started, reading executor stream from stdin"
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        parser.consume(&line).await;
    }

    info!("executor stream closed, bridge exiting");
    Ok(())
}
