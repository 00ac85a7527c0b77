use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use gatehouse_shared::schemas::{
    CreatePromptRequest, PermissionRule, PromptContext, RuleDecision,
};

use crate::store::now_millis;
use crate::store::prompts::RespondOutcome;
use crate::web::AppState;

pub fn cli_router() -> Router<AppState> {
    Router::new()
        .route("/prompts", post(create_prompt))
        .route("/prompts/{id}", get(get_prompt))
        .route("/prompts/{id}/expire", post(expire_prompt))
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/prompts/{id}/respond", post(respond_prompt))
        .route("/prompts/pending", get(pending_prompts))
}

async fn create_prompt(
    State(state): State<AppState>,
    Json(req): Json<CreatePromptRequest>,
) -> (StatusCode, Json<Value>) {
    let (prompt, report) = state.prompts.create(req).await;
    (
        StatusCode::CREATED,
        Json(json!({
            "fallbackStorage": prompt.fallback_storage,
            "prompt": prompt,
            "delivery": {
                "delivered": report.delivered,
                "attempts": report.attempts,
                "channelsUsed": report.channels_used,
            }
        })),
    )
}

async fn get_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.prompts.get(&id) {
        Some(prompt) => (StatusCode::OK, Json(json!({ "prompt": prompt }))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Prompt not found" })),
        ),
    }
}

async fn expire_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    if state.prompts.get(&id).is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Prompt not found" })),
        );
    }
    let expired = state.prompts.expire(&id);
    (StatusCode::OK, Json(json!({ "expired": expired })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RespondBody {
    selected_option_id: String,
}

async fn respond_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RespondBody>,
) -> (StatusCode, Json<Value>) {
    let Some(prompt) = state.prompts.get(&id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Prompt not found" })),
        );
    };

    let Some(option) = prompt.option(&body.selected_option_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Unknown option" })),
        );
    };

    let outcome = state.prompts.respond(&id, &option.id);

    match outcome {
        RespondOutcome::Updated(answered) => {
            if option.id == "3"
                && let PromptContext::ToolPermission {
                    tool_name,
                    action,
                    resource,
                    ..
                } = &answered.context
            {
                // The rule covers exactly what was approved; resource
                // matching is a substring test, so widening it here would
                // widen every future match.
                let rule = PermissionRule {
                    tool: tool_name.clone(),
                    action: action.clone(),
                    resource: resource.clone(),
                    decision: RuleDecision::Allow,
                    scope: answered.project_id.clone(),
                    created_at: now_millis(),
                };
                if let Err(e) = state.permissions.record(&rule) {
                    // The answer stands even if the remember-rule write fails
                    tracing::warn!(prompt_id = %id, error = %e, "failed to record remembered rule");
                } else {
                    info!(
                        tool = %rule.tool,
                        scope = %rule.scope,
                        "recorded allow rule from prompt response"
                    );
                }
            }
            (StatusCode::OK, Json(json!({ "prompt": answered })))
        }
        RespondOutcome::NotPending(status) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "Prompt is no longer pending", "status": status })),
        ),
        RespondOutcome::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Prompt not found" })),
        ),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingQuery {
    conversation_id: Option<String>,
    project_id: Option<String>,
}

async fn pending_prompts(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> (StatusCode, Json<Value>) {
    if query.conversation_id.is_none() && query.project_id.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "conversationId or projectId is required" })),
        );
    }
    let prompts = state.prompts.pending_pickup(
        query.conversation_id.as_deref(),
        query.project_id.as_deref(),
    );
    (StatusCode::OK, Json(json!({ "prompts": prompts })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use gatehouse_shared::risk::RiskTier;
    use gatehouse_shared::schemas::{PromptType, Verdict};

    use crate::delivery::{default_channels, DeliveryService};
    use crate::permissions::PermissionEngine;
    use crate::prompts::PromptService;
    use crate::store::{rules, Store};
    use crate::ws::connection_manager::ConnectionManager;

    fn app_state() -> AppState {
        let store = Arc::new(Store::new_in_memory().unwrap());
        let mgr = Arc::new(ConnectionManager::new());
        let delivery = Arc::new(DeliveryService::new(default_channels(store.clone(), mgr)));
        AppState {
            api_token: "test-token".into(),
            store: store.clone(),
            prompts: Arc::new(PromptService::new(store.clone(), delivery)),
            permissions: Arc::new(PermissionEngine::new(store)),
            cors_origins: vec!["*".into()],
        }
    }

    fn tool_request(resource: &str) -> CreatePromptRequest {
        CreatePromptRequest {
            conversation_id: "conv-1".into(),
            project_id: "proj-1".into(),
            session_id: None,
            prompt_type: PromptType::ToolPermission,
            title: "Run shell command".into(),
            message: format!("bash wants to run `{resource}`"),
            options: Vec::new(),
            context: PromptContext::ToolPermission {
                tool_name: "bash".into(),
                action: "run".into(),
                resource: resource.into(),
                parameters: json!({}),
                risk_tier: RiskTier::High,
                working_directory: None,
                extra: Default::default(),
            },
            timeout_ms: None,
        }
    }

    #[tokio::test]
    async fn remembered_rule_keeps_the_approved_resource() {
        let state = app_state();
        let (prompt, _) = state.prompts.create(tool_request("git pull")).await;

        let (status, _body) = respond_prompt(
            State(state.clone()),
            Path(prompt.id.clone()),
            Json(RespondBody {
                selected_option_id: "3".into(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let recorded = rules::list_rules(&state.store.conn());
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].resource, "git pull");
        assert_eq!(recorded[0].scope, "proj-1");

        // The rule covers the approved command and nothing broader
        let same = state
            .permissions
            .decide("proj-1", "bash", "run", "git pull --rebase");
        assert_eq!(same.verdict, Verdict::AutoAllow);
        let other = state
            .permissions
            .decide("proj-1", "bash", "run", "cargo publish");
        assert_eq!(other.verdict, Verdict::NeedsPrompt);
    }

    #[tokio::test]
    async fn allow_once_records_no_rule() {
        let state = app_state();
        let (prompt, _) = state.prompts.create(tool_request("git pull")).await;

        let (status, _body) = respond_prompt(
            State(state.clone()),
            Path(prompt.id.clone()),
            Json(RespondBody {
                selected_option_id: "1".into(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(rules::list_rules(&state.store.conn()).is_empty());
    }
}
