use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use gatehouse_shared::schemas::{PermissionRule, RuleDecision, GLOBAL_SCOPE};

use crate::store::{now_millis, rules};
use crate::web::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rules", post(record_rule))
        .route("/rules", get(list_rules))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordRuleBody {
    tool: String,
    action: Option<String>,
    resource: Option<String>,
    decision: RuleDecision,
    scope: Option<String>,
}

async fn record_rule(
    State(state): State<AppState>,
    Json(body): Json<RecordRuleBody>,
) -> (StatusCode, Json<Value>) {
    if body.tool.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "tool is required" })),
        );
    }

    let rule = PermissionRule {
        tool: body.tool,
        action: body.action.unwrap_or_else(|| "*".into()),
        resource: body.resource.unwrap_or_else(|| "*".into()),
        decision: body.decision,
        scope: body.scope.unwrap_or_else(|| GLOBAL_SCOPE.into()),
        created_at: now_millis(),
    };

    match state.permissions.record(&rule) {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "rule": rule }))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

async fn list_rules(State(state): State<AppState>) -> Json<Value> {
    let all = rules::list_rules(&state.store.conn());
    Json(json!({ "rules": all }))
}
