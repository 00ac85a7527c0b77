use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use gatehouse_shared::schemas::GLOBAL_SCOPE;

use crate::web::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/permissions/decide", post(decide))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecideBody {
    tool: String,
    action: Option<String>,
    resource: Option<String>,
    scope: Option<String>,
}

async fn decide(
    State(state): State<AppState>,
    Json(body): Json<DecideBody>,
) -> (StatusCode, Json<Value>) {
    if body.tool.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "tool is required" })),
        );
    }

    let decision = state.permissions.decide(
        body.scope.as_deref().unwrap_or(GLOBAL_SCOPE),
        &body.tool,
        body.action.as_deref().unwrap_or(""),
        body.resource.as_deref().unwrap_or(""),
    );

    (StatusCode::OK, Json(json!({ "decision": decision })))
}
