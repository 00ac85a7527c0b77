pub mod permissions;
pub mod prompts;
pub mod rules;

use axum::Router;

use crate::web::AppState;

/// Routes used by the agent bridge, mounted under /cli.
pub fn cli_router() -> Router<AppState> {
    Router::new()
        .merge(prompts::cli_router())
        .merge(rules::router())
        .merge(permissions::router())
}

/// Client-facing routes, mounted under /api.
pub fn api_router() -> Router<AppState> {
    prompts::api_router()
}
