pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;

use crate::permissions::PermissionEngine;
use crate::prompts::PromptService;
use crate::store::Store;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub api_token: String,
    pub store: Arc<Store>,
    pub prompts: Arc<PromptService>,
    pub permissions: Arc<PermissionEngine>,
    pub cors_origins: Vec<String>,
}

/// Build the axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    use tower_http::cors::AllowOrigin;

    let cors_origins = &state.cors_origins;
    let allow_origin = if cors_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<axum::http::HeaderValue> = cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    let cors = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
        .allow_origin(allow_origin);

    let cli_routes = routes::cli_router()
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::bearer_auth,
        ))
        .layer(cors.clone());

    let api_routes = routes::api_router()
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::bearer_auth,
        ))
        .layer(cors);

    Router::new()
        .route(
            "/health",
            axum::routing::get(|| async { axum::Json(serde_json::json!({ "status": "ok" })) }),
        )
        .nest("/cli", cli_routes)
        .nest("/api", api_routes)
        .with_state(state)
}
