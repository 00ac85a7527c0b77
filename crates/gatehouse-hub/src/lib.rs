pub mod config;
pub mod delivery;
pub mod permissions;
pub mod prompts;
pub mod store;
pub mod web;
pub mod ws;

use std::sync::Arc;

use tracing::info;

use config::Configuration;
use delivery::DeliveryService;
use permissions::PermissionEngine;
use prompts::PromptService;
use store::Store;
use web::AppState;
use ws::connection_manager::ConnectionManager;
use ws::WsState;

pub async fn run_hub() -> anyhow::Result<()> {
    let config = Configuration::create()?;

    info!(
        host = %config.listen_host,
        port = config.listen_port,
        db = %config.db_path.display(),
        "starting hub"
    );

    let db_path_str = config.db_path.to_string_lossy().to_string();
    let store = Arc::new(Store::new(&db_path_str)?);

    let conn_mgr = Arc::new(ConnectionManager::new());
    let delivery = Arc::new(DeliveryService::new(delivery::default_channels(
        store.clone(),
        conn_mgr.clone(),
    )));
    let prompt_service = Arc::new(PromptService::new(store.clone(), delivery.clone()));
    let permission_engine = Arc::new(PermissionEngine::new(store.clone()));

    let app_state = AppState {
        api_token: config.api_token.clone(),
        store: store.clone(),
        prompts: prompt_service.clone(),
        permissions: permission_engine,
        cors_origins: config.cors_origins.clone(),
    };

    let ws_state = WsState {
        conn_mgr: conn_mgr.clone(),
        delivery: delivery.clone(),
        api_token: config.api_token.clone(),
    };

    let app = web::build_router(app_state).merge(ws::ws_router(ws_state));

    // Prompt expiry sweeper
    let prompts_for_expiry = prompt_service.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            interval.tick().await;
            prompts_for_expiry.expire_due();
        }
    });

    // Ack expiry sweeper
    let delivery_for_sweep = delivery.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            delivery_for_sweep.sweep_acks(store::now_millis());
        }
    });

    if config.api_token_is_new {
        info!(token = %config.api_token, "generated new API token");
    }

    let addr = format!("{}:{}", config.listen_host, config.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "listening");

    // Use a Notify so we can trigger graceful shutdown from outside
    let shutdown_notify = Arc::new(tokio::sync::Notify::new());
    let shutdown_notify_srv = shutdown_notify.clone();

    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_notify_srv.notified().await;
            })
            .await
    });

    shutdown_signal().await;

    info!("closing all WebSocket connections");
    conn_mgr.close_all().await;

    shutdown_notify.notify_one();

    if tokio::time::timeout(std::time::Duration::from_secs(5), server_task)
        .await
        .is_err()
    {
        info!("graceful shutdown timed out, forcing exit");
    }

    info!("hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
