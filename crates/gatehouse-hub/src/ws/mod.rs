pub mod connection_manager;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, warn};
use uuid::Uuid;

use gatehouse_shared::schemas::PushEvent;

use crate::delivery::DeliveryService;
use connection_manager::{ConnectionManager, WsConnection, WsOutMessage};

/// Shared state for WebSocket handlers.
#[derive(Clone)]
pub struct WsState {
    pub conn_mgr: Arc<ConnectionManager>,
    pub delivery: Arc<DeliveryService>,
    pub api_token: String,
}

pub fn ws_router(state: WsState) -> Router {
    Router::new()
        .route("/ws/client", axum::routing::get(ws_client_upgrade))
        .with_state(state)
}

#[derive(Deserialize)]
struct WsClientQuery {
    token: Option<String>,
    #[serde(rename = "conversationId")]
    conversation_id: Option<String>,
    #[serde(rename = "projectId")]
    project_id: Option<String>,
}

async fn ws_client_upgrade(
    State(state): State<WsState>,
    Query(query): Query<WsClientQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = query.token.unwrap_or_default();
    let authorized: bool = token
        .as_bytes()
        .ct_eq(state.api_token.as_bytes())
        .into();
    if !authorized {
        warn!(
            conversation_id = ?query.conversation_id,
            "client WebSocket rejected (bad token)"
        );
        return StatusCode::UNAUTHORIZED.into_response();
    }

    ws.on_upgrade(move |socket| {
        handle_client_ws(socket, state, query.conversation_id, query.project_id)
    })
    .into_response()
}

async fn handle_client_ws(
    socket: WebSocket,
    state: WsState,
    conversation_id: Option<String>,
    project_id: Option<String>,
) {
    let conn_id = Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = unbounded_channel::<WsOutMessage>();

    let conn = WsConnection {
        id: conn_id.clone(),
        conversation_id: conversation_id.clone(),
        project_id: project_id.clone(),
        tx: out_tx,
    };
    state.conn_mgr.add_connection(conn).await;

    debug!(
        conn_id = %conn_id,
        conversation_id = ?conversation_id,
        project_id = ?project_id,
        "client WebSocket connected"
    );

    // Outgoing message pump
    let conn_id_out = conn_id.clone();
    let out_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let result = match msg {
                WsOutMessage::Text(text) => ws_tx.send(Message::Text(text.into())).await,
                WsOutMessage::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            };
            if let Err(e) = result {
                debug!(conn_id = %conn_id_out, error = %e, "WebSocket send failed, closing outgoing pump");
                break;
            }
        }
    });

    // Incoming: clients only talk back to confirm deliveries
    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(_) => break,
        };

        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => break,
            Message::Ping(_) => continue,
            Message::Pong(_) => continue,
            _ => continue,
        };

        let event: PushEvent = match serde_json::from_str(&text) {
            Ok(e) => e,
            Err(_) => continue,
        };

        if let PushEvent::PromptReceivedConfirmation { delivery_id, .. } = event {
            match state
                .delivery
                .handle_ack(&delivery_id, crate::store::now_millis())
            {
                Some(prompt_id) => {
                    debug!(
                        conn_id = %conn_id,
                        delivery_id = %delivery_id,
                        prompt_id = %prompt_id,
                        "delivery confirmed"
                    );
                }
                None => {
                    debug!(
                        conn_id = %conn_id,
                        delivery_id = %delivery_id,
                        "confirmation for unknown or expired delivery"
                    );
                }
            }
        }
    }

    debug!(conn_id = %conn_id, "client WebSocket disconnected");
    state.conn_mgr.remove_connection(&conn_id).await;
    out_task.abort();
}
