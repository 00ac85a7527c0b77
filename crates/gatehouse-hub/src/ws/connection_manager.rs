use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};

/// A message to be sent to a WebSocket connection.
#[derive(Debug, Clone)]
pub enum WsOutMessage {
    Text(String),
    Close,
}

/// Per-connection state.
pub struct WsConnection {
    pub id: String,
    pub conversation_id: Option<String>,
    pub project_id: Option<String>,
    pub tx: mpsc::UnboundedSender<WsOutMessage>,
}

/// Central connection manager for all client WebSocket connections.
/// Thread-safe via RwLock for use across axum handlers.
pub struct ConnectionManager {
    connections: RwLock<HashMap<String, WsConnection>>,
    /// Connections joined to conversation rooms: conversation_id → conn_ids
    conversation_rooms: RwLock<HashMap<String, Vec<String>>>,
    /// Connections joined to project rooms: project_id → conn_ids
    project_rooms: RwLock<HashMap<String, Vec<String>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            conversation_rooms: RwLock::new(HashMap::new()),
            project_rooms: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add_connection(&self, conn: WsConnection) {
        let id = conn.id.clone();
        let conversation_id = conn.conversation_id.clone();
        let project_id = conn.project_id.clone();
        self.connections.write().await.insert(id.clone(), conn);
        if let Some(cid) = conversation_id {
            self.conversation_rooms
                .write()
                .await
                .entry(cid)
                .or_default()
                .push(id.clone());
        }
        if let Some(pid) = project_id {
            self.project_rooms
                .write()
                .await
                .entry(pid)
                .or_default()
                .push(id.clone());
        }
    }

    pub async fn remove_connection(&self, conn_id: &str) {
        {
            let mut rooms = self.conversation_rooms.write().await;
            for members in rooms.values_mut() {
                members.retain(|id| id != conn_id);
            }
            rooms.retain(|_, v| !v.is_empty());
        }
        {
            let mut rooms = self.project_rooms.write().await;
            for members in rooms.values_mut() {
                members.retain(|id| id != conn_id);
            }
            rooms.retain(|_, v| !v.is_empty());
        }

        self.connections.write().await.remove(conn_id);
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send to every member of a conversation room. Returns how many
    /// connections accepted the message.
    pub async fn send_to_conversation(&self, conversation_id: &str, msg: &str) -> usize {
        let rooms = self.conversation_rooms.read().await;
        let Some(members) = rooms.get(conversation_id) else {
            return 0;
        };
        let conns = self.connections.read().await;
        let mut delivered = 0;
        for member_id in members {
            if let Some(conn) = conns.get(member_id)
                && conn.tx.send(WsOutMessage::Text(msg.to_string())).is_ok()
            {
                delivered += 1;
            }
        }
        delivered
    }

    /// Send to every member of a project room.
    pub async fn send_to_project(&self, project_id: &str, msg: &str) -> usize {
        let rooms = self.project_rooms.read().await;
        let Some(members) = rooms.get(project_id) else {
            return 0;
        };
        let conns = self.connections.read().await;
        let mut delivered = 0;
        for member_id in members {
            if let Some(conn) = conns.get(member_id)
                && conn.tx.send(WsOutMessage::Text(msg.to_string())).is_ok()
            {
                delivered += 1;
            }
        }
        delivered
    }

    /// Last-resort fan-out to every connected client.
    pub async fn broadcast_all(&self, msg: &str) -> usize {
        let conns = self.connections.read().await;
        let mut delivered = 0;
        for conn in conns.values() {
            if conn.tx.send(WsOutMessage::Text(msg.to_string())).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Send Close to all connections for graceful shutdown.
    pub async fn close_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.tx.send(WsOutMessage::Close);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(
        id: &str,
        conversation_id: Option<&str>,
        project_id: Option<&str>,
    ) -> (WsConnection, mpsc::UnboundedReceiver<WsOutMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            WsConnection {
                id: id.into(),
                conversation_id: conversation_id.map(Into::into),
                project_id: project_id.map(Into::into),
                tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn rooms_route_messages() {
        let mgr = ConnectionManager::new();
        let (c1, mut rx1) = conn("c1", Some("conv-a"), Some("proj-1"));
        let (c2, mut rx2) = conn("c2", Some("conv-b"), Some("proj-1"));
        mgr.add_connection(c1).await;
        mgr.add_connection(c2).await;

        assert_eq!(mgr.send_to_conversation("conv-a", "hello").await, 1);
        assert!(matches!(rx1.try_recv(), Ok(WsOutMessage::Text(t)) if t == "hello"));
        assert!(rx2.try_recv().is_err());

        assert_eq!(mgr.send_to_project("proj-1", "wide").await, 2);
        assert_eq!(mgr.broadcast_all("all").await, 2);
        assert_eq!(mgr.send_to_conversation("conv-missing", "x").await, 0);
    }

    #[tokio::test]
    async fn removal_empties_rooms() {
        let mgr = ConnectionManager::new();
        let (c1, _rx1) = conn("c1", Some("conv-a"), None);
        mgr.add_connection(c1).await;
        mgr.remove_connection("c1").await;

        assert_eq!(mgr.connection_count().await, 0);
        assert_eq!(mgr.send_to_conversation("conv-a", "x").await, 0);
    }
}
