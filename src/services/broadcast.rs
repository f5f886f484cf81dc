use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    dto::ws::ServerMessage,
    state::{ConnectionId, ConnectionRegistry},
};

/// Fans server messages out to the live connections of a session.
///
/// Delivery is best-effort: a connection whose writer is gone is skipped and
/// logged, and the others still receive the message.
#[derive(Clone)]
pub struct BroadcastDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastDispatcher {
    /// Dispatcher over the connections in `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Send `message` to every connection of `session_id` except `exclude`.
    ///
    /// Returns the number of connections the message was queued for.
    pub fn broadcast(
        &self,
        session_id: &str,
        message: &ServerMessage,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let Some(text) = encode(message) else {
            return 0;
        };

        let mut delivered = 0;
        for handle in self.registry.connections_for(session_id) {
            if Some(handle.id) == exclude {
                continue;
            }
            if handle.tx.send(Message::Text(text.clone())).is_err() {
                warn!(
                    session_id,
                    connection_id = %handle.id,
                    "dropping broadcast for closed connection"
                );
                continue;
            }
            delivered += 1;
        }
        debug!(session_id, delivered, "broadcast sent");
        delivered
    }

    /// Send `message` to every connection of `session_id`.
    pub fn broadcast_all(&self, session_id: &str, message: &ServerMessage) -> usize {
        self.broadcast(session_id, message, None)
    }
}

/// Queue `message` on a single connection. Returns `false` when the writer is gone.
pub fn send_to(tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) -> bool {
    match encode(message) {
        Some(text) => tx.send(Message::Text(text)).is_ok(),
        None => true,
    }
}

fn encode(message: &ServerMessage) -> Option<Utf8Bytes> {
    match serde_json::to_string(message) {
        Ok(text) => Some(text.into()),
        Err(err) => {
            // Serialization failure is a bug, not a delivery problem.
            warn!(error = %err, message = ?message, "failed to serialize server message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::state::ConnectionHandle;

    fn connect(
        registry: &ConnectionRegistry,
        session_id: &str,
        user_id: u64,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(tx);
        registry.register(handle.clone(), session_id, user_id);
        (handle, rx)
    }

    const NOTICE: &str = "answer_submitted";

    fn notice() -> ServerMessage {
        ServerMessage::AnswerSubmitted {
            session_id: "s1".into(),
            player_id: 2,
            question_id: 1,
        }
    }

    fn received_type(rx: &mut mpsc::UnboundedReceiver<Message>) -> Option<String> {
        match rx.try_recv().ok()? {
            Message::Text(text) => {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                value["type"].as_str().map(str::to_owned)
            }
            _ => None,
        }
    }

    #[test]
    fn reaches_every_other_connection_of_the_session() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (host, mut host_rx) = connect(&registry, "s1", 1);
        let (_alice, mut alice_rx) = connect(&registry, "s1", 2);
        let (_bob, mut bob_rx) = connect(&registry, "s1", 3);
        let (_other, mut other_rx) = connect(&registry, "s2", 4);

        let dispatcher = BroadcastDispatcher::new(registry);
        assert_eq!(dispatcher.broadcast("s1", &notice(), Some(host.id)), 2);

        assert_eq!(received_type(&mut alice_rx).as_deref(), Some(NOTICE));
        assert_eq!(received_type(&mut bob_rx).as_deref(), Some(NOTICE));
        assert!(host_rx.try_recv().is_err());
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn closed_connections_do_not_block_the_rest() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_alice, alice_rx) = connect(&registry, "s1", 2);
        let (_bob, mut bob_rx) = connect(&registry, "s1", 3);
        drop(alice_rx);

        let dispatcher = BroadcastDispatcher::new(registry);
        assert_eq!(dispatcher.broadcast_all("s1", &notice()), 1);
        assert_eq!(received_type(&mut bob_rx).as_deref(), Some(NOTICE));
        assert_eq!(dispatcher.broadcast_all("empty", &notice()), 0);
    }

    #[test]
    fn send_to_reports_closed_writer() {
        let (tx, rx) = mpsc::unbounded_channel();
        assert!(send_to(&tx, &notice()));
        drop(rx);
        assert!(!send_to(&tx, &notice()));
    }
}
