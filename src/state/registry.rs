//! Live WebSocket connections and their session memberships.

use std::{
    collections::HashMap,
    fmt,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::dao::models::UserId;

/// Locally generated identifier of a live transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug)]
/// Handle used to push messages to a connected client.
pub struct ConnectionHandle {
    /// Identifier of the connection.
    pub id: ConnectionId,
    /// Queue drained by the connection's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
    /// Handle with a fresh [`ConnectionId`].
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: ConnectionId::new(),
            tx,
        }
    }
}

/// Session and user a connection joined as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    /// Joined session.
    pub session_id: String,
    /// User the connection acts for.
    pub user_id: UserId,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, HashMap<ConnectionId, ConnectionHandle>>,
    members: HashMap<ConnectionId, Membership>,
}

impl Inner {
    fn detach(&mut self, id: ConnectionId) -> Option<Membership> {
        let membership = self.members.remove(&id)?;
        if let Some(connections) = self.sessions.get_mut(&membership.session_id) {
            connections.remove(&id);
            if connections.is_empty() {
                self.sessions.remove(&membership.session_id);
            }
        }
        Some(membership)
    }
}

/// Index of live connections per session, and of the user behind each connection.
///
/// Holds only session identifiers and sender handles; session records stay in
/// storage. Every access goes through a single read/write lock.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // Nothing mutates the maps halfway through, so a poisoned lock still guards
    // consistent data.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach `handle` to `session_id` as `user_id`.
    ///
    /// A connection belongs to one session at a time; registering it again
    /// moves it and returns the membership it had before.
    pub fn register(
        &self,
        handle: ConnectionHandle,
        session_id: &str,
        user_id: UserId,
    ) -> Option<Membership> {
        let mut inner = self.write();
        let previous = inner.detach(handle.id);
        inner.members.insert(
            handle.id,
            Membership {
                session_id: session_id.to_owned(),
                user_id,
            },
        );
        inner
            .sessions
            .entry(session_id.to_owned())
            .or_default()
            .insert(handle.id, handle);
        previous
    }

    /// Detach a connection from its session, pruning the session entry when it
    /// was the last one. Unknown identifiers are ignored.
    pub fn unregister(&self, id: ConnectionId) -> Option<Membership> {
        self.write().detach(id)
    }

    /// Handles of every connection currently registered for `session_id`.
    pub fn connections_for(&self, session_id: &str) -> Vec<ConnectionHandle> {
        self.read()
            .sessions
            .get(session_id)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Live connections registered for `session_id`.
    pub fn connection_count(&self, session_id: &str) -> usize {
        self.read()
            .sessions
            .get(session_id)
            .map_or(0, HashMap::len)
    }

    /// Session and user the connection joined as, if it has joined.
    pub fn membership(&self, id: ConnectionId) -> Option<Membership> {
        self.read().members.get(&id).cloned()
    }

    /// Number of sessions with at least one live connection.
    pub fn session_count(&self) -> usize {
        self.read().sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(tx), rx)
    }

    #[test]
    fn register_and_list() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = handle();
        let (b, _rx_b) = handle();
        registry.register(a.clone(), "s1", 1);
        registry.register(b.clone(), "s1", 2);

        assert_eq!(registry.connection_count("s1"), 2);
        assert_eq!(registry.connection_count("s2"), 0);
        assert_eq!(
            registry.membership(b.id),
            Some(Membership {
                session_id: "s1".into(),
                user_id: 2
            })
        );
    }

    #[test]
    fn unregister_prunes_empty_sessions() {
        let registry = ConnectionRegistry::new();
        let (a, _rx) = handle();
        registry.register(a.clone(), "s1", 1);

        let removed = registry.unregister(a.id);
        assert_eq!(removed.map(|m| m.user_id), Some(1));
        assert_eq!(registry.session_count(), 0);
        assert!(registry.connections_for("s1").is_empty());
    }

    #[test]
    fn unregister_unknown_connection_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        let (a, _rx) = handle();
        registry.register(a, "s1", 1);

        assert!(registry.unregister(ConnectionId::new()).is_none());
        assert_eq!(registry.connection_count("s1"), 1);
    }

    #[test]
    fn re_registering_moves_the_connection() {
        let registry = ConnectionRegistry::new();
        let (a, _rx) = handle();
        registry.register(a.clone(), "s1", 1);

        let previous = registry.register(a.clone(), "s2", 1);
        assert_eq!(previous.map(|m| m.session_id), Some("s1".to_owned()));
        assert_eq!(registry.connection_count("s1"), 0);
        assert_eq!(registry.connection_count("s2"), 1);
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn concurrent_registration_is_consistent() {
        let registry = std::sync::Arc::new(ConnectionRegistry::new());
        let threads: Vec<_> = (0..8)
            .map(|n| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let (tx, _rx) = mpsc::unbounded_channel();
                    let handle = ConnectionHandle::new(tx);
                    registry.register(handle.clone(), "shared", n);
                    if n % 2 == 0 {
                        registry.unregister(handle.id);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(registry.connection_count("shared"), 4);
    }
}
