use axum::extract::ws::{Message, Utf8Bytes};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::state::session::{Role, Session};

/// Live connection: the session value plus the channel feeding its writer task.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Authentication and role state.
    pub session: Session,
    tx: mpsc::UnboundedSender<Message>,
}

/// Registry of every connected session, enumerated by the broadcast router.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: DashMap<Uuid, SessionEntry>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new unauthenticated connection.
    pub fn register(&self, id: Uuid, tx: mpsc::UnboundedSender<Message>) {
        self.entries.insert(
            id,
            SessionEntry {
                session: Session::new(id),
                tx,
            },
        );
    }

    /// Forget a connection.
    pub fn unregister(&self, id: Uuid) {
        self.entries.remove(&id);
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no connection is live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of a session's current state.
    pub fn session(&self, id: Uuid) -> Option<Session> {
        self.entries.get(&id).map(|entry| entry.session.clone())
    }

    /// Mutate a session in place; `None` when the connection is gone.
    pub fn update<T>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        self.entries
            .get_mut(&id)
            .map(|mut entry| f(&mut entry.session))
    }

    /// Queue a frame for one session.
    pub fn send_to(&self, id: Uuid, frame: Utf8Bytes) {
        let Some(tx) = self.entries.get(&id).map(|entry| entry.tx.clone()) else {
            debug!(session = %id, "dropping frame for disconnected session");
            return;
        };
        if tx.send(Message::Text(frame)).is_err() {
            debug!(session = %id, "writer closed; dropping frame");
        }
    }

    /// Authenticated sessions with a working role, as `(id, role, sender)`.
    ///
    /// Collected up front so no map shard stays locked while frames are queued.
    pub fn recipients(&self) -> Vec<(Uuid, Role, mpsc::UnboundedSender<Message>)> {
        self.entries
            .iter()
            .filter(|entry| entry.session.is_authenticated())
            .filter_map(|entry| {
                entry
                    .session
                    .role()
                    .map(|role| (*entry.key(), role, entry.tx.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_authenticated_sessions_receive_broadcasts() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let anonymous = Uuid::new_v4();
        let player = Uuid::new_v4();
        registry.register(anonymous, tx.clone());
        registry.register(player, tx);

        registry.update(player, |session| session.authenticate(Role::Player));

        let recipients = registry.recipients();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].0, player);
        assert_eq!(recipients[0].1, Role::Player);

        registry.unregister(player);
        assert!(registry.recipients().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn send_to_queues_text_frame() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        registry.register(id, tx);

        registry.send_to(id, Utf8Bytes::from("hello"));
        match rx.try_recv() {
            Ok(Message::Text(text)) => assert_eq!(text.as_str(), "hello"),
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}
