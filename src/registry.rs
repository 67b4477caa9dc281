//! User registry
//!
//! Thread-safe mapping from username to live session handle. Enforces
//! global username uniqueness: the duplicate check and the insert happen
//! under one lock acquisition. Entries are removed in the same critical
//! section that forgets the session, so no lookup can ever return a handle
//! for a session that already tore down its registration.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::session::SessionHandle;

/// Mapping from username to the one active session holding it
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: Mutex<HashMap<String, SessionHandle>>,
}

impl UserRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user unless the name is already taken
    ///
    /// Returns `false` (and leaves the registry unchanged) on conflict.
    /// Comparison is case-sensitive.
    pub async fn insert_if_absent(&self, name: &str, handle: SessionHandle) -> bool {
        let mut users = self.users.lock().await;
        if users.contains_key(name) {
            return false;
        }
        users.insert(name.to_string(), handle);
        true
    }

    /// Remove a user's registration
    pub async fn remove(&self, name: &str) {
        self.users.lock().await.remove(name);
    }

    /// Look up a user, returning a cloned send handle
    pub async fn lookup(&self, name: &str) -> Option<SessionHandle> {
        self.users.lock().await.get(name).cloned()
    }

    /// Number of registered users
    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    /// Whether the registry holds no users
    pub async fn is_empty(&self) -> bool {
        self.users.lock().await.is_empty()
    }

    /// Send one line to every registered session, returning the count
    ///
    /// Used by the shutdown path. Sends are best-effort; a dead handle does
    /// not stop the fan-out and still counts as an addressed session.
    pub async fn notify_all(&self, line: &str) -> usize {
        let users = self.users.lock().await;
        for handle in users.values() {
            let _ = handle.send(line);
        }
        users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use tokio::sync::mpsc;

    fn named_session(name: &str) -> (Session, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = Session::new("127.0.0.1:0".parse().unwrap(), tx);
        session.username = Some(name.to_string());
        (session, rx)
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let registry = UserRegistry::new();
        let (session, _rx) = named_session("alice");

        assert!(registry.insert_if_absent("alice", session.handle()).await);
        let found = registry.lookup("alice").await.unwrap();
        assert_eq!(found.id, session.id);
        assert!(registry.lookup("bob").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let registry = UserRegistry::new();
        let (first, _rx1) = named_session("alice");
        let (second, _rx2) = named_session("alice");

        assert!(registry.insert_if_absent("alice", first.handle()).await);
        assert!(!registry.insert_if_absent("alice", second.handle()).await);

        // The original registration survives the rejected attempt.
        assert_eq!(registry.lookup("alice").await.unwrap().id, first.id);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_names_are_case_sensitive() {
        let registry = UserRegistry::new();
        let (lower, _rx1) = named_session("alice");
        let (upper, _rx2) = named_session("Alice");

        assert!(registry.insert_if_absent("alice", lower.handle()).await);
        assert!(registry.insert_if_absent("Alice", upper.handle()).await);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = UserRegistry::new();
        let (session, _rx) = named_session("alice");

        registry.insert_if_absent("alice", session.handle()).await;
        registry.remove("alice").await;

        assert!(registry.lookup("alice").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_notify_all_counts_sessions() {
        let registry = UserRegistry::new();
        let (alice, mut alice_rx) = named_session("alice");
        let (bob, mut bob_rx) = named_session("bob");
        registry.insert_if_absent("alice", alice.handle()).await;
        registry.insert_if_absent("bob", bob.handle()).await;

        let count = registry.notify_all("[SERVER] Server shutting down. Goodbye!\n").await;

        assert_eq!(count, 2);
        assert_eq!(
            alice_rx.recv().await.unwrap(),
            "[SERVER] Server shutting down. Goodbye!\n"
        );
        assert_eq!(
            bob_rx.recv().await.unwrap(),
            "[SERVER] Server shutting down. Goodbye!\n"
        );
    }
}
