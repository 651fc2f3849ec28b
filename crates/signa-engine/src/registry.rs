use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use signa_core::ConnectionId;
use tokio::sync::mpsc;

/// Result of handing a message to a connection's writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The outbound buffer is full; the message was dropped.
    Full,
    /// The writer has gone away.
    Closed,
    /// No such connection is registered.
    Unknown,
}

/// What is known about a connection when it is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub age: Duration,
    /// Messages dropped because the outbound buffer was full.
    pub dropped_messages: u64,
}

struct ConnectionEntry {
    active: bool,
    outbound: mpsc::Sender<Arc<String>>,
    connected_at: Instant,
    dropped_messages: u64,
}

/// Live connections and their recognition opt-in flag.
///
/// Not synchronized on its own: the [`Pipeline`](crate::Pipeline) keeps it
/// behind the same lock as the frame queue.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection with recognition off. Replaces an entry with the same id.
    pub fn register(&mut self, id: ConnectionId, outbound: mpsc::Sender<Arc<String>>) {
        let entry = ConnectionEntry {
            active: false,
            outbound,
            connected_at: Instant::now(),
            dropped_messages: 0,
        };
        let _ = self.connections.insert(id, entry);
    }

    /// Remove a connection. Returns `None` if it was not registered.
    pub fn unregister(&mut self, id: &ConnectionId) -> Option<ConnectionSummary> {
        self.connections.remove(id).map(|entry| ConnectionSummary {
            age: entry.connected_at.elapsed(),
            dropped_messages: entry.dropped_messages,
        })
    }

    /// Turn recognition on. Returns `false` for an unknown connection.
    pub fn activate(&mut self, id: &ConnectionId) -> bool {
        self.set_active(id, true)
    }

    /// Turn recognition off. Returns `false` for an unknown connection.
    pub fn deactivate(&mut self, id: &ConnectionId) -> bool {
        self.set_active(id, false)
    }

    fn set_active(&mut self, id: &ConnectionId, active: bool) -> bool {
        match self.connections.get_mut(id) {
            Some(entry) => {
                entry.active = active;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn is_active(&self, id: &ConnectionId) -> bool {
        self.connections.get(id).is_some_and(|e| e.active)
    }

    /// Registered, writer still open, and recognition on.
    pub fn is_eligible(&self, id: &ConnectionId) -> bool {
        self.connections
            .get(id)
            .is_some_and(|e| e.active && !e.outbound.is_closed())
    }

    /// Queue a message on the connection's writer without waiting.
    pub fn send(&mut self, id: &ConnectionId, message: Arc<String>) -> SendOutcome {
        let Some(entry) = self.connections.get_mut(id) else {
            return SendOutcome::Unknown;
        };
        match entry.outbound.try_send(message) {
            Ok(()) => SendOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                entry.dropped_messages += 1;
                tracing::warn!(
                    conn_id = %id,
                    msg_len = msg.len(),
                    "send queue full, dropping message"
                );
                SendOutcome::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.connections.values().filter(|e| e.active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(capacity: usize) -> (ConnectionRegistry, ConnectionId, mpsc::Receiver<Arc<String>>) {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(capacity);
        registry.register(id.clone(), tx);
        (registry, id, rx)
    }

    #[test]
    fn register_starts_inactive() {
        let (registry, id, _rx) = registered(4);
        assert!(registry.contains(&id));
        assert!(!registry.is_active(&id));
        assert!(!registry.is_eligible(&id));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn activate_is_idempotent() {
        let (mut registry, id, _rx) = registered(4);
        assert!(registry.activate(&id));
        assert!(registry.activate(&id));
        assert!(registry.is_eligible(&id));
        assert_eq!(registry.active_count(), 1);

        assert!(registry.deactivate(&id));
        assert!(registry.deactivate(&id));
        assert!(!registry.is_eligible(&id));
    }

    #[test]
    fn toggles_on_unknown_connection() {
        let mut registry = ConnectionRegistry::new();
        let ghost = ConnectionId::new();
        assert!(!registry.activate(&ghost));
        assert!(!registry.deactivate(&ghost));
        assert!(!registry.is_eligible(&ghost));
    }

    #[test]
    fn unregister_removes_eligibility() {
        let (mut registry, id, _rx) = registered(4);
        registry.activate(&id);
        assert!(registry.unregister(&id).is_some());
        assert!(registry.unregister(&id).is_none());
        assert!(!registry.is_eligible(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn closed_writer_is_not_eligible() {
        let (mut registry, id, rx) = registered(4);
        registry.activate(&id);
        drop(rx);
        assert!(registry.is_active(&id));
        assert!(!registry.is_eligible(&id));
        assert_eq!(registry.send(&id, Arc::new("x".into())), SendOutcome::Closed);
    }

    #[tokio::test]
    async fn send_delivers_in_order() {
        let (mut registry, id, mut rx) = registered(4);
        assert_eq!(registry.send(&id, Arc::new("a".into())), SendOutcome::Sent);
        assert_eq!(registry.send(&id, Arc::new("b".into())), SendOutcome::Sent);
        assert_eq!(&*rx.recv().await.unwrap(), "a");
        assert_eq!(&*rx.recv().await.unwrap(), "b");
    }

    #[test]
    fn full_buffer_drops_and_counts() {
        let (mut registry, id, _rx) = registered(1);
        assert_eq!(registry.send(&id, Arc::new("1".into())), SendOutcome::Sent);
        assert_eq!(registry.send(&id, Arc::new("2".into())), SendOutcome::Full);
        assert_eq!(registry.send(&id, Arc::new("3".into())), SendOutcome::Full);
        let summary = registry.unregister(&id).unwrap();
        assert_eq!(summary.dropped_messages, 2);
    }

    #[test]
    fn send_to_unknown() {
        let mut registry = ConnectionRegistry::new();
        assert_eq!(
            registry.send(&ConnectionId::new(), Arc::new("x".into())),
            SendOutcome::Unknown
        );
    }

    #[test]
    fn reregister_resets_activation() {
        let (mut registry, id, _rx) = registered(4);
        registry.activate(&id);
        let (tx, _rx2) = mpsc::channel(4);
        registry.register(id.clone(), tx);
        assert!(!registry.is_active(&id));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.unregister(&id).unwrap().dropped_messages, 0);
    }
}
