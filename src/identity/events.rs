use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;

use crate::auth::Session;

/// Identity provider notifications consumed by the auth state machine
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
}

type Listeners = Mutex<HashMap<u64, mpsc::UnboundedSender<AuthEvent>>>;

/// Fan-out of auth events to registered subscriptions
pub struct AuthEventHub {
    next_id: AtomicU64,
    listeners: Arc<Listeners>,
}

impl AuthEventHub {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn subscribe(&self) -> AuthSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, tx);

        AuthSubscription {
            id,
            rx,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn emit(&self, event: AuthEvent) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

impl Default for AuthEventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration for auth events. Dropping it unregisters from the hub;
/// once the hub itself is gone `recv` returns `None`.
pub struct AuthSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<AuthEvent>,
    listeners: Weak<Listeners>,
}

impl AuthSubscription {
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        self.rx.recv().await
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_events_to_every_subscriber() {
        let hub = AuthEventHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.emit(AuthEvent::SignedOut);
        assert_eq!(a.recv().await, Some(AuthEvent::SignedOut));
        assert_eq!(b.recv().await, Some(AuthEvent::SignedOut));
    }

    #[test]
    fn drop_unregisters() {
        let hub = AuthEventHub::new();
        let sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dropping_the_hub_ends_the_stream() {
        let hub = AuthEventHub::new();
        let mut sub = hub.subscribe();
        drop(hub);
        assert_eq!(sub.recv().await, None);
    }
}
