use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
};

use tokio::{sync::broadcast, task::JoinHandle};

/// A change somebody may be watching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Profile { user_id: String },
    Conversation { pairing_id: String },
    Typing { pairing_id: String, user_id: String, typing: bool },
}

/// Fan-out point for change notifications, plus the live connection count per user
/// that drives the presence flag.
#[derive(Debug, Clone)]
pub struct Hub {
    tx: broadcast::Sender<Event>,
    connections: Arc<Mutex<HashMap<String, usize>>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
            connections: Arc::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // no receivers is fine
        let _ = self.tx.send(event);
    }

    pub fn profile_changed(&self, user_id: &str) {
        self.publish(Event::Profile { user_id: user_id.to_owned() });
    }

    pub fn conversation_changed(&self, pairing_id: &str) {
        self.publish(Event::Conversation { pairing_id: pairing_id.to_owned() });
    }

    /// Registers one more live connection for `user_id`. True if it is the first.
    pub(crate) fn connection_opened(&self, user_id: &str) -> bool {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        let count = connections.entry(user_id.to_owned()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Drops one live connection for `user_id`. True if it was the last.
    pub(crate) fn connection_closed(&self, user_id: &str) -> bool {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        match connections.get_mut(user_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                connections.remove(user_id);
                true
            }
            None => false,
        }
    }
}

/// Handle to a running observation. Dropping it stops the observer.
#[must_use = "the subscription ends as soon as the handle is dropped"]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn spawn(fut: impl Future<Output = ()> + Send + 'static) -> Self {
        Self { task: tokio::spawn(fut) }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_counts_track_first_and_last() {
        let hub = Hub::default();
        assert!(hub.connection_opened("a"));
        assert!(!hub.connection_opened("a"));
        assert!(!hub.connection_closed("a"));
        assert!(hub.connection_closed("a"));
        assert!(!hub.connection_closed("a"));
    }

    #[tokio::test]
    async fn dropping_a_subscription_aborts_its_task() {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(1);
        let sub = Subscription::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        });
        drop(sub);
        // the sender lives inside the aborted task, so the channel closes
        assert!(rx.recv().await.is_none());
    }
}
