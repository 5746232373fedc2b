//! In-process bus over per-subject broadcast channels.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::debug;

use crate::{BusResult, MessageBus};

const DEFAULT_CAPACITY: usize = 128;

/// Subject-addressed bus for tests and single-process deployments.
///
/// Each subject gets its own broadcast channel; publishing to a subject
/// with no subscribers succeeds and drops the message, matching the
/// fire-and-forget contract.
pub struct InProcessBus {
    topics: RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    capacity: usize,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Buffered messages retained per subject for slow subscribers.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Subscribe to a subject. Messages published before the subscription
    /// are not replayed.
    pub fn subscribe(&self, subject: &str) -> broadcast::Receiver<Vec<u8>> {
        let mut topics = self.topics.write().expect("topics lock");
        topics
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus for InProcessBus {
    fn publish(&self, subject: &str, payload: &[u8]) -> BusResult<()> {
        let topics = self.topics.read().expect("topics lock");
        match topics.get(subject) {
            Some(sender) => {
                // A send error only means there are no live receivers.
                let receivers = sender.send(payload.to_vec()).unwrap_or(0);
                debug!(%subject, receivers, "message published");
            }
            None => debug!(%subject, "message published to subject with no subscribers"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::AgentMessage;

    #[test]
    fn publish_reaches_subscriber() {
        let bus = InProcessBus::new();
        let mut rx = bus.subscribe("Agent/abc");

        let msg = AgentMessage::config_update("gprof", "true");
        bus.publish("Agent/abc", &msg.to_bytes().unwrap()).unwrap();

        let received = rx.try_recv().unwrap();
        assert_eq!(AgentMessage::from_bytes(&received).unwrap(), msg);
    }

    #[test]
    fn publish_without_subscribers_is_fire_and_forget() {
        let bus = InProcessBus::new();
        bus.publish("Agent/nobody", b"{}").unwrap();
    }

    #[test]
    fn subjects_are_isolated() {
        let bus = InProcessBus::new();
        let mut rx_a = bus.subscribe("Agent/a");
        let mut rx_b = bus.subscribe("Agent/b");

        bus.publish("Agent/a", b"for-a").unwrap();

        assert_eq!(rx_a.try_recv().unwrap(), b"for-a".to_vec());
        assert!(rx_b.try_recv().is_err());
    }
}
