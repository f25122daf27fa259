//! Broadcast event bus
//!
//! Thin wrapper over `tokio::sync::broadcast`. Publishing never blocks and
//! never fails: with no subscribers the event is dropped, and a slow
//! subscriber that falls behind the ring buffer loses the oldest events
//! (it observes a `Lagged` error, not a crash). Notifications are
//! best-effort by contract; anything that must not be lost goes through a
//! component method instead.

use tokio::sync::broadcast;

use super::types::MeshEvent;

/// Default ring-buffer capacity per subscriber.
const DEFAULT_CAPACITY: usize = 256;

/// Publish/subscribe bus for [`MeshEvent`] notifications
pub struct EventBus {
    sender: broadcast::Sender<MeshEvent>,
}

impl EventBus {
    /// Create a bus with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with an explicit ring-buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: MeshEvent) {
        // Err means no subscribers; notifications are best-effort
        let _ = self.sender.send(event);
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<MeshEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        bus.publish(MeshEvent::BridgeStarted);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(MeshEvent::PatternAdded {
            pattern_id: "blocked".to_string(),
        });

        let event = rx.recv().await.unwrap();
        match event {
            MeshEvent::PatternAdded { pattern_id } => assert_eq!(pattern_id, "blocked"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers_all_receive() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(MeshEvent::BridgeStopped);

        assert!(matches!(rx1.recv().await.unwrap(), MeshEvent::BridgeStopped));
        assert!(matches!(rx2.recv().await.unwrap(), MeshEvent::BridgeStopped));
    }

    #[tokio::test]
    async fn test_lagged_subscriber_does_not_block_publisher() {
        let bus = EventBus::with_capacity(2);
        let mut rx = bus.subscribe();

        for _ in 0..10 {
            bus.publish(MeshEvent::BridgeStarted);
        }

        // The first recv reports the lag; subsequent recvs resume
        let first = rx.recv().await;
        assert!(matches!(
            first,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert!(rx.recv().await.is_ok());
    }
}
