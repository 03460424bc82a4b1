//! Fan-out of `OverlayEvent`s to every interested party: the shell's webview
//! forwarder, the event adapter (for settings changes) and tests.
//!
//! Receivers that fall more than [`BUS_CAPACITY`] events behind get
//! `RecvError::Lagged` and must resync from the stores.

use tokio::sync::broadcast;
use tracing::trace;

use lco_types::ipc::OverlayEvent;

/// A full feed of buffered entries plus room for settings and state churn.
pub const BUS_CAPACITY: usize = 512;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<OverlayEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OverlayEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish to current subscribers. With nobody listening (the CLI, or
    /// before the shell is up) the event is dropped. Returns how many
    /// subscribers it reached.
    pub fn send(&self, event: OverlayEvent) -> usize {
        let channel = event.channel();
        let reached = self.sender.send(event).unwrap_or(0);
        trace!("{channel} -> {reached} subscriber(s)");
        reached
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
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn dropped_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.send(OverlayEvent::FeedCleared), 0);
    }

    #[test]
    fn every_subscriber_gets_a_copy() {
        let bus = EventBus::new();
        let mut shell = bus.subscribe();
        let mut adapter = bus.clone().subscribe();
        assert_eq!(bus.send(OverlayEvent::ClickThroughEnabled { enabled: true }), 2);
        for rx in [&mut shell, &mut adapter] {
            assert!(matches!(
                rx.try_recv(),
                Ok(OverlayEvent::ClickThroughEnabled { enabled: true })
            ));
        }
    }

    #[test]
    fn slow_subscriber_lags() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        for _ in 0..BUS_CAPACITY + 3 {
            bus.send(OverlayEvent::FeedCleared);
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(3))));
    }
}
