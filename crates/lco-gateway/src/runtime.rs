use parking_lot::RwLock;

use lco_types::connection::ConnectionState;
use lco_types::event::{Event, FeedEntry};

use crate::buffer::{MessageBuffer, DEFAULT_CAPACITY};

/// Process-local state: mirrored connection status, online count and the
/// bounded feed. Not persisted.
pub struct RuntimeStore {
    inner: RwLock<RuntimeState>,
}

#[derive(Debug, Clone)]
pub struct RuntimeSnapshot {
    pub connection_state: ConnectionState,
    pub online_user_count: Option<u64>,
    pub messages: Vec<FeedEntry>,
}

struct RuntimeState {
    connection_state: ConnectionState,
    online_user_count: Option<u64>,
    messages: MessageBuffer<FeedEntry>,
}

impl RuntimeStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(RuntimeState {
                connection_state: ConnectionState::Disconnected,
                online_user_count: None,
                messages: MessageBuffer::new(capacity),
            }),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.read().connection_state
    }

    /// Returns false if the state was already `state`.
    pub fn set_connection_state(&self, state: ConnectionState) -> bool {
        let mut inner = self.inner.write();
        let changed = inner.connection_state != state;
        inner.connection_state = state;
        changed
    }

    pub fn online_user_count(&self) -> Option<u64> {
        self.inner.read().online_user_count
    }

    pub fn set_online_user_count(&self, count: Option<u64>) {
        self.inner.write().online_user_count = count;
    }

    /// Wrap `event` in a feed entry and append it, evicting the oldest
    /// entries past capacity.
    pub fn add_message(&self, event: Event) -> FeedEntry {
        let entry = FeedEntry::new(event);
        self.inner.write().messages.push(entry.clone());
        entry
    }

    pub fn clear_messages(&self) {
        self.inner.write().messages.clear();
    }

    pub fn messages(&self) -> Vec<FeedEntry> {
        self.inner.read().messages.snapshot()
    }

    pub fn message_count(&self) -> usize {
        self.inner.read().messages.len()
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        let inner = self.inner.read();
        RuntimeSnapshot {
            connection_state: inner.connection_state,
            online_user_count: inner.online_user_count,
            messages: inner.messages.snapshot(),
        }
    }
}

impl Default for RuntimeStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lco_types::event::SystemEvent;

    fn system(text: &str) -> Event {
        Event::System(SystemEvent {
            message: text.into(),
            ..Default::default()
        })
    }

    #[test]
    fn starts_disconnected_and_empty() {
        let store = RuntimeStore::default();
        let snap = store.snapshot();
        assert_eq!(snap.connection_state, ConnectionState::Disconnected);
        assert_eq!(snap.online_user_count, None);
        assert!(snap.messages.is_empty());
    }

    #[test]
    fn add_message_respects_capacity() {
        let store = RuntimeStore::new(2);
        store.add_message(system("a"));
        store.add_message(system("b"));
        let last = store.add_message(system("c"));
        let messages = store.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].event, system("b"));
        assert_eq!(messages[1].id, last.id);
    }

    #[test]
    fn connection_state_change_detection() {
        let store = RuntimeStore::default();
        assert!(store.set_connection_state(ConnectionState::Connecting));
        assert!(!store.set_connection_state(ConnectionState::Connecting));
        assert_eq!(store.connection_state(), ConnectionState::Connecting);
    }

    #[test]
    fn clear_messages_keeps_counters() {
        let store = RuntimeStore::default();
        store.set_online_user_count(Some(42));
        store.add_message(system("a"));
        store.clear_messages();
        assert_eq!(store.message_count(), 0);
        assert_eq!(store.online_user_count(), Some(42));
    }
}
