use std::time::SystemTime;

use tokio::sync::broadcast;

use crate::credentials::AuthenticationCredentials;
use crate::error::SessionError;

const EVENT_CAPACITY: usize = 64;

/// Notifications published to observers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Emitted once per connection, by whichever teardown call wins.
    ConnectionClosed {
        error: Option<SessionError>,
        at: SystemTime,
    },
    /// Snapshot taken right after the credentials were mutated.
    CredentialsUpdated(Box<AuthenticationCredentials>),
}

/// Fan-out point for [`SessionEvent`]s.
///
/// Publishing never blocks and never fails; with no subscribers the event is
/// dropped. Clones share the same subscriber set.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: SessionEvent) {
        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::trace!(delivered, "session event published");
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
