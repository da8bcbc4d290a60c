//! Post-handshake connection lifecycle.
//!
//! A [`Connection`] owns the encrypted send path, the liveness watchdog and the
//! one-shot teardown. Handles are cheap clones of one shared connection.
//!
//! # Guarantees
//! * No frame leaves through [`Connection::send_encrypted`] before the handshake
//!   marked the connection established.
//! * Encode and transmit run as one unit under a FIFO lock around the channel,
//!   so frame counters hit the wire in strictly increasing order.
//! * The closed flag is checked under the state lock before every send, and
//!   again inside the send critical section; teardown never waits for the
//!   send lock.
//! * Exactly one `ConnectionClosed` event is emitted per connection.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::crypto::SecureChannel;
use crate::error::SessionError;
use crate::events::{EventEmitter, SessionEvent};
use crate::transport::{DuplexTransport, TransportError};

pub mod state;
mod watchdog;

pub use state::{Closing, ConnectionState};

struct Inner<C, T> {
    id: Uuid,
    channel: tokio::sync::Mutex<C>,
    transport: Arc<T>,
    state: Mutex<ConnectionState>,
    events: EventEmitter,
}

/// Shared handle to one connection.
pub struct Connection<C, T> {
    inner: Arc<Inner<C, T>>,
}

impl<C, T> Clone for Connection<C, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, T> std::fmt::Debug for Connection<C, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("established", &state.is_established())
            .field("closed", &state.is_closed())
            .finish()
    }
}

impl<C, T> Connection<C, T>
where
    C: SecureChannel,
    T: DuplexTransport,
{
    /// Wraps an opened transport; the connection starts unestablished.
    pub fn new(channel: C, transport: Arc<T>, events: EventEmitter) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                channel: tokio::sync::Mutex::new(channel),
                transport,
                state: Mutex::new(ConnectionState::new()),
                events,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.inner.transport
    }

    pub fn events(&self) -> &EventEmitter {
        &self.inner.events
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().is_closed()
    }

    pub fn is_established(&self) -> bool {
        self.inner.state.lock().is_established()
    }

    pub fn watchdog_running(&self) -> bool {
        self.inner.state.lock().watchdog_running()
    }

    pub fn last_received_at(&self) -> Option<Instant> {
        self.inner.state.lock().last_received_at()
    }

    /// Records inbound traffic of any kind, including liveness replies.
    pub fn mark_received(&self) {
        self.inner.state.lock().mark_received(Instant::now());
    }

    /// Encrypts `payload` as the next frame and transmits it.
    ///
    /// # Errors
    /// [`SessionError::ConnectionClosed`] if the connection is not established,
    /// was torn down, or is torn down while this frame is in flight.
    pub async fn send_encrypted(&self, payload: &[u8]) -> Result<(), SessionError> {
        self.ensure_sendable(true)?;
        self.transmit(payload, true).await
    }

    /// Reads the next application frame, skipping liveness replies.
    ///
    /// A frame the channel cannot decode breaks the counter sequence for good,
    /// so it tears the connection down with that error.
    pub async fn recv_decrypted(&self) -> Result<Vec<u8>, SessionError> {
        loop {
            if self.is_closed() {
                return Err(SessionError::ConnectionClosed);
            }
            let unit = self
                .inner
                .transport
                .recv()
                .await
                .map_err(|err| self.map_transport_error(err))?;
            self.mark_received();
            if unit.is_empty() {
                continue;
            }
            self.ensure_sendable(true)?;
            let decoded = self.inner.channel.lock().await.decode_frame(&unit);
            return decoded.map_err(|err| {
                let err = SessionError::Transport(err.to_string());
                self.teardown(Some(err.clone()));
                err
            });
        }
    }

    /// Starts the liveness watchdog with period `interval`.
    ///
    /// Returns false when the connection is closed or a watchdog already runs.
    pub fn start_watchdog(&self, interval: Duration) -> bool {
        let handle = watchdog::spawn(Arc::downgrade(&self.inner), interval);
        match self.inner.state.lock().install_watchdog(handle) {
            Ok(()) => {
                tracing::debug!(connection = %self.inner.id, ?interval, "watchdog started");
                true
            }
            Err(handle) => {
                handle.abort();
                false
            }
        }
    }

    /// Closes the connection once.
    ///
    /// The first call cancels the watchdog, closes the transport and emits a
    /// single `ConnectionClosed` event carrying `error`; it returns true. Every
    /// later call is a no-op returning false.
    pub fn teardown(&self, error: Option<SessionError>) -> bool {
        let Some(closing) = self.inner.state.lock().begin_close() else {
            return false;
        };
        if let Some(watchdog) = closing.watchdog {
            watchdog.abort();
        }
        self.inner.transport.close();
        match &error {
            Some(err) => tracing::info!(connection = %self.inner.id, %err, "connection closed"),
            None => tracing::info!(connection = %self.inner.id, "connection closed"),
        }
        self.inner.events.emit(SessionEvent::ConnectionClosed {
            error,
            at: SystemTime::now(),
        });
        true
    }

    pub(crate) fn mark_established(&self) -> bool {
        self.inner.state.lock().mark_established()
    }

    /// Runs `f` with exclusive access to the channel.
    pub(crate) async fn with_channel<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut C) -> R,
    {
        let mut channel = self.inner.channel.lock().await;
        f(&mut channel)
    }

    /// Transmits a handshake frame; allowed before the connection is established.
    pub(crate) async fn send_handshake_frame(&self, payload: &[u8]) -> Result<(), SessionError> {
        self.ensure_sendable(false)?;
        self.transmit(payload, false).await
    }

    fn ensure_sendable(&self, require_established: bool) -> Result<(), SessionError> {
        let state = self.inner.state.lock();
        if state.is_closed() || (require_established && !state.is_established()) {
            return Err(SessionError::ConnectionClosed);
        }
        Ok(())
    }

    async fn transmit(&self, payload: &[u8], require_established: bool) -> Result<(), SessionError> {
        let mut channel = self.inner.channel.lock().await;
        // Teardown may have won while this call queued for the lock.
        self.ensure_sendable(require_established)?;
        if !self.inner.transport.is_open() {
            return Err(SessionError::ConnectionClosed);
        }
        let frame = channel
            .encode_frame(payload)
            .map_err(|err| SessionError::Transport(err.to_string()))?;
        self.inner
            .transport
            .send(frame)
            .await
            .map_err(|err| self.map_transport_error(err))
    }

    fn map_transport_error(&self, err: TransportError) -> SessionError {
        if self.is_closed() {
            SessionError::ConnectionClosed
        } else {
            SessionError::from(err)
        }
    }

    /// One watchdog period. Returns false once the watchdog should stop.
    async fn watchdog_tick(&self, threshold: Duration) -> bool {
        let silence = {
            let mut state = self.inner.state.lock();
            if state.is_closed() {
                return false;
            }
            state.silence(Instant::now())
        };
        if silence > threshold {
            tracing::warn!(
                connection = %self.inner.id,
                silence_ms = silence.as_millis() as u64,
                "no inbound traffic within liveness window"
            );
            self.teardown(Some(SessionError::ConnectionLost));
            return false;
        }
        if self.inner.transport.is_open() {
            if let Err(err) = self.inner.transport.send_ping().await {
                tracing::debug!(connection = %self.inner.id, %err, "liveness probe failed");
            }
        }
        true
    }
}
