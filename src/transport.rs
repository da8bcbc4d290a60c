//! Duplex byte transport consumed by the handshake and the connection.
//!
//! Implementations use interior mutability: the watchdog, the send path and
//! teardown all hold the same `Arc` and may call in concurrently.

use async_trait::async_trait;
use thiserror::Error;

pub mod tcp;
pub mod timeout;

pub use tcp::TcpTransport;
pub use timeout::TimeoutTransport;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("transport not connected")]
    NotConnected,
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("io: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Opaque duplex byte channel.
///
/// An empty unit returned by [`recv`](DuplexTransport::recv) is a liveness
/// reply (pong) and carries no frame.
#[async_trait]
pub trait DuplexTransport: Send + Sync + 'static {
    async fn connect(&self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Liveness probe; no reply is awaited.
    async fn send_ping(&self) -> Result<(), TransportError>;

    /// Sends `initial` and resolves with the next inbound unit.
    async fn await_message(&self, initial: Vec<u8>) -> Result<Vec<u8>, TransportError>;

    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Idempotent; pending and later operations fail with
    /// [`TransportError::Closed`].
    fn close(&self);
}
