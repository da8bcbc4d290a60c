use thiserror::Error;

use crate::crypto::ChannelError;
use crate::handshake::state::HandshakeStateError;
use crate::transport::TransportError;

/// Errors surfaced across the caller boundary.
///
/// Handshake and channel failures are fatal to the connection they occurred on.
/// Liveness failures are not returned from any call; they arrive as the reason
/// carried by the single `ConnectionClosed` event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// Malformed, missing or rejected handshake response.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    /// Send attempted on a closed or not-yet-established connection.
    #[error("connection closed")]
    ConnectionClosed,
    /// Watchdog saw no inbound traffic within the liveness window.
    #[error("connection lost")]
    ConnectionLost,
    /// The entropy source refused to produce key material.
    #[error("entropy source failure: {0}")]
    EntropyFailure(String),
    /// Pairing was requested for an identity that is already linked.
    #[error("identity is already registered")]
    AlreadyRegistered,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SessionError {
    /// True for errors after which the connection can never carry traffic again.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            SessionError::HandshakeFailed(_)
                | SessionError::ConnectionClosed
                | SessionError::ConnectionLost
        )
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => SessionError::ConnectionClosed,
            other => SessionError::Transport(other.to_string()),
        }
    }
}

impl From<ChannelError> for SessionError {
    fn from(err: ChannelError) -> Self {
        SessionError::HandshakeFailed(err.to_string())
    }
}

impl From<HandshakeStateError> for SessionError {
    fn from(err: HandshakeStateError) -> Self {
        SessionError::HandshakeFailed(err.to_string())
    }
}
