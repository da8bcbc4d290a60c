use rand::rngs::OsRng;
use thiserror::Error;

use super::KeyPair;
use crate::handshake::messages::ServerHello;

/// Failures reported by a [`SecureChannel`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("invalid handshake response: {0}")]
    InvalidResponse(String),
    #[error("channel rejected the handshake: {0}")]
    Rejected(String),
    #[error("channel not ready: {0}")]
    NotReady(&'static str),
    #[error("frame error: {0}")]
    Frame(String),
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
}

/// Symmetric handshake state and frame codec for one connection attempt.
///
/// The implementation owns a per-direction frame counter that advances on every
/// `encode_frame` after [`finalize`](SecureChannel::finalize); callers must never
/// interleave two encode+transmit pairs.
pub trait SecureChannel: Send + 'static {
    /// Fresh X25519 pair for the hello message.
    fn generate_ephemeral_key_pair(&mut self) -> Result<KeyPair, ChannelError> {
        KeyPair::generate(&mut OsRng).map_err(|e| ChannelError::KeyGeneration(e.to_string()))
    }

    /// Mixes the server hello into the handshake state and returns the local
    /// static public key encrypted under the derived key.
    fn derive_from_response(
        &mut self,
        ephemeral: &KeyPair,
        response: &ServerHello,
        local_static: &KeyPair,
    ) -> Result<Vec<u8>, ChannelError>;

    /// Encrypts a handshake payload under the current handshake key.
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError>;

    /// Wraps bytes for the wire: plaintext framing before `finalize`,
    /// counter-bound encryption after.
    fn encode_frame(&mut self, payload: &[u8]) -> Result<Vec<u8>, ChannelError>;

    /// Inverse of the remote side's `encode_frame`.
    fn decode_frame(&mut self, frame: &[u8]) -> Result<Vec<u8>, ChannelError>;

    /// Splits the handshake state into transport keys.
    fn finalize(&mut self) -> Result<(), ChannelError>;

    fn is_finalized(&self) -> bool;
}
