//! Handshake messages and the client payload carried in the finish message.
//!
//! All messages are CBOR encoded.

use serde::{Deserialize, Serialize};

use crate::credentials::AuthenticationCredentials;
use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHello {
    pub ephemeral: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHello {
    pub ephemeral: Vec<u8>,
    /// Server static key, encrypted by the server's side of the handshake.
    pub static_key: Vec<u8>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFinish {
    /// Encrypted client static key.
    pub static_key: Vec<u8>,
    /// Encrypted client payload.
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeMessage {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    ClientFinish(ClientFinish),
}

impl HandshakeMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SessionError> {
        serde_cbor::to_vec(self)
            .map_err(|e| SessionError::HandshakeFailed(format!("encode: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SessionError> {
        serde_cbor::from_slice(bytes)
            .map_err(|e| SessionError::HandshakeFailed(format!("decode: {}", e)))
    }
}

/// Producer of the opaque payload sealed into the finish message.
pub trait ClientPayloadBuilder: Send + Sync {
    /// Payload for an identity with no linked account yet.
    fn registration_payload(
        &self,
        credentials: &AuthenticationCredentials,
    ) -> Result<Vec<u8>, SessionError>;

    /// Payload resuming the linked account `account_id`.
    fn login_payload(&self, account_id: &str) -> Result<Vec<u8>, SessionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgent {
    pub platform: String,
    pub version: String,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            platform: "rust".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    pub registration_id: u16,
    pub identity_key: Vec<u8>,
    pub signed_pre_key_id: u32,
    pub signed_pre_key: Vec<u8>,
    pub signed_pre_key_signature: Vec<u8>,
    pub user_agent: UserAgent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginPayload {
    pub account_id: String,
    pub passive: bool,
    pub user_agent: UserAgent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientPayload {
    Registration(RegistrationPayload),
    Login(LoginPayload),
}

impl ClientPayload {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SessionError> {
        serde_cbor::from_slice(bytes)
            .map_err(|e| SessionError::HandshakeFailed(format!("payload decode: {}", e)))
    }
}

/// Default [`ClientPayloadBuilder`]: CBOR-encoded [`ClientPayload`].
#[derive(Debug, Clone, Default)]
pub struct CborPayloadBuilder {
    pub user_agent: UserAgent,
}

impl CborPayloadBuilder {
    fn encode(payload: &ClientPayload) -> Result<Vec<u8>, SessionError> {
        serde_cbor::to_vec(payload)
            .map_err(|e| SessionError::HandshakeFailed(format!("payload encode: {}", e)))
    }
}

impl ClientPayloadBuilder for CborPayloadBuilder {
    fn registration_payload(
        &self,
        credentials: &AuthenticationCredentials,
    ) -> Result<Vec<u8>, SessionError> {
        let signed = &credentials.signed_pre_key;
        Self::encode(&ClientPayload::Registration(RegistrationPayload {
            registration_id: credentials.registration_id,
            identity_key: credentials.signed_identity_key.public().to_vec(),
            signed_pre_key_id: signed.key_id,
            signed_pre_key: signed.key_pair.public().to_vec(),
            signed_pre_key_signature: signed.signature.clone(),
            user_agent: self.user_agent.clone(),
        }))
    }

    fn login_payload(&self, account_id: &str) -> Result<Vec<u8>, SessionError> {
        Self::encode(&ClientPayload::Login(LoginPayload {
            account_id: account_id.to_string(),
            passive: false,
            user_agent: self.user_agent.clone(),
        }))
    }
}
