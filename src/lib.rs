//! Client session layer for persistent encrypted links.
//!
//! Covers credential bootstrap, the three-message handshake (hello, response,
//! finish), the post-handshake connection lifecycle with its liveness watchdog,
//! and pairing-code issuance for linking a fresh identity to an account.
//! Handshake messages are CBOR encoded; frame encryption is delegated to a
//! [`SecureChannel`] implementation.

pub mod config;
pub mod connection;
pub mod credentials;
pub mod crypto;
pub mod e2e_common;
pub mod error;
pub mod events;
pub mod handshake;
pub mod pairing;
pub mod sdk;
pub mod transport;

pub use config::SessionConfig;
pub use connection::Connection;
pub use credentials::{
    init_credentials, init_credentials_with, AuthenticationCredentials, Contact, SharedCredentials,
};
pub use crypto::{ChannelError, IdentityKeyPair, KeyPair, SecureChannel, SignedKeyPair};
pub use error::SessionError;
pub use events::{EventEmitter, SessionEvent};
pub use handshake::{HandshakeCoordinator, HandshakeState};
pub use pairing::{issue_pairing_code, PairingSession};
pub use sdk::TetherClient;
pub use transport::{DuplexTransport, TcpTransport, TimeoutTransport, TransportError};
