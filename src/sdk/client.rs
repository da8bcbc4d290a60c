use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::SessionConfig;
use crate::connection::Connection;
use crate::credentials::{init_credentials, SharedCredentials};
use crate::crypto::SecureChannel;
use crate::error::SessionError;
use crate::events::{EventEmitter, SessionEvent};
use crate::handshake::{CborPayloadBuilder, ClientPayloadBuilder, HandshakeCoordinator};
use crate::pairing::{issue_pairing_code, PairingSession};
use crate::transport::{DuplexTransport, TimeoutTransport};

/// High-level client that owns one identity and opens connections for it.
///
/// # Guarantees
/// * Every connection attempt gets a fresh ephemeral key and a fresh watchdog.
/// * The handshake response wait is bounded by `connect_timeout_ms`.
/// * A failed handshake tears its connection down before the error returns, so
///   observers see the failure as the close reason.
/// * Pairing and handshakes share one credential record and one event sink.
pub struct TetherClient {
    config: SessionConfig,
    credentials: SharedCredentials,
    events: EventEmitter,
    payloads: Arc<dyn ClientPayloadBuilder>,
}

impl TetherClient {
    /// Builds a client around existing credentials.
    ///
    /// # Errors
    /// Returns [`SessionError::Config`] when `config` fails validation.
    pub fn new(config: SessionConfig, credentials: SharedCredentials) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            config,
            credentials,
            events: EventEmitter::new(),
            payloads: Arc::new(CborPayloadBuilder::default()),
        })
    }

    /// Builds a client for a brand-new identity.
    ///
    /// # Errors
    /// [`SessionError::EntropyFailure`] if key material cannot be generated.
    pub fn bootstrap(config: SessionConfig) -> Result<Self, SessionError> {
        let credentials = init_credentials()?.into_shared();
        Self::new(config, credentials)
    }

    /// Replaces the producer of registration/login payloads.
    pub fn with_payload_builder(mut self, payloads: Arc<dyn ClientPayloadBuilder>) -> Self {
        self.payloads = payloads;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn credentials(&self) -> &SharedCredentials {
        &self.credentials
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Opens `transport`, runs the handshake over `channel` and returns the
    /// established connection.
    ///
    /// # Errors
    /// Transport failures while opening surface as [`SessionError::Transport`];
    /// everything after that as [`SessionError::HandshakeFailed`].
    pub async fn connect<C, T>(
        &self,
        channel: C,
        transport: T,
    ) -> Result<Connection<C, TimeoutTransport<T>>, SessionError>
    where
        C: SecureChannel,
        T: DuplexTransport,
    {
        let transport = Arc::new(TimeoutTransport::new(transport, self.config.connect_timeout()));
        transport.connect().await?;

        let connection = Connection::new(channel, transport, self.events.clone());
        let mut coordinator =
            HandshakeCoordinator::new(self.credentials.clone(), self.payloads.clone(), &self.config);
        if let Err(err) = coordinator.begin_handshake(&connection).await {
            connection.teardown(Some(err.clone()));
            return Err(err);
        }
        Ok(connection)
    }

    /// Issues a pairing code for linking this identity to `phone`.
    ///
    /// # Errors
    /// [`SessionError::AlreadyRegistered`] once the identity is linked.
    pub fn request_pairing_code(
        &self,
        phone: &str,
        custom_code: Option<&str>,
    ) -> Result<PairingSession, SessionError> {
        issue_pairing_code(
            &self.credentials,
            &self.events,
            &self.config.pairing_brand,
            phone,
            custom_code,
        )
    }
}
