//! Three-message handshake: hello → response → finish.
//!
//! The coordinator drives one attempt over an opened [`Connection`]. It never
//! retries; on failure the caller discards the connection.

use std::sync::Arc;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::connection::Connection;
use crate::credentials::SharedCredentials;
use crate::crypto::{ChannelError, KeyPair, SecureChannel};
use crate::error::SessionError;
use crate::transport::DuplexTransport;

pub mod messages;
pub mod state;

pub use messages::{
    CborPayloadBuilder, ClientFinish, ClientHello, ClientPayload, ClientPayloadBuilder,
    HandshakeMessage, ServerHello,
};
pub use state::{HandshakeState, HandshakeStateError};

/// Client side of the handshake for a single connection attempt.
pub struct HandshakeCoordinator {
    state: HandshakeState,
    credentials: SharedCredentials,
    payloads: Arc<dyn ClientPayloadBuilder>,
    keep_alive_interval: Duration,
    /// Lives exactly as long as the attempt.
    ephemeral: Option<KeyPair>,
}

impl HandshakeCoordinator {
    pub fn new(
        credentials: SharedCredentials,
        payloads: Arc<dyn ClientPayloadBuilder>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            state: HandshakeState::Idle,
            credentials,
            payloads,
            keep_alive_interval: config.keep_alive_interval(),
            ephemeral: None,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Runs the handshake and, on success, starts the connection's watchdog.
    ///
    /// # Errors
    /// Every failure is reported as [`SessionError::HandshakeFailed`] and leaves
    /// the coordinator in [`HandshakeState::Failed`]. A coordinator that already
    /// ran is rejected without changing its state.
    pub async fn begin_handshake<C, T>(&mut self, conn: &Connection<C, T>) -> Result<(), SessionError>
    where
        C: SecureChannel,
        T: DuplexTransport,
    {
        if self.state != HandshakeState::Idle {
            return Err(SessionError::HandshakeFailed(format!(
                "handshake already attempted (state {:?})",
                self.state
            )));
        }
        match self.run(conn).await {
            Ok(()) => {
                tracing::info!(connection = %conn.id(), "handshake established");
                Ok(())
            }
            Err(err) => {
                let from = self.state;
                self.state = HandshakeState::Failed;
                self.ephemeral = None;
                let err = match err {
                    failed @ SessionError::HandshakeFailed(_) => failed,
                    other => SessionError::HandshakeFailed(other.to_string()),
                };
                tracing::warn!(connection = %conn.id(), ?from, %err, "handshake failed");
                Err(err)
            }
        }
    }

    async fn run<C, T>(&mut self, conn: &Connection<C, T>) -> Result<(), SessionError>
    where
        C: SecureChannel,
        T: DuplexTransport,
    {
        if conn.is_closed() || !conn.transport().is_open() {
            return Err(SessionError::HandshakeFailed("transport is not open".into()));
        }
        if conn.is_established() {
            return Err(SessionError::HandshakeFailed(
                "connection already established".into(),
            ));
        }

        // (1) hello with a fresh ephemeral key
        let ephemeral = conn
            .with_channel(|channel| channel.generate_ephemeral_key_pair())
            .await?;
        let hello = HandshakeMessage::ClientHello(ClientHello {
            ephemeral: ephemeral.public().to_vec(),
        })
        .to_bytes()?;
        let hello_frame = conn.with_channel(|channel| channel.encode_frame(&hello)).await?;
        self.ephemeral = Some(ephemeral);

        // (2) exactly one response, mixed into the channel with our static key.
        // `await_message` transmits the hello and then waits, so both states are
        // entered before the call and a failure may belong to either half.
        self.advance(HandshakeState::HelloSent)?;
        self.advance(HandshakeState::AwaitingResponse)?;
        tracing::debug!(connection = %conn.id(), "client hello handed to transport");
        let response = conn
            .transport()
            .await_message(hello_frame)
            .await
            .map_err(|e| {
                SessionError::HandshakeFailed(format!(
                    "client hello / server hello exchange: {}",
                    e
                ))
            })?;
        conn.mark_received();
        let server_hello = match conn
            .with_channel(|channel| channel.decode_frame(&response))
            .await
            .and_then(|bytes| {
                HandshakeMessage::from_bytes(&bytes)
                    .map_err(|e| ChannelError::InvalidResponse(e.to_string()))
            })? {
            HandshakeMessage::ServerHello(hello) => hello,
            other => {
                return Err(SessionError::HandshakeFailed(format!(
                    "expected server hello, got {}",
                    message_kind(&other)
                )))
            }
        };

        let noise_key = self.credentials.lock().noise_key.clone();
        let ephemeral = self
            .ephemeral
            .as_ref()
            .ok_or_else(|| SessionError::HandshakeFailed("ephemeral key missing".into()))?;
        let encrypted_static = conn
            .with_channel(|channel| channel.derive_from_response(ephemeral, &server_hello, &noise_key))
            .await?;
        self.advance(HandshakeState::Finishing)?;

        // (3) registration for a fresh identity, login for a linked one
        let payload = {
            let creds = self.credentials.lock();
            match &creds.me {
                None => self.payloads.registration_payload(&creds)?,
                Some(me) => self.payloads.login_payload(&me.id)?,
            }
        };

        // (4) finish message through the serialized send path
        let encrypted_payload = conn.with_channel(|channel| channel.encrypt(&payload)).await?;
        let finish = HandshakeMessage::ClientFinish(ClientFinish {
            static_key: encrypted_static,
            payload: encrypted_payload,
        })
        .to_bytes()?;
        conn.send_handshake_frame(&finish).await?;

        // (5) switch the channel to transport keys
        conn.with_channel(|channel| channel.finalize()).await?;
        if !conn.mark_established() {
            return Err(SessionError::HandshakeFailed(
                "connection closed during handshake".into(),
            ));
        }
        self.advance(HandshakeState::Established)?;
        self.ephemeral = None;
        conn.start_watchdog(self.keep_alive_interval);
        Ok(())
    }

    fn advance(&mut self, next: HandshakeState) -> Result<(), HandshakeStateError> {
        self.state = self.state.transition(next)?;
        Ok(())
    }
}

fn message_kind(message: &HandshakeMessage) -> &'static str {
    match message {
        HandshakeMessage::ClientHello(_) => "client hello",
        HandshakeMessage::ServerHello(_) => "server hello",
        HandshakeMessage::ClientFinish(_) => "client finish",
    }
}
