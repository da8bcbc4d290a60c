//! In-memory doubles shared by unit and integration tests.
//!
//! [`TransparentChannel`] keeps frames readable so tests can assert on frame
//! counters; [`MemoryTransport`] records every outbound unit and lets the test
//! script the server side.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::crypto::{ChannelError, KeyPair, SecureChannel};
use crate::error::SessionError;
use crate::handshake::{ClientFinish, HandshakeMessage, ServerHello};
use crate::sdk::TetherClient;
use crate::transport::{DuplexTransport, TimeoutTransport, TransportError};

const HANDSHAKE_TAG: u8 = 0x00;
const TRANSPORT_TAG: u8 = 0x01;
const COUNTER_LEN: usize = 8;

/// Channel that frames but does not encrypt.
///
/// Handshake frames are `0x00 || payload`; transport frames are
/// `0x01 || counter (u64 BE) || payload`.
#[derive(Debug, Default)]
pub struct TransparentChannel {
    derived: bool,
    finalized: bool,
    send_counter: u64,
    recv_counter: u64,
}

impl TransparentChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_sent(&self) -> u64 {
        self.send_counter
    }
}

impl SecureChannel for TransparentChannel {
    fn derive_from_response(
        &mut self,
        _ephemeral: &KeyPair,
        response: &ServerHello,
        local_static: &KeyPair,
    ) -> Result<Vec<u8>, ChannelError> {
        if response.ephemeral.len() != 32 {
            return Err(ChannelError::InvalidResponse(format!(
                "server ephemeral is {} bytes",
                response.ephemeral.len()
            )));
        }
        if response.static_key.is_empty() {
            return Err(ChannelError::InvalidResponse("missing server static key".into()));
        }
        self.derived = true;
        Ok(local_static.public().to_vec())
    }

    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        if !self.derived {
            return Err(ChannelError::NotReady("no handshake key"));
        }
        Ok(plaintext.to_vec())
    }

    fn encode_frame(&mut self, payload: &[u8]) -> Result<Vec<u8>, ChannelError> {
        if !self.finalized {
            let mut frame = Vec::with_capacity(payload.len() + 1);
            frame.push(HANDSHAKE_TAG);
            frame.extend_from_slice(payload);
            return Ok(frame);
        }
        let frame = transport_frame(self.send_counter, payload);
        self.send_counter += 1;
        Ok(frame)
    }

    fn decode_frame(&mut self, frame: &[u8]) -> Result<Vec<u8>, ChannelError> {
        match frame.split_first() {
            Some((&HANDSHAKE_TAG, rest)) if !self.finalized => Ok(rest.to_vec()),
            Some((&TRANSPORT_TAG, _)) if self.finalized => {
                let counter = frame_counter(frame)
                    .ok_or_else(|| ChannelError::Frame("truncated transport frame".into()))?;
                if counter != self.recv_counter {
                    return Err(ChannelError::Frame(format!(
                        "expected counter {}, got {}",
                        self.recv_counter, counter
                    )));
                }
                self.recv_counter += 1;
                Ok(frame[1 + COUNTER_LEN..].to_vec())
            }
            Some((tag, _)) => Err(ChannelError::Frame(format!("unexpected frame tag {:#04x}", tag))),
            None => Err(ChannelError::Frame("empty frame".into())),
        }
    }

    fn finalize(&mut self) -> Result<(), ChannelError> {
        if !self.derived {
            return Err(ChannelError::NotReady("handshake not derived"));
        }
        self.finalized = true;
        Ok(())
    }

    fn is_finalized(&self) -> bool {
        self.finalized
    }
}

/// Builds a transport frame as [`TransparentChannel`] would after finalize.
pub fn transport_frame(counter: u64, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + COUNTER_LEN + payload.len());
    frame.push(TRANSPORT_TAG);
    frame.extend_from_slice(&counter.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Counter of a transport frame, `None` for anything else.
pub fn frame_counter(frame: &[u8]) -> Option<u64> {
    if frame.first() != Some(&TRANSPORT_TAG) || frame.len() < 1 + COUNTER_LEN {
        return None;
    }
    let mut counter = [0u8; COUNTER_LEN];
    counter.copy_from_slice(&frame[1..1 + COUNTER_LEN]);
    Some(u64::from_be_bytes(counter))
}

/// A well-formed server hello, framed for the handshake phase.
pub fn server_hello_frame() -> Result<Vec<u8>, SessionError> {
    let server_ephemeral = KeyPair::generate(&mut OsRng)?;
    let server_static = KeyPair::generate(&mut OsRng)?;
    handshake_frame(&HandshakeMessage::ServerHello(ServerHello {
        ephemeral: server_ephemeral.public().to_vec(),
        static_key: server_static.public().to_vec(),
        payload: Vec::new(),
    }))
}

pub fn handshake_frame(message: &HandshakeMessage) -> Result<Vec<u8>, SessionError> {
    let mut frame = vec![HANDSHAKE_TAG];
    frame.extend_from_slice(&message.to_bytes()?);
    Ok(frame)
}

/// Parses the client finish out of a recorded handshake frame.
pub fn decode_client_finish(frame: &[u8]) -> Result<ClientFinish, SessionError> {
    let body = match frame.split_first() {
        Some((&HANDSHAKE_TAG, rest)) => rest,
        _ => return Err(SessionError::HandshakeFailed("not a handshake frame".into())),
    };
    match HandshakeMessage::from_bytes(body)? {
        HandshakeMessage::ClientFinish(finish) => Ok(finish),
        _ => Err(SessionError::HandshakeFailed("not a client finish".into())),
    }
}

struct MemoryShared {
    open: AtomicBool,
    refuse_connect: AtomicBool,
    fail_sends: AtomicBool,
    sent: Mutex<Vec<Vec<u8>>>,
    pings: AtomicUsize,
    closes: AtomicUsize,
    response: Mutex<Option<Vec<u8>>>,
    inbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    shutdown: CancellationToken,
}

/// Scriptable in-memory transport. Clones share the same state, so a test can
/// keep one handle while the connection owns another.
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<MemoryShared>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(MemoryShared {
                open: AtomicBool::new(false),
                refuse_connect: AtomicBool::new(false),
                fail_sends: AtomicBool::new(false),
                sent: Mutex::new(Vec::new()),
                pings: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                response: Mutex::new(None),
                inbound_tx,
                inbound_rx: tokio::sync::Mutex::new(inbound_rx),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Transport whose server answers the hello with a valid server hello.
    pub fn with_server_hello() -> Result<Self, SessionError> {
        let transport = Self::new();
        transport.respond_with(server_hello_frame()?);
        Ok(transport)
    }

    /// Reply returned by the next `await_message`. Without one, the wait only
    /// ends when the transport closes.
    pub fn respond_with(&self, frame: Vec<u8>) {
        *self.shared.response.lock() = Some(frame);
    }

    pub fn refuse_connect(&self) {
        self.shared.refuse_connect.store(true, Ordering::SeqCst);
    }

    /// Every later `send` fails with an I/O error while the transport stays open.
    pub fn fail_sends(&self) {
        self.shared.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Queues an inbound unit for `recv`; an empty unit is a pong.
    pub fn push_inbound(&self, unit: Vec<u8>) {
        let _ = self.shared.inbound_tx.send(unit);
    }

    /// Every non-ping unit written, in transmission order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.shared.sent.lock().clone()
    }

    pub fn ping_count(&self) -> usize {
        self.shared.pings.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("open", &self.is_open())
            .field("sent", &self.shared.sent.lock().len())
            .finish()
    }
}

#[async_trait]
impl DuplexTransport for MemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        if self.shared.refuse_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Io("connection refused".into()));
        }
        self.shared.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst) && !self.shared.shutdown.is_cancelled()
    }

    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        if self.shared.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Io("broken pipe".into()));
        }
        // Let other senders run between the check and the write.
        tokio::task::yield_now().await;
        let mut sent = self.shared.sent.lock();
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        sent.push(bytes);
        Ok(())
    }

    async fn send_ping(&self) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.shared.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn await_message(&self, initial: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        self.send(initial).await?;
        let scripted = self.shared.response.lock().take();
        match scripted {
            Some(frame) => Ok(frame),
            None => {
                self.shared.shutdown.cancelled().await;
                Err(TransportError::Closed)
            }
        }
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let mut inbound = self.shared.inbound_rx.lock().await;
        tokio::select! {
            _ = self.shared.shutdown.cancelled() => Err(TransportError::Closed),
            unit = inbound.recv() => unit.ok_or(TransportError::Closed),
        }
    }

    fn close(&self) {
        // Holding the log lock makes close atomic with respect to `send`.
        let _sent = self.shared.sent.lock();
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        self.shared.open.store(false, Ordering::SeqCst);
        self.shared.shutdown.cancel();
    }
}

pub type MemoryConnection = Connection<TransparentChannel, TimeoutTransport<MemoryTransport>>;

/// Runs a full client handshake against a scripted in-memory server.
///
/// Returns the established connection and a handle onto its transport.
pub async fn establish(
    client: &TetherClient,
) -> Result<(MemoryConnection, MemoryTransport), SessionError> {
    let transport = MemoryTransport::with_server_hello()?;
    let connection = client
        .connect(TransparentChannel::new(), transport.clone())
        .await?;
    Ok((connection, transport))
}
