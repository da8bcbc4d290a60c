use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

use super::{DuplexTransport, TransportError};

type FramedTcp = Framed<TcpStream, LengthDelimitedCodec>;

/// Length-delimited frames over one TCP stream.
///
/// A zero-length unit is the liveness probe in both directions. The transport
/// is single-use: once closed it never reconnects.
pub struct TcpTransport {
    peer: SocketAddr,
    max_frame_len: usize,
    writer: Mutex<Option<SplitSink<FramedTcp, Bytes>>>,
    reader: Mutex<Option<SplitStream<FramedTcp>>>,
    open: AtomicBool,
    shutdown: CancellationToken,
}

impl TcpTransport {
    /// Unconnected transport; [`DuplexTransport::connect`] dials `peer`.
    pub fn new(peer: SocketAddr, max_frame_len: usize) -> Self {
        Self {
            peer,
            max_frame_len,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            open: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Wraps an already established stream (e.g. an accepted socket).
    pub fn from_stream(stream: TcpStream, max_frame_len: usize) -> Result<Self, TransportError> {
        let peer = stream.peer_addr()?;
        let transport = Self::new(peer, max_frame_len);
        let (sink, source) = framed(stream, max_frame_len).split();
        *transport.writer.try_lock().map_err(|_| TransportError::NotConnected)? = Some(sink);
        *transport.reader.try_lock().map_err(|_| TransportError::NotConnected)? = Some(source);
        transport.open.store(true, Ordering::SeqCst);
        Ok(transport)
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer", &self.peer)
            .field("open", &self.is_open())
            .finish()
    }
}

fn framed(stream: TcpStream, max_frame_len: usize) -> FramedTcp {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_len)
        .new_codec();
    Framed::new(stream, codec)
}

#[async_trait]
impl DuplexTransport for TcpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        if self.is_open() {
            return Ok(());
        }
        let stream = TcpStream::connect(self.peer).await?;
        stream.set_nodelay(true)?;
        let (sink, source) = framed(stream, self.max_frame_len).split();
        *self.writer.lock().await = Some(sink);
        *self.reader.lock().await = Some(source);
        self.open.store(true, Ordering::SeqCst);
        tracing::debug!(peer = %self.peer, "tcp transport connected");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.shutdown.is_cancelled()
    }

    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let mut guard = self.writer.lock().await;
        let outcome = {
            let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
            tokio::select! {
                _ = self.shutdown.cancelled() => None,
                res = sink.send(Bytes::from(bytes)) => Some(res),
            }
        };
        match outcome {
            Some(res) => res.map_err(TransportError::from),
            None => {
                guard.take();
                Err(TransportError::Closed)
            }
        }
    }

    async fn send_ping(&self) -> Result<(), TransportError> {
        self.send(Vec::new()).await
    }

    async fn await_message(&self, initial: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        self.send(initial).await?;
        self.recv().await
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let mut guard = self.reader.lock().await;
        let outcome = {
            let source = guard.as_mut().ok_or(TransportError::NotConnected)?;
            tokio::select! {
                _ = self.shutdown.cancelled() => None,
                next = source.next() => Some(next),
            }
        };
        match outcome {
            Some(Some(Ok(frame))) => Ok(frame.to_vec()),
            Some(Some(Err(err))) => Err(TransportError::from(err)),
            Some(None) => {
                self.open.store(false, Ordering::SeqCst);
                Err(TransportError::Closed)
            }
            None => {
                guard.take();
                Err(TransportError::Closed)
            }
        }
    }

    fn close(&self) {
        if !self.open.swap(false, Ordering::SeqCst) && self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        // Halves held by an in-flight operation are dropped by that operation.
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        tracing::debug!(peer = %self.peer, "tcp transport closed");
    }
}
