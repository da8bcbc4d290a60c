use std::time::Duration;

use async_trait::async_trait;
use tokio::time;

use super::{DuplexTransport, TransportError};

/// Wrapper that bounds the request/response wait of `await_message`.
///
/// Plain `recv` stays unbounded: an idle established connection is the
/// watchdog's concern, not the transport's.
#[derive(Debug)]
pub struct TimeoutTransport<T> {
    inner: T,
    response_timeout: Duration,
}

impl<T> TimeoutTransport<T> {
    pub fn new(inner: T, response_timeout: Duration) -> Self {
        Self {
            inner,
            response_timeout,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T> DuplexTransport for TimeoutTransport<T>
where
    T: DuplexTransport,
{
    async fn connect(&self) -> Result<(), TransportError> {
        self.inner.connect().await
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.inner.send(bytes).await
    }

    async fn send_ping(&self) -> Result<(), TransportError> {
        self.inner.send_ping().await
    }

    async fn await_message(&self, initial: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        match time::timeout(self.response_timeout, self.inner.await_message(initial)).await {
            Ok(res) => res,
            Err(_) => Err(TransportError::Timeout(
                self.response_timeout.as_millis() as u64,
            )),
        }
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        self.inner.recv().await
    }

    fn close(&self) {
        self.inner.close()
    }
}
