use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Mutable per-connection record guarded by the connection's state lock.
///
/// `closed` only ever goes from false to true. `begin_close` hands out the
/// watchdog handle exactly once, which is what makes teardown idempotent.
#[derive(Debug, Default)]
pub struct ConnectionState {
    closed: bool,
    established: bool,
    last_received_at: Option<Instant>,
    watchdog: Option<JoinHandle<()>>,
}

/// Resources released by the winning teardown call.
#[derive(Debug)]
pub struct Closing {
    pub watchdog: Option<JoinHandle<()>>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_established(&self) -> bool {
        self.established && !self.closed
    }

    /// Returns false if the connection closed before the handshake finished.
    pub fn mark_established(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.established = true;
        true
    }

    pub fn mark_received(&mut self, now: Instant) {
        self.last_received_at = Some(now);
    }

    pub fn last_received_at(&self) -> Option<Instant> {
        self.last_received_at
    }

    /// Time since the last inbound unit. The first query on a connection
    /// that never received anything starts the clock instead.
    pub fn silence(&mut self, now: Instant) -> Duration {
        let last = *self.last_received_at.get_or_insert(now);
        now.saturating_duration_since(last)
    }

    /// Stores the watchdog handle; gives it back if the connection is closed
    /// or a watchdog is already installed.
    pub fn install_watchdog(&mut self, handle: JoinHandle<()>) -> Result<(), JoinHandle<()>> {
        if self.closed || self.watchdog_running() {
            return Err(handle);
        }
        self.watchdog = Some(handle);
        Ok(())
    }

    pub fn watchdog_running(&self) -> bool {
        self.watchdog
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// First call flips `closed` and returns what must be released; every
    /// later call returns `None`.
    pub fn begin_close(&mut self) -> Option<Closing> {
        if self.closed {
            return None;
        }
        self.closed = true;
        self.established = false;
        Some(Closing {
            watchdog: self.watchdog.take(),
        })
    }
}
