use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::{Connection, Inner};
use crate::config::LIVENESS_GRACE;
use crate::crypto::SecureChannel;
use crate::transport::DuplexTransport;

/// Spawns the periodic liveness check.
///
/// The task holds only a weak reference, so dropping every connection handle
/// ends it even without a teardown. First tick fires one `interval` after start.
pub(super) fn spawn<C, T>(inner: Weak<Inner<C, T>>, interval: Duration) -> JoinHandle<()>
where
    C: SecureChannel,
    T: DuplexTransport,
{
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let threshold = interval + LIVENESS_GRACE;
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let connection = Connection { inner };
            if !connection.watchdog_tick(threshold).await {
                break;
            }
        }
    })
}
