//! Session tunables.
//!
//! Durations are stored in milliseconds so the record maps one-to-one onto the
//! JSON accepted by [`SessionConfig::from_json`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Extra silence tolerated on top of the keep-alive interval before the
/// watchdog declares the connection lost.
pub const LIVENESS_GRACE: Duration = Duration::from_millis(5_000);

/// Default brand tag embedded in pairing session ids.
pub const DEFAULT_PAIRING_BRAND: &str = "TETHER";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Watchdog period; also the cadence of liveness probes.
    pub keep_alive_interval_ms: u64,
    /// Upper bound on the wait for the server's handshake response.
    pub connect_timeout_ms: u64,
    pub pairing_brand: String,
    /// Largest single frame accepted by the TCP transport.
    pub max_frame_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval_ms: 30_000,
            connect_timeout_ms: 20_000,
            pairing_brand: DEFAULT_PAIRING_BRAND.to_string(),
            max_frame_len: 4 * 1024 * 1024,
        }
    }
}

impl SessionConfig {
    /// Parses a JSON document; absent fields keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, SessionError> {
        let config: SessionConfig =
            serde_json::from_str(raw).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.keep_alive_interval_ms == 0 {
            return Err(SessionError::Config(
                "keep_alive_interval_ms must be non-zero".into(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(SessionError::Config(
                "connect_timeout_ms must be non-zero".into(),
            ));
        }
        if self.pairing_brand.is_empty() || self.pairing_brand.contains(|c: char| c == '~' || c == '#') {
            return Err(SessionError::Config(
                "pairing_brand must be non-empty and free of '~' and '#'".into(),
            ));
        }
        Ok(())
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Longest tolerated silence before the connection counts as lost.
    pub fn liveness_threshold(&self) -> Duration {
        self.keep_alive_interval() + LIVENESS_GRACE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_timings() {
        let config = SessionConfig::default();
        assert_eq!(config.keep_alive_interval(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(20));
        assert_eq!(config.liveness_threshold(), Duration::from_secs(35));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SessionConfig::from_json(r#"{"keep_alive_interval_ms": 1000}"#).unwrap();
        assert_eq!(config.keep_alive_interval_ms, 1000);
        assert_eq!(config.pairing_brand, DEFAULT_PAIRING_BRAND);
        assert_eq!(config.liveness_threshold(), Duration::from_millis(6000));
    }

    #[test]
    fn rejects_zero_interval_and_bad_brand() {
        assert!(matches!(
            SessionConfig::from_json(r#"{"keep_alive_interval_ms": 0}"#),
            Err(SessionError::Config(_))
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{"pairing_brand": "A~B"}"#),
            Err(SessionError::Config(_))
        ));
    }
}
