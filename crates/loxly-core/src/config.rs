// ── Client configuration ──
//
// Everything a `Client` needs to reach and authenticate with one
// Miniserver. Built by the caller (usually from a `loxly-config` profile).

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// Connection settings for one Miniserver.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host or `host:port` of the Miniserver.
    pub host: String,
    pub username: String,
    pub password: SecretString,
    /// Per-reply timeout during the handshake.
    pub handshake_timeout: Duration,
    /// Upper bound on one idle wait in the receive loop. Termination
    /// conditions are checked at least this often.
    pub poll_interval: Duration,
    /// How long to wait for the payload that follows a binary header.
    pub payload_timeout: Duration,
    /// Capacity of the event channel. Lagging consumers lose the oldest events.
    pub event_capacity: usize,
    /// How long one frame may wait for a full event channel to drain before
    /// the oldest events are overwritten.
    pub handoff_timeout: Duration,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password,
            handshake_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(5),
            payload_timeout: Duration::from_secs(2),
            event_capacity: 1024,
            handoff_timeout: Duration::from_secs(1),
        }
    }

    /// The `ws://{host}/ws/rfc6455` endpoint.
    pub fn ws_url(&self) -> Result<Url, CoreError> {
        if self.host.trim().is_empty() {
            return Err(CoreError::Config {
                message: "host must not be empty".into(),
            });
        }
        Ok(loxly_api::websocket::ws_url(&self.host)?)
    }
}
