// Shared transport configuration for the HTTP side of the protocol.
//
// Only the structure download goes over HTTP; callers pass the profile's
// timeout here so it bounds the download the same way it bounds the
// WebSocket handshake.

use std::time::Duration;

use crate::error::Error;

/// Settings for building the HTTP client used by [`StructureClient`](crate::StructureClient).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        Ok(reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("loxly/", env!("CARGO_PKG_VERSION")))
            .build()?)
    }
}
