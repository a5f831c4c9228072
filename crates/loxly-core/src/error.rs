// ── Core error types ──
//
// User-facing errors from loxly-core. Callers never see raw WebSocket or
// JSON failures; the `From<loxly_api::Error>` impl translates them into
// the taxonomy below. Everything here is raised before the receive loop
// starts: once listening, a dropped socket is an outcome, not an error.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Structure errors ─────────────────────────────────────────────
    #[error("Malformed structure document: {message}")]
    MalformedStructure { message: String },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to Miniserver at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Protocol error during handshake: {message}")]
    Protocol { message: String },

    #[error("Authentication failed: {payload}")]
    AuthenticationFailed { payload: String },

    #[error("Timed out: {message}")]
    Timeout { message: String },

    #[error("Not connected -- call connect() first")]
    NotConnected,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Returns `true` if the Miniserver rejected the credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<loxly_api::Error> for CoreError {
    fn from(err: loxly_api::Error) -> Self {
        match err {
            loxly_api::Error::AuthenticationFailed { payload } => {
                CoreError::AuthenticationFailed { payload }
            }
            loxly_api::Error::Protocol { message } => CoreError::Protocol { message },
            loxly_api::Error::Transport(ref e) => CoreError::ConnectionFailed {
                url: e
                    .url()
                    .map_or_else(|| "<unknown>".into(), ToString::to_string),
                reason: e.to_string(),
            },
            loxly_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            loxly_api::Error::Timeout {
                waiting_for,
                timeout_ms,
            } => CoreError::Timeout {
                message: format!("no {waiting_for} within {timeout_ms}ms"),
            },
            loxly_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            // Only the handshake reads replies, so a close here means the
            // connection never became usable.
            loxly_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("closed during handshake (code {code}): {reason}"),
            },
            loxly_api::Error::Deserialization { message, body: _ } => {
                CoreError::MalformedStructure { message }
            }
        }
    }
}
