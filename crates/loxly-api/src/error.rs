use thiserror::Error;

/// Top-level error type for the `loxly-api` crate.
///
/// Covers every failure mode of the wire protocol: the WebSocket
/// transport, the challenge-response handshake, and the HTTP structure
/// download. `loxly-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The Miniserver answered `authenticate/...` with a non-200 code.
    /// `payload` is the raw reply, kept for diagnostics.
    #[error("Authentication failed: {payload}")]
    AuthenticationFailed { payload: String },

    // ── Protocol ────────────────────────────────────────────────────
    /// A handshake reply was malformed or missing a required field.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A reply did not arrive in time.
    #[error("Timed out after {timeout_ms}ms waiting for {waiting_for}")]
    Timeout {
        waiting_for: &'static str,
        timeout_ms: u64,
    },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed while a reply was still expected.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns `true` if the server rejected the credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}
