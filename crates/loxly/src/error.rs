//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a distinct exit code per failure class.

use miette::Diagnostic;
use thiserror::Error;

use loxly_config::ConfigError;
use loxly_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    /// Connected and streaming, then the Miniserver went away.
    pub const STREAM_ENDED: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to Miniserver at {url}")]
    #[diagnostic(
        code(loxly::connection_failed),
        help(
            "Check that the Miniserver is powered and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Handshake with the Miniserver failed: {message}")]
    #[diagnostic(
        code(loxly::protocol),
        help("The Miniserver answered with something unexpected. Retry with -vv for details.")
    )]
    Protocol { message: String },

    #[error("Connection closed by Miniserver")]
    #[diagnostic(
        code(loxly::stream_ended),
        help("The stream ended after connecting. Run the command again to resume watching.")
    )]
    StreamEnded,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed")]
    #[diagnostic(
        code(loxly::auth_failed),
        help(
            "Verify the username and password for profile '{profile}'.\n\
             Server replied: {payload}"
        )
    )]
    AuthFailed { profile: String, payload: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(loxly::no_credentials),
        help(
            "Set a username and password in the profile, store the password in the\n\
             system keyring under service 'loxly' as '{profile}/password',\n\
             or export LOXLY_USERNAME and LOXLY_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Structure ────────────────────────────────────────────────────
    #[error("Malformed structure file: {message}")]
    #[diagnostic(
        code(loxly::malformed_structure),
        help("Download a fresh copy with --refresh-structure.")
    )]
    MalformedStructure { message: String },

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(loxly::not_found),
        help("Run: loxly {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(loxly::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(loxly::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No Miniserver configured")]
    #[diagnostic(
        code(loxly::no_config),
        help(
            "Pass --host and --username, or add a profile to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(loxly::config))]
    Config(Box<figment::Error>),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out: {message}")]
    #[diagnostic(
        code(loxly::timeout),
        help("Increase the handshake timeout with --timeout or check the Miniserver's load.")
    )]
    Timeout { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON encoding failed: {0}")]
    #[diagnostic(code(loxly::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::StreamEnded => exit_code::STREAM_ENDED,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the profile name to an authentication failure.
    pub fn for_profile(self, name: &str) -> Self {
        match self {
            Self::AuthFailed { payload, .. } => Self::AuthFailed {
                profile: name.to_owned(),
                payload,
            },
            other => other,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MalformedStructure { message } => CliError::MalformedStructure { message },
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },
            CoreError::Protocol { message } => CliError::Protocol { message },
            CoreError::AuthenticationFailed { payload } => CliError::AuthFailed {
                profile: "default".into(),
                payload,
            },
            CoreError::Timeout { message } => CliError::Timeout { message },
            CoreError::NotConnected => CliError::Protocol {
                message: "not connected".into(),
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

impl From<loxly_api::Error> for CliError {
    fn from(err: loxly_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
            },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Figment(err) => CliError::Config(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_connected_and_stream_ended_exit_differently() {
        let refused = CliError::from(CoreError::ConnectionFailed {
            url: "ws://10.0.0.1/ws/rfc6455".into(),
            reason: "refused".into(),
        });
        assert_eq!(refused.exit_code(), exit_code::CONNECTION);
        assert_eq!(CliError::StreamEnded.exit_code(), exit_code::STREAM_ENDED);
    }

    #[test]
    fn close_during_handshake_is_connection_failure() {
        let err = CliError::from(loxly_api::Error::WebSocketClosed {
            code: 1006,
            reason: "stream ended".into(),
        });
        assert!(matches!(err, CliError::ConnectionFailed { .. }));
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn auth_failure_names_profile() {
        let err = CliError::from(CoreError::AuthenticationFailed {
            payload: "401".into(),
        })
        .for_profile("home");
        assert_eq!(err.exit_code(), exit_code::AUTH);
        assert!(matches!(err, CliError::AuthFailed { ref profile, .. } if profile == "home"));
    }

    #[test]
    fn malformed_structure_is_general_failure() {
        let err = CliError::from(loxly_api::Error::Deserialization {
            message: "missing field `rooms`".into(),
            body: "{}".into(),
        });
        assert!(matches!(err, CliError::MalformedStructure { .. }));
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}
