// Classic hash authentication
//
// Three text round-trips on an open socket: fetch key/salt/algorithm for
// the user, prove knowledge of the password with a keyed hash, then switch
// the channel into binary status-update mode. Nothing derived here
// outlives the connection it authenticated.

use std::fmt;
use std::time::Duration;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use tracing::debug;

use crate::error::Error;
use crate::websocket::{MessageStream, recv_text, send_command};

/// Command that switches the channel to binary status updates.
pub const ENABLE_BINARY_STATUS: &str = "jdev/sps/enablebinstatusupdate";

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

// ── Hash algorithm ──────────────────────────────────────────────────

/// Hash algorithm announced by the Miniserver in the key reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlg {
    #[default]
    Sha1,
    Sha256,
}

impl HashAlg {
    /// Parse the `hashAlg` field. Case-insensitive.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("SHA1") {
            Some(Self::Sha1)
        } else if raw.eq_ignore_ascii_case("SHA256") {
            Some(Self::Sha256)
        } else {
            None
        }
    }

    fn digest(self, input: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(input).to_vec(),
            Self::Sha256 => Sha256::digest(input).to_vec(),
        }
    }

    fn hmac(self, key: &[u8], input: &[u8]) -> Result<Vec<u8>, Error> {
        let invalid_key = |_| Error::protocol("key rejected by HMAC");
        match self {
            Self::Sha1 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(invalid_key)?;
                mac.update(input);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            Self::Sha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(invalid_key)?;
                mac.update(input);
                Ok(mac.finalize().into_bytes().to_vec())
            }
        }
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha1 => f.write_str("SHA1"),
            Self::Sha256 => f.write_str("SHA256"),
        }
    }
}

// ── Key material ────────────────────────────────────────────────────

/// Challenge material returned by `jdev/sys/getkey2/{user}`.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub key: Vec<u8>,
    pub salt: String,
    pub hash_alg: HashAlg,
}

impl fmt::Debug for KeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyInfo")
            .field("key", &"[redacted]")
            .field("salt", &"[redacted]")
            .field("hash_alg", &self.hash_alg)
            .finish()
    }
}

/// `HEX_UPPER(HASH("{password}:{salt}"))`.
pub fn password_hash(password: &str, salt: &str, alg: HashAlg) -> String {
    hex::encode_upper(alg.digest(format!("{password}:{salt}").as_bytes()))
}

/// `HEX(HMAC(key, "{username}:{password_hash}"))`, lowercase and otherwise
/// untouched: the server compares it verbatim.
pub fn auth_hash(key: &[u8], username: &str, password_hash: &str, alg: HashAlg) -> Result<String, Error> {
    let tag = alg.hmac(key, format!("{username}:{password_hash}").as_bytes())?;
    Ok(hex::encode(tag))
}

// ── Reply envelopes ─────────────────────────────────────────────────

/// Every control reply is wrapped as `{"LL": {...}}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "LL")]
    ll: T,
}

#[derive(Debug, Deserialize)]
struct KeyReply {
    #[serde(default, rename = "Code", alias = "code")]
    code: Option<ReplyCode>,
    value: KeyValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyValue {
    key: String,
    salt: String,
    #[serde(default)]
    hash_alg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CodeReply {
    #[serde(default, rename = "Code", alias = "code")]
    code: Option<ReplyCode>,
}

/// The controller sends codes as strings but older firmware uses numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplyCode {
    Text(String),
    Number(i64),
}

impl ReplyCode {
    fn is_ok(&self) -> bool {
        match self {
            Self::Text(s) => s.trim() == "200",
            Self::Number(n) => *n == 200,
        }
    }
}

/// Parse the `getkey2` reply into key material.
pub fn parse_key_reply(body: &str) -> Result<KeyInfo, Error> {
    let reply: Envelope<KeyReply> = serde_json::from_str(body)
        .map_err(|e| Error::protocol(format!("malformed key reply: {e}")))?;

    if let Some(code) = &reply.ll.code {
        if !code.is_ok() {
            return Err(Error::protocol(format!("key request rejected: {body}")));
        }
    }

    let value = reply.ll.value;
    let key = hex::decode(value.key.trim())
        .map_err(|e| Error::protocol(format!("key is not valid hex: {e}")))?;
    if key.is_empty() {
        return Err(Error::protocol("key reply carried an empty key"));
    }

    let hash_alg = match value.hash_alg.as_deref() {
        None => HashAlg::default(),
        Some(raw) => HashAlg::parse(raw)
            .ok_or_else(|| Error::protocol(format!("unsupported hashAlg '{raw}'")))?,
    };

    Ok(KeyInfo {
        key,
        salt: value.salt,
        hash_alg,
    })
}

/// Check the `authenticate/...` reply. Anything but code 200 is a
/// rejection carrying the raw reply.
pub fn check_auth_reply(body: &str) -> Result<(), Error> {
    let accepted = serde_json::from_str::<Envelope<CodeReply>>(body)
        .ok()
        .and_then(|reply| reply.ll.code)
        .is_some_and(|code| code.is_ok());

    if accepted {
        Ok(())
    } else {
        Err(Error::AuthenticationFailed {
            payload: body.to_owned(),
        })
    }
}

// ── Session state machine ───────────────────────────────────────────

/// Progress of one handshake attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    KeyRequested,
    Hashed,
    Authenticated,
    Failed,
}

/// One challenge-response handshake over an already-open socket.
///
/// A session makes exactly one attempt; retrying means building a new
/// session on a new connection.
pub struct AuthSession {
    username: String,
    password: SecretString,
    state: AuthState,
    reply_timeout: Duration,
}

impl AuthSession {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
            state: AuthState::Idle,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    /// How long to wait for each handshake reply. Default: 5s.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Drive the handshake to completion and enable binary status updates.
    ///
    /// On success the server starts pushing binary frames on `ws`.
    pub async fn authenticate<S: MessageStream>(&mut self, ws: &mut S) -> Result<(), Error> {
        if self.state != AuthState::Idle {
            return Err(Error::protocol("handshake already attempted on this session"));
        }

        let result = self.run(ws).await;
        if result.is_err() {
            self.state = AuthState::Failed;
        }
        result
    }

    async fn run<S: MessageStream>(&mut self, ws: &mut S) -> Result<(), Error> {
        debug!(username = %self.username, "requesting key");
        send_command(ws, &format!("jdev/sys/getkey2/{}", self.username)).await?;
        self.state = AuthState::KeyRequested;

        let reply = recv_text(ws, self.reply_timeout, "key reply").await?;
        let key_info = parse_key_reply(&reply)?;
        debug!(hash_alg = %key_info.hash_alg, "received key");

        let pw_hash = password_hash(
            self.password.expose_secret(),
            &key_info.salt,
            key_info.hash_alg,
        );
        let hash = auth_hash(&key_info.key, &self.username, &pw_hash, key_info.hash_alg)?;
        self.state = AuthState::Hashed;

        send_command(ws, &format!("authenticate/{hash}")).await?;
        let reply = recv_text(ws, self.reply_timeout, "authenticate reply").await?;
        check_auth_reply(&reply)?;
        self.state = AuthState::Authenticated;
        debug!("authenticated");

        // The server answers with binary frames from here on; no reply is awaited.
        send_command(ws, ENABLE_BINARY_STATUS).await?;
        debug!("binary status updates enabled");
        Ok(())
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("username", &self.username)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const USERNAME: &str = "admin";
    const PASSWORD: &str = "secret";
    const SALT: &str = "0123abcd";
    const KEY_HEX: &str = "41424344454647484950";

    #[test]
    fn sha1_password_hash_is_upper_hex() {
        assert_eq!(
            password_hash(PASSWORD, SALT, HashAlg::Sha1),
            "7737C393B3D177D9D57C390E1A14153666E67099"
        );
    }

    #[test]
    fn sha1_auth_hash_golden_vector() {
        let key = hex::decode(KEY_HEX).unwrap();
        let pw = password_hash(PASSWORD, SALT, HashAlg::Sha1);
        assert_eq!(
            auth_hash(&key, USERNAME, &pw, HashAlg::Sha1).unwrap(),
            "d9405cd685ff374bf3a57d763acf06a255e83b14"
        );
    }

    #[test]
    fn sha256_auth_hash_golden_vector() {
        let key = hex::decode(KEY_HEX).unwrap();
        let pw = password_hash(PASSWORD, SALT, HashAlg::Sha256);
        assert_eq!(
            pw,
            "3A056F4A19A0E35E8DF45DEB06AE7A75DF97DA61630E23771A689935D4A70542"
        );
        assert_eq!(
            auth_hash(&key, USERNAME, &pw, HashAlg::Sha256).unwrap(),
            "33b3e16a2a268c0ee25f32d56d775726fa23d77a6314d538a93bcce883d98d80"
        );
    }

    #[test]
    fn key_reply_defaults_to_sha1() {
        let body = r#"{"LL":{"control":"jdev/sys/getkey2/admin","code":"200","value":{"key":"41424344","salt":"abc"}}}"#;
        let info = parse_key_reply(body).unwrap();
        assert_eq!(info.key, b"ABCD".to_vec());
        assert_eq!(info.salt, "abc");
        assert_eq!(info.hash_alg, HashAlg::Sha1);
    }

    #[test]
    fn key_reply_reads_sha256() {
        let body = r#"{"LL":{"value":{"key":"41","salt":"s","hashAlg":"SHA256"}}}"#;
        assert_eq!(parse_key_reply(body).unwrap().hash_alg, HashAlg::Sha256);
    }

    #[test]
    fn key_reply_missing_salt_is_protocol_error() {
        let body = r#"{"LL":{"value":{"key":"41"}}}"#;
        assert!(matches!(parse_key_reply(body), Err(Error::Protocol { .. })));
    }

    #[test]
    fn key_reply_with_bad_hex_is_protocol_error() {
        let body = r#"{"LL":{"value":{"key":"zz","salt":"s"}}}"#;
        assert!(matches!(parse_key_reply(body), Err(Error::Protocol { .. })));
    }

    #[test]
    fn key_reply_with_unknown_algorithm_is_protocol_error() {
        let body = r#"{"LL":{"value":{"key":"41","salt":"s","hashAlg":"MD5"}}}"#;
        assert!(matches!(parse_key_reply(body), Err(Error::Protocol { .. })));
    }

    #[test]
    fn key_reply_with_error_code_is_protocol_error() {
        let body = r#"{"LL":{"code":"404","value":{"key":"41","salt":"s"}}}"#;
        assert!(matches!(parse_key_reply(body), Err(Error::Protocol { .. })));
    }

    #[test]
    fn auth_reply_accepts_string_and_numeric_200() {
        assert!(check_auth_reply(r#"{"LL":{"control":"authenticate/x","Code":"200","value":""}}"#).is_ok());
        assert!(check_auth_reply(r#"{"LL":{"code":200}}"#).is_ok());
    }

    #[test]
    fn auth_reply_rejection_carries_payload() {
        let body = r#"{"LL":{"Code":"401","value":"unauthorized"}}"#;
        match check_auth_reply(body) {
            Err(Error::AuthenticationFailed { payload }) => assert_eq!(payload, body),
            other => panic!("expected AuthenticationFailed, got {other:?}"),
        }
    }

    #[test]
    fn auth_reply_garbage_is_rejection() {
        assert!(check_auth_reply("not json").unwrap_err().is_auth_failure());
    }

    #[test]
    fn new_session_is_idle() {
        let session = AuthSession::new(USERNAME, SecretString::from(PASSWORD.to_owned()));
        assert_eq!(session.state(), AuthState::Idle);
        assert!(!format!("{session:?}").contains(PASSWORD));
    }
}
