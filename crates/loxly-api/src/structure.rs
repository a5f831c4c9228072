// Structure document (LoxAPP3.json)
//
// Typed schema for the static description of an installation, plus the
// HTTP client that downloads it. Documents that don't fit the schema are
// rejected outright rather than turned into a partial catalog.

use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Path of the structure document on the Miniserver.
pub const STRUCTURE_PATH: &str = "/data/LoxAPP3.json";

// ── Schema ──────────────────────────────────────────────────────────

/// Top level of `LoxAPP3.json`. Fields this crate has no use for are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureDocument {
    #[serde(default)]
    pub last_modified: Option<String>,
    pub rooms: BTreeMap<String, Room>,
    pub controls: BTreeMap<String, Control>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Control {
    pub name: String,
    #[serde(rename = "type")]
    pub control_type: String,
    /// Room id. Controls without a room are legal.
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub states: BTreeMap<String, StateRef>,
    #[serde(default)]
    pub sub_controls: BTreeMap<String, SubControl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubControl {
    pub name: String,
    #[serde(default)]
    pub states: BTreeMap<String, StateRef>,
}

/// A state entry. Almost always a single id; a few control types list several.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateRef {
    One(String),
    Many(Vec<String>),
}

impl StateRef {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Self::One(id) => std::slice::from_ref(id),
            Self::Many(ids) => ids,
        };
        slice.iter().map(String::as_str)
    }
}

impl StructureDocument {
    /// Parse a structure document from JSON text.
    pub fn from_json(body: &str) -> Result<Self, Error> {
        serde_json::from_str(body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.chars().take(256).collect(),
        })
    }
}

// ── Download ────────────────────────────────────────────────────────

/// HTTP client for `GET /data/LoxAPP3.json` (HTTP Basic auth).
pub struct StructureClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: SecretString,
}

impl StructureClient {
    /// Create a client for the Miniserver at `host` (`"192.168.0.222"`).
    pub fn new(
        host: &str,
        username: impl Into<String>,
        password: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("http://{host}/"))?;
        Ok(Self::with_client(
            transport.build_client()?,
            base_url,
            username,
            password,
        ))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            http,
            base_url,
            username: username.into(),
            password,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Download the raw document text.
    pub async fn fetch_raw(&self) -> Result<String, Error> {
        let url = self.base_url.join(STRUCTURE_PATH)?;
        debug!("fetching structure from {}", url);

        let resp = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::AuthenticationFailed {
                payload: format!("HTTP {status} fetching {STRUCTURE_PATH}"),
            });
        }

        let resp = resp.error_for_status()?;
        let body = resp.text().await?;
        debug!(bytes = body.len(), "structure downloaded");
        Ok(body)
    }

    /// Download and parse the document.
    pub async fn fetch(&self) -> Result<StructureDocument, Error> {
        StructureDocument::from_json(&self.fetch_raw().await?)
    }
}
