//! Where the structure catalog comes from.
//!
//! `--structure <file>` wins. Otherwise the downloaded `LoxAPP3.json` is
//! kept per host under the cache dir and reused until it is older than
//! `defaults.structure_max_age`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use loxly_api::{StructureClient, StructureDocument, TransportConfig};
use loxly_core::{ClientConfig, StructureCatalog};

use crate::error::CliError;

/// On-disk copies of downloaded structure documents, one file per host.
#[derive(Debug, Clone)]
pub struct StructureCache {
    dir: PathBuf,
}

impl StructureCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache file for `host` (`192.168.0.222:8080` → `192.168.0.222_8080.json`).
    pub fn path_for(&self, host: &str) -> PathBuf {
        let stem: String = host
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{stem}.json"))
    }

    /// The cached document, if present and younger than `max_age`.
    pub fn read_fresh(&self, host: &str, max_age: Duration) -> Option<String> {
        let path = self.path_for(host);
        let modified = fs::metadata(&path).ok()?.modified().ok()?;
        // An mtime in the future counts as fresh.
        let age = SystemTime::now().duration_since(modified).unwrap_or_default();
        if age >= max_age {
            tracing::debug!(path = %path.display(), age_secs = age.as_secs(), "cached structure is stale");
            return None;
        }
        fs::read_to_string(&path).ok()
    }

    /// The cached document regardless of age.
    pub fn read_any(&self, host: &str) -> Option<String> {
        fs::read_to_string(self.path_for(host)).ok()
    }

    pub fn store(&self, host: &str, body: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(host), body)
    }
}

/// Build the catalog from a local structure file.
pub fn load_file(path: &Path) -> Result<StructureCatalog, CliError> {
    let body = fs::read_to_string(path).map_err(|e| CliError::Validation {
        field: "--structure".into(),
        reason: format!("cannot read {}: {e}", path.display()),
    })?;
    Ok(StructureCatalog::load(&body)?)
}

/// Build the catalog for the Miniserver in `config`, via the cache.
///
/// A fresh cached copy is used unless `refresh` is set. A failed download
/// falls back to whatever copy the cache still holds.
pub async fn load_remote(
    cache: &StructureCache,
    config: &ClientConfig,
    max_age: Duration,
    refresh: bool,
) -> Result<StructureCatalog, CliError> {
    if !refresh {
        if let Some(body) = cache.read_fresh(&config.host, max_age) {
            tracing::debug!(host = %config.host, "using cached structure");
            return Ok(StructureCatalog::load(&body)?);
        }
    }

    match download(config).await {
        Ok(body) => {
            if let Err(e) = cache.store(&config.host, &body) {
                tracing::warn!(error = %e, "could not write structure cache");
            }
            Ok(StructureCatalog::load(&body)?)
        }
        Err(err) => match cache.read_any(&config.host) {
            Some(body) => {
                tracing::warn!(error = %err, "structure download failed, using stale cached copy");
                Ok(StructureCatalog::load(&body)?)
            }
            None => Err(err),
        },
    }
}

/// Download the document and reject it before it reaches the cache if it
/// does not parse.
async fn download(config: &ClientConfig) -> Result<String, CliError> {
    let client = StructureClient::new(
        &config.host,
        config.username.clone(),
        config.password.clone(),
        &transport_for(config),
    )?;
    let body = client.fetch_raw().await?;
    StructureDocument::from_json(&body)?;
    Ok(body)
}

/// The download shares the profile's timeout with the handshake.
fn transport_for(config: &ClientConfig) -> TransportConfig {
    TransportConfig::default().with_timeout(config.handshake_timeout)
}
