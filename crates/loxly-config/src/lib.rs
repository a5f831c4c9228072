//! Configuration for the loxly CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation to `loxly_core::ClientConfig`. Core never sees these types;
//! it receives a pre-built `ClientConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use loxly_core::ClientConfig;

/// Keyring service name. Entries are stored as `<profile>/password`.
pub const KEYRING_SERVICE: &str = "loxly";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named Miniserver profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// `human` or `json`.
    #[serde(default = "default_output")]
    pub output: String,

    /// Handshake reply timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Re-download the structure file once the cached copy is this old, seconds.
    #[serde(default = "default_structure_max_age")]
    pub structure_max_age: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
            structure_max_age: default_structure_max_age(),
        }
    }
}

fn default_output() -> String {
    "human".into()
}
fn default_timeout() -> u64 {
    5
}
fn default_structure_max_age() -> u64 {
    3600
}

/// A named Miniserver profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Host or `host:port` (e.g., "192.168.0.222").
    pub host: String,

    pub username: Option<String>,

    /// Password (plaintext -- prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Override `defaults.timeout`.
    pub timeout: Option<u64>,
}

impl Config {
    /// Look up a profile by name, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());
        let profile = self
            .profiles
            .get(&name)
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.clone() })?;
        Ok((name, profile))
    }

    pub fn structure_max_age(&self) -> Duration {
        Duration::from_secs(self.defaults.structure_max_age)
    }
}

// ── Paths ───────────────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "loxly", "loxly").map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Directory for downloaded structure files.
pub fn cache_dir() -> PathBuf {
    ProjectDirs::from("com", "loxly", "loxly")
        .map_or_else(|| home_fallback(".cache"), |dirs| dirs.cache_dir().to_path_buf())
}

fn home_fallback(kind: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(kind);
    p.push("loxly");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from `path` + `LOXLY_`-prefixed environment variables.
///
/// Nested keys use a double underscore: `LOXLY_PROFILES__HOME__HOST`.
/// A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    tracing::debug!(path = %path.display(), "loading config");
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("LOXLY_").split("__"))
        .extract()?;
    Ok(config)
}

// ── Credential resolution ───────────────────────────────────────────

/// Username from the profile, else `LOXLY_USERNAME`.
pub fn resolve_username(profile: &Profile, profile_name: &str) -> Result<String, ConfigError> {
    profile
        .username
        .clone()
        .or_else(|| std::env::var("LOXLY_USERNAME").ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })
}

/// Resolve the password from the credential chain.
///
/// Order: the profile's `password_env` variable, `LOXLY_PASSWORD`, the
/// system keyring, then plaintext in the config file.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. Global env var
    if let Ok(val) = std::env::var("LOXLY_PASSWORD") {
        return Ok(SecretString::from(val));
    }

    // 3. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 4. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Build a `ClientConfig` from a profile, with no CLI overrides.
pub fn profile_to_client_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    if profile.host.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: format!("profile '{profile_name}' has no host"),
        });
    }

    let username = resolve_username(profile, profile_name)?;
    let password = resolve_password(profile, profile_name)?;

    let mut config = ClientConfig::new(profile.host.trim(), username, password);
    config.handshake_timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
        default_profile = "home"

        [defaults]
        timeout = 8

        [profiles.home]
        host = "192.168.0.222"
        username = "admin"
        password_env = "HOME_MS_PASSWORD"

        [profiles.cabin]
        host = "cabin.local:8080"
        username = "viewer"
        timeout = 20
    "#;

    #[test]
    fn loads_profiles_and_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;

            assert_eq!(config.defaults.timeout, 8);
            assert_eq!(config.defaults.output, "human");
            assert_eq!(config.structure_max_age(), Duration::from_secs(3600));

            let (name, profile) = config.profile(None).map_err(|e| e.to_string())?;
            assert_eq!(name, "home");
            assert_eq!(profile.host, "192.168.0.222");

            let (_, cabin) = config.profile(Some("cabin")).map_err(|e| e.to_string())?;
            assert_eq!(cabin.timeout, Some(20));
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_| {
            let config = load_config_from(Path::new("absent.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.default_profile.as_deref(), Some("default"));
            assert!(config.profiles.is_empty());
            assert!(matches!(
                config.profile(None),
                Err(ConfigError::UnknownProfile { .. })
            ));
            Ok(())
        });
    }

    #[test]
    fn env_overrides_nested_keys() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("LOXLY_PROFILES__HOME__HOST", "10.0.0.9");
            jail.set_env("LOXLY_DEFAULTS__STRUCTURE_MAX_AGE", "60");

            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.profiles["home"].host, "10.0.0.9");
            assert_eq!(config.structure_max_age(), Duration::from_secs(60));
            Ok(())
        });
    }

    #[test]
    fn password_env_wins_over_global_env() {
        Jail::expect_with(|jail| {
            jail.set_env("HOME_MS_PASSWORD", "from-profile-env");
            jail.set_env("LOXLY_PASSWORD", "from-global-env");

            let profile = Profile {
                host: "192.168.0.222".into(),
                username: Some("admin".into()),
                password: Some("plaintext".into()),
                password_env: Some("HOME_MS_PASSWORD".into()),
                timeout: None,
            };
            let password = resolve_password(&profile, "home").map_err(|e| e.to_string())?;
            assert_eq!(password.expose_secret(), "from-profile-env");
            Ok(())
        });
    }

    #[test]
    fn global_env_used_without_password_env() {
        Jail::expect_with(|jail| {
            jail.set_env("LOXLY_PASSWORD", "from-global-env");

            let profile = Profile {
                host: "192.168.0.222".into(),
                username: Some("admin".into()),
                ..Profile::default()
            };
            let config = profile_to_client_config(&profile, "home", &Defaults::default())
                .map_err(|e| e.to_string())?;
            assert_eq!(config.password.expose_secret(), "from-global-env");
            assert_eq!(config.username, "admin");
            assert_eq!(config.handshake_timeout, Duration::from_secs(5));
            Ok(())
        });
    }

    #[test]
    fn empty_host_is_rejected() {
        let profile = Profile {
            host: "  ".into(),
            ..Profile::default()
        };
        let err = profile_to_client_config(&profile, "broken", &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "host"));
    }
}
