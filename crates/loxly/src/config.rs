//! CLI configuration -- thin wrapper around `loxly_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--host, --username, --timeout, --output).

use std::time::Duration;

use clap::ValueEnum;

use loxly_config::{Config, Profile};
use loxly_core::ClientConfig;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

pub use loxly_config::{cache_dir, config_path, load_config};

/// Everything a command needs from config + flags.
#[derive(Debug)]
pub struct Resolved {
    pub profile_name: String,
    pub client: ClientConfig,
    pub structure_max_age: Duration,
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Output format: flag, else `defaults.output`, else human.
pub fn output_format(global: &GlobalOpts, config: &Config) -> OutputFormat {
    global.output.unwrap_or_else(|| {
        OutputFormat::from_str(&config.defaults.output, true).unwrap_or(OutputFormat::Human)
    })
}

/// Translate the active profile + global flags into a `ClientConfig`.
///
/// Flags win over profile values. With no matching profile, `--host`
/// alone is enough; credentials then come from the environment or keyring.
pub fn resolve(global: &GlobalOpts, config: &Config) -> Result<Resolved, CliError> {
    let profile_name = active_profile_name(global, config);

    let mut profile = match config.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        None if global.host.is_some() => Profile::default(),
        None if config.profiles.is_empty() => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
        None => {
            let mut available: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available.join(", "),
            });
        }
    };

    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(ref username) = global.username {
        profile.username = Some(username.clone());
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    let client = loxly_config::profile_to_client_config(&profile, &profile_name, &config.defaults)?;
    tracing::debug!(profile = %profile_name, host = %client.host, "resolved connection settings");

    Ok(Resolved {
        profile_name,
        client,
        structure_max_age: config.structure_max_age(),
    })
}
