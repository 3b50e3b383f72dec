//! CLI-side configuration: picks the config file and profile, then layers
//! flag overrides on top of `mysa_config`.

use std::path::PathBuf;
use std::time::Duration;

use mysa_config::{Config, Profile};
use mysa_core::ClientConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything a command needs to know about where it is running.
#[derive(Debug)]
pub struct Resolved {
    pub config_path: PathBuf,
    pub profile_name: String,
    pub profile: Profile,
    pub session_path: PathBuf,
    pub client_config: ClientConfig,
}

/// The config file in effect: `--config`, else the platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(mysa_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(mysa_config::load_config_from(&config_path(global))?)
}

/// Resolve the active profile and translate it to a `ClientConfig`.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load(global)?;
    let (profile_name, mut profile) = cfg.profile(global.profile.as_deref())?;

    // Flags beat the profile.
    if let Some(ref username) = global.username {
        profile.username = Some(username.clone());
    }

    let mut client_config = mysa_config::profile_to_client_config(&profile, &cfg.defaults)?;
    if let Some(secs) = global.timeout {
        client_config.http_timeout = Duration::from_secs(secs);
    }

    let session_path = global
        .session_file
        .clone()
        .unwrap_or_else(|| mysa_config::session_path(&profile_name));

    tracing::debug!(
        profile = %profile_name,
        session = %session_path.display(),
        "resolved profile"
    );

    Ok(Resolved {
        config_path: config_path(global),
        profile_name,
        profile,
        session_path,
        client_config,
    })
}
