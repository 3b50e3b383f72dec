//! Shared configuration for Mysa tools.
//!
//! TOML profiles, password resolution (env + keyring + plaintext),
//! session files, and translation to `mysa_core::ClientConfig`. The CLI
//! layers its flag overrides on top.

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

use mysa_core::{ClientConfig, Session};

const KEYRING_SERVICE: &str = "mysa";
const PASSWORD_ENV: &str = "MYSA_PASSWORD";
const USERNAME_ENV: &str = "MYSA_USERNAME";
const DEFAULT_PROFILE: &str = "default";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {what} configured for profile '{profile}'")]
    NoCredentials { what: &'static str, profile: String },

    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("session file is corrupt: {0}")]
    Session(#[from] serde_json::Error),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Contents of `config.toml`.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    /// Timing every profile inherits unless it sets its own.
    pub defaults: Timing,

    pub profiles: HashMap<String, Profile>,
}

impl Config {
    /// The profile to use: `requested`, else `default_profile`, else
    /// `"default"`.
    ///
    /// An implicit profile that is not in the file resolves to an empty
    /// one, so a bare install still works from env vars alone.
    pub fn profile(&self, requested: Option<&str>) -> Result<(String, Profile), ConfigError> {
        let name = requested
            .or(self.default_profile.as_deref())
            .unwrap_or(DEFAULT_PROFILE)
            .to_owned();
        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile.clone())),
            None if requested.is_none() => Ok((name, Profile::default())),
            None => Err(ConfigError::UnknownProfile(name)),
        }
    }
}

/// HTTP and realtime timing, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Timing {
    /// HTTP request timeout.
    pub timeout: u64,
    /// How long a device streams after each keepalive.
    pub status_timeout: u64,
    /// How early the keepalive fires before that window closes.
    pub keepalive_margin: u64,
}

impl Default for Timing {
    fn default() -> Self {
        let core = ClientConfig::default();
        Self {
            timeout: core.http_timeout.as_secs(),
            status_timeout: core.realtime.status_timeout.as_secs(),
            keepalive_margin: core.realtime.keepalive_margin.as_secs(),
        }
    }
}

/// A named Mysa account profile. Every endpoint field overrides the
/// production default when set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Account e-mail.
    pub username: Option<String>,

    /// Plaintext password. The keyring or an env var is safer.
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    pub api_base_url: Option<String>,
    pub region: Option<String>,
    pub user_pool_id: Option<String>,
    pub app_client_id: Option<String>,
    pub identity_pool_id: Option<String>,
    pub iot_endpoint: Option<String>,
    pub client_id_prefix: Option<String>,

    /// Override the HTTP timeout (seconds).
    pub timeout: Option<u64>,

    /// Device streaming window per keepalive (seconds).
    pub status_timeout: Option<u64>,

    /// How early the keepalive fires before the window closes (seconds).
    pub keepalive_margin: Option<u64>,
}

// ── Paths ───────────────────────────────────────────────────────────

/// Platform config and data directories, or `~/.config/mysa` for both
/// when the platform has no home directory convention.
fn base_dirs() -> (PathBuf, PathBuf) {
    if let Some(dirs) = ProjectDirs::from("com", "mysa-rs", "mysa") {
        return (dirs.config_dir().to_owned(), dirs.data_dir().to_owned());
    }
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
    let dir = home.join(".config").join("mysa");
    (dir.clone(), dir)
}

/// The default `config.toml` location.
pub fn config_path() -> PathBuf {
    base_dirs().0.join("config.toml")
}

/// Where the session for `profile_name` is kept by default.
pub fn session_path(profile_name: &str) -> PathBuf {
    base_dirs()
        .1
        .join("sessions")
        .join(format!("{profile_name}.json"))
}

// ── Config loading ──────────────────────────────────────────────────

/// Load `config.toml` from its default location.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path` layered under `MYSA_`-prefixed environment
/// variables. A missing file is not an error.
///
/// Nested keys use a double underscore:
/// `MYSA_PROFILES__HOME__USERNAME=me@example.com`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("MYSA_").split("__"))
        .extract()
        .map_err(ConfigError::from)
}

/// Write `cfg` as TOML, creating parent directories.
pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the account username: profile, then `MYSA_USERNAME`.
pub fn resolve_username(profile: &Profile, profile_name: &str) -> Result<String, ConfigError> {
    profile
        .username
        .clone()
        .or_else(|| std::env::var(USERNAME_ENV).ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            what: "username",
            profile: profile_name.into(),
        })
}

/// Resolve the password from env, the system keyring, then plaintext.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_password_with(
        profile,
        profile_name,
        |name| std::env::var(name).ok(),
        |account| {
            keyring::Entry::new(KEYRING_SERVICE, account)
                .and_then(|entry| entry.get_password())
                .ok()
        },
    )
}

/// The password chain with injectable env and keyring lookups.
pub fn resolve_password_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env, then the global env var
    let from_env = profile
        .password_env
        .as_deref()
        .and_then(&env)
        .or_else(|| env(PASSWORD_ENV));
    if let Some(pw) = from_env {
        return Ok(SecretString::from(pw));
    }

    // 2. System keyring
    if let Some(pw) = keyring(&keyring_account(profile_name)) {
        return Ok(SecretString::from(pw));
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        what: "password",
        profile: profile_name.into(),
    })
}

/// Store a password in the system keyring for `profile_name`.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_account(profile_name))?;
    entry.set_password(password)?;
    Ok(())
}

fn keyring_account(profile_name: &str) -> String {
    format!("{profile_name}/password")
}

// ── Session files ───────────────────────────────────────────────────

/// Read a persisted session. A missing file is `Ok(None)`.
pub fn load_session(path: &Path) -> Result<Option<Session>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Persist a session, readable only by the current user where supported.
pub fn save_session(path: &Path, session: &Session) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(session)?;
    std::fs::write(path, body)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Delete a persisted session. Missing files are fine.
pub fn remove_session(path: &Path) -> Result<(), ConfigError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ── Translation to ClientConfig ─────────────────────────────────────

/// Build a `ClientConfig` from a profile, starting from the production
/// defaults.
pub fn profile_to_client_config(
    profile: &Profile,
    defaults: &Timing,
) -> Result<ClientConfig, ConfigError> {
    let mut cfg = ClientConfig::default();

    if let Some(ref base) = profile.api_base_url {
        url::Url::parse(base).map_err(|e| ConfigError::Validation {
            field: "api_base_url".into(),
            reason: format!("invalid URL '{base}': {e}"),
        })?;
        cfg.api_base_url.clone_from(base);
    }

    let overrides = [
        (&profile.region, &mut cfg.region),
        (&profile.user_pool_id, &mut cfg.user_pool_id),
        (&profile.app_client_id, &mut cfg.app_client_id),
        (&profile.identity_pool_id, &mut cfg.identity_pool_id),
        (&profile.iot_endpoint, &mut cfg.iot_endpoint),
        (&profile.client_id_prefix, &mut cfg.client_id_prefix),
    ];
    for (value, slot) in overrides {
        if let Some(value) = value {
            slot.clone_from(value);
        }
    }

    let status_timeout = profile.status_timeout.unwrap_or(defaults.status_timeout);
    if status_timeout == 0 {
        return Err(ConfigError::Validation {
            field: "status_timeout".into(),
            reason: "must be at least one second".into(),
        });
    }
    cfg.http_timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    cfg.realtime.status_timeout = Duration::from_secs(status_timeout);
    cfg.realtime.keepalive_margin =
        Duration::from_secs(profile.keepalive_margin.unwrap_or(defaults.keepalive_margin));

    Ok(cfg)
}
