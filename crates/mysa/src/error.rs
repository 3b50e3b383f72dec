//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use mysa_config::ConfigError;
use mysa_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: u8 = 1;
    pub const USAGE: u8 = 2;
    pub const AUTH: u8 = 3;
    pub const NOT_FOUND: u8 = 4;
    pub const CONNECTION: u8 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(mysa::auth_failed),
        help(
            "Verify the account e-mail and password.\n\
             Run: mysa login --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("Not logged in: {message}")]
    #[diagnostic(
        code(mysa::not_authenticated),
        help(
            "The stored session is missing or could not be refreshed.\n\
             Run: mysa login --profile {profile}"
        )
    )]
    NotAuthenticated { profile: String, message: String },

    #[error("No {what} configured for profile '{profile}'")]
    #[diagnostic(
        code(mysa::no_credentials),
        help(
            "Set MYSA_USERNAME and MYSA_PASSWORD, add the profile to the config file,\n\
             or run: mysa login --save-password"
        )
    )]
    NoCredentials { what: String, profile: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("Device '{device_id}' not found")]
    #[diagnostic(
        code(mysa::not_found),
        help("Run: mysa devices to see available devices")
    )]
    DeviceNotFound { device_id: String },

    // ── Remote services ──────────────────────────────────────────────

    #[error("API error ({status}): {message}")]
    #[diagnostic(code(mysa::api_error))]
    Api { status: String, message: String },

    #[error("Realtime transport failed: {message}")]
    #[diagnostic(
        code(mysa::transport),
        help("Check network connectivity to AWS IoT and retry.")
    )]
    Transport { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(mysa::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(mysa::profile_not_found),
        help("Add a [profiles.{name}] table to the config file at {path}")
    )]
    ProfileNotFound { name: String, path: String },

    #[error(transparent)]
    #[diagnostic(code(mysa::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not encode output: {0}")]
    #[diagnostic(code(mysa::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::AuthFailed { .. } | Self::NotAuthenticated { .. } | Self::NoCredentials { .. } => {
                exit_code::AUTH
            }
            Self::DeviceNotFound { .. } => exit_code::NOT_FOUND,
            Self::Transport { .. } => exit_code::CONNECTION,
            Self::Validation { .. } | Self::ProfileNotFound { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the active profile name to errors whose help text names it.
    pub fn with_profile(self, profile: &str) -> Self {
        match self {
            Self::AuthFailed { message, .. } => Self::AuthFailed {
                profile: profile.to_owned(),
                message,
            },
            Self::NotAuthenticated { message, .. } => Self::NotAuthenticated {
                profile: profile.to_owned(),
                message,
            },
            other => other,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Unauthenticated { message } => CliError::NotAuthenticated {
                profile: "default".into(),
                message,
            },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                profile: "default".into(),
                message,
            },

            CoreError::Api {
                status,
                status_text,
                url,
            } => CliError::Api {
                status: status.to_string(),
                message: format!("{status_text} ({url})"),
            },

            CoreError::TransportPublish { attempts, cause } => CliError::Transport {
                message: format!("publish failed after {attempts} attempt(s): {cause}"),
            },

            CoreError::Transport { message } => CliError::Transport { message },

            CoreError::DeviceNotFound { device_id } => CliError::DeviceNotFound { device_id },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Decode { message } => CliError::Api {
                status: "decode".into(),
                message,
            },

            CoreError::Internal(message) => CliError::Api {
                status: "internal".into(),
                message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { what, profile } => CliError::NoCredentials {
                what: what.into(),
                profile,
            },
            ConfigError::UnknownProfile(name) => CliError::ProfileNotFound {
                name,
                path: mysa_config::config_path().display().to_string(),
            },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}
