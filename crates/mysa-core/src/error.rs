// ── Core error types ──
//
// Caller-facing errors from mysa-core. The wire-level `mysa_api::Error`
// is translated here so consumers see a small, closed set. Every variant
// carries plain strings, which keeps the type `Clone` for the shared
// connection future.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    /// No usable session: never logged in, or the refresh was rejected.
    #[error("Unauthenticated: {message}")]
    Unauthenticated { message: String },

    /// The identity provider rejected the login.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── REST errors ──────────────────────────────────────────────────
    #[error(
        "Failed to call the '{url}' Mysa API endpoint. \
         The server responded with a status of {status} ({status_text})."
    )]
    Api {
        status: u16,
        status_text: String,
        url: String,
    },

    // ── Realtime errors ──────────────────────────────────────────────
    #[error("Failed to publish after {attempts} attempt(s): {cause}")]
    TransportPublish { attempts: u32, cause: String },

    #[error("Realtime transport error: {message}")]
    Transport { message: String },

    #[error("Failed to decode payload: {message}")]
    Decode { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Returns `true` if a fresh login is needed before retrying.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated { .. })
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<mysa_api::Error> for CoreError {
    fn from(err: mysa_api::Error) -> Self {
        match err {
            mysa_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            mysa_api::Error::SessionExpired { message } => CoreError::Unauthenticated { message },
            mysa_api::Error::Api {
                status,
                status_text,
                url,
            } => CoreError::Api {
                status,
                status_text,
                url,
            },
            mysa_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            mysa_api::Error::Tls(message) => CoreError::Config { message },
            e @ (mysa_api::Error::Transport(_)
            | mysa_api::Error::Aws { .. }
            | mysa_api::Error::AwsRequest { .. }
            | mysa_api::Error::MqttConnect(_)
            | mysa_api::Error::MqttRefused { .. }
            | mysa_api::Error::SubscribeRejected { .. }
            | mysa_api::Error::MqttProtocol(_)
            | mysa_api::Error::Timeout { .. }
            | mysa_api::Error::ConnectionClosed) => CoreError::Transport {
                message: e.to_string(),
            },
            mysa_api::Error::Decode { message } => CoreError::Decode { message },
            mysa_api::Error::Encode { message } => {
                CoreError::Internal(format!("Encode error: {message}"))
            }
            mysa_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_expiry_maps_to_unauthenticated() {
        let err = CoreError::from(mysa_api::Error::SessionExpired {
            message: "Refresh Token has expired".into(),
        });
        assert!(err.is_unauthenticated());
    }

    #[test]
    fn api_error_keeps_status_and_url() {
        let err = CoreError::from(mysa_api::Error::Api {
            status: 503,
            status_text: "Service Unavailable".into(),
            url: "https://app-prod.mysa.cloud/devices".into(),
        });
        let CoreError::Api { status, url, .. } = &err else {
            panic!("expected Api, got {err:?}");
        };
        assert_eq!(*status, 503);
        assert!(url.ends_with("/devices"));
        assert!(err.to_string().contains("503 (Service Unavailable)"));
    }

    #[test]
    fn mqtt_failures_become_transport_errors() {
        let err = CoreError::from(mysa_api::Error::MqttRefused { code: 5 });
        assert!(matches!(err, CoreError::Transport { ref message } if message.contains('5')));
    }
}
