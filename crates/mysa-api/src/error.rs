use thiserror::Error;

/// Top-level error type for the `mysa-api` crate.
///
/// Covers every failure mode across all API surfaces:
/// Cognito authentication, REST, the credential broker, the IoT control
/// plane, MQTT transport, and realtime payload decoding.
/// `mysa-core` maps these into caller-facing variants.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (wrong credentials, unconfirmed user, challenge required).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Refresh token rejected or expired -- a fresh login is required.
    #[error("Session expired -- re-authentication required: {message}")]
    SessionExpired { message: String },

    // ── HTTP transport ──────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client construction failed.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── REST API ────────────────────────────────────────────────────
    /// Non-success HTTP status from a Mysa REST endpoint.
    #[error(
        "Failed to call the '{url}' Mysa API endpoint. \
         The server responded with a status of {status} ({status_text})."
    )]
    Api {
        status: u16,
        status_text: String,
        url: String,
    },

    // ── AWS services ────────────────────────────────────────────────
    /// An AWS service (Cognito, Cognito Identity, IoT) answered with an error.
    #[error("AWS {service} error {kind}: {message}")]
    Aws {
        service: &'static str,
        kind: String,
        message: String,
    },

    /// An AWS request never produced a service response (dispatch, timeout).
    #[error("AWS {service} request failed: {message}")]
    AwsRequest {
        service: &'static str,
        message: String,
    },

    // ── MQTT ────────────────────────────────────────────────────────
    /// WebSocket upgrade or MQTT handshake failed.
    #[error("MQTT connection failed: {0}")]
    MqttConnect(String),

    /// Broker answered CONNECT with a non-zero return code.
    #[error("MQTT connection refused (return code {code})")]
    MqttRefused { code: u8 },

    /// Broker rejected a SUBSCRIBE for the given topic.
    #[error("MQTT subscription to '{topic}' rejected")]
    SubscribeRejected { topic: String },

    /// Malformed MQTT packet on the wire.
    #[error("MQTT protocol error: {0}")]
    MqttProtocol(String),

    /// An MQTT operation did not complete within its deadline.
    #[error("MQTT {operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The MQTT connection is closed.
    #[error("MQTT connection closed")]
    ConnectionClosed,

    // ── Data ────────────────────────────────────────────────────────
    /// A realtime payload could not be decoded.
    #[error("Failed to decode realtime payload: {message}")]
    Decode { message: String },

    /// An outbound payload or a signed URL could not be built.
    #[error("Encoding error: {message}")]
    Encode { message: String },

    /// JSON deserialization of an HTTP body failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the error came from a connection that is gone, so
    /// the cached connection must not be reused.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::MqttConnect(_))
    }
}
