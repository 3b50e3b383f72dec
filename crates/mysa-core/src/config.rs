// ── Runtime client configuration ──
//
// These types describe *how* to reach the Mysa cloud. They carry endpoint
// identifiers and timing, but never touch disk. The CLI builds a
// `ClientConfig` (usually from `mysa-config`) and hands it in.

use std::time::Duration;

use mysa_api::http::HttpConfig;
use mysa_api::rest::client::DEFAULT_BASE_URL;

/// AWS region hosting the Mysa identity and IoT services.
pub const DEFAULT_REGION: &str = "us-east-1";
/// Cognito user pool holding Mysa accounts.
pub const DEFAULT_USER_POOL_ID: &str = "us-east-1_GUFWfhI7g";
/// Cognito app client id used by the Mysa mobile apps.
pub const DEFAULT_APP_CLIENT_ID: &str = "19efs8tgqe942atbqmot5m36t3";
/// Identity pool that vends transport credentials.
pub const DEFAULT_IDENTITY_POOL_ID: &str = "us-east-1:ebd95d52-9995-45da-b059-56b865a18379";
/// AWS IoT data endpoint for the MQTT transport.
pub const DEFAULT_IOT_ENDPOINT: &str = "a3q27gia9qg3zy-ats.iot.us-east-1.amazonaws.com";
/// Prefix for generated MQTT client ids.
pub const DEFAULT_CLIENT_ID_PREFIX: &str = "mysa-rs";

/// Realtime streaming timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// How long a device streams after one "start publishing" request.
    pub status_timeout: Duration,
    /// How early the keepalive re-sends before the device would stop.
    pub keepalive_margin: Duration,
}

impl RealtimeConfig {
    /// Period between keepalive publishes.
    ///
    /// Never zero: a margin at least as large as the timeout collapses to
    /// one second.
    pub fn keepalive_interval(&self) -> Duration {
        let interval = self.status_timeout.saturating_sub(self.keepalive_margin);
        interval.max(Duration::from_secs(1))
    }

    /// The status timeout in whole seconds, as sent on the wire.
    pub fn status_timeout_secs(&self) -> u64 {
        self.status_timeout.as_secs()
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            status_timeout: Duration::from_secs(300),
            keepalive_margin: Duration::from_secs(10),
        }
    }
}

/// MQTT session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttTuning {
    pub clean_session: bool,
    pub keep_alive: Duration,
    pub ping_timeout: Duration,
    pub operation_timeout: Duration,
}

impl Default for MqttTuning {
    fn default() -> Self {
        Self {
            clean_session: true,
            keep_alive: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(3),
            operation_timeout: Duration::from_secs(60),
        }
    }
}

/// Everything needed to talk to the Mysa cloud.
///
/// Built by the CLI, passed to `MysaClient` -- core never reads config files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// REST API base URL.
    pub api_base_url: String,
    pub region: String,
    pub user_pool_id: String,
    /// Cognito app client id (not the MQTT client id).
    pub app_client_id: String,
    pub identity_pool_id: String,
    /// MQTT broker host.
    pub iot_endpoint: String,
    /// MQTT client ids are `{prefix}-{uuid}`.
    pub client_id_prefix: String,
    /// Timeout for REST and AWS control-plane calls.
    pub http_timeout: Duration,
    pub realtime: RealtimeConfig,
    pub mqtt: MqttTuning,
}

impl ClientConfig {
    pub(crate) fn http(&self) -> HttpConfig {
        HttpConfig {
            timeout: self.http_timeout,
            ..HttpConfig::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.into(),
            region: DEFAULT_REGION.into(),
            user_pool_id: DEFAULT_USER_POOL_ID.into(),
            app_client_id: DEFAULT_APP_CLIENT_ID.into(),
            identity_pool_id: DEFAULT_IDENTITY_POOL_ID.into(),
            iot_endpoint: DEFAULT_IOT_ENDPOINT.into(),
            client_id_prefix: DEFAULT_CLIENT_ID_PREFIX.into(),
            http_timeout: Duration::from_secs(30),
            realtime: RealtimeConfig::default(),
            mqtt: MqttTuning::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_fires_before_timeout() {
        let cfg = RealtimeConfig::default();
        assert_eq!(cfg.keepalive_interval(), Duration::from_secs(290));
        assert_eq!(cfg.status_timeout_secs(), 300);
    }

    #[test]
    fn oversized_margin_clamps_to_one_second() {
        let cfg = RealtimeConfig {
            status_timeout: Duration::from_secs(5),
            keepalive_margin: Duration::from_secs(30),
        };
        assert_eq!(cfg.keepalive_interval(), Duration::from_secs(1));
    }

    #[test]
    fn defaults_target_production() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.api_base_url, "https://app-prod.mysa.cloud");
        assert_eq!(cfg.region, "us-east-1");
        assert!(cfg.mqtt.clean_session);
        assert_eq!(cfg.mqtt.keep_alive, Duration::from_secs(30));
    }
}
