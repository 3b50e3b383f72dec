// Shared HTTP configuration for building reqwest::Client instances.
//
// The REST client is built from it here. The AWS service clients take the
// same timeout through `aws::sdk_config`.

use std::time::Duration;

use crate::error::Error;

const USER_AGENT: &str = concat!("mysa-rs/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP configuration for building clients.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: USER_AGENT.into(),
        }
    }
}

impl HttpConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}
