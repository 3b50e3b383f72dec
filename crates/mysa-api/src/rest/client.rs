// Mysa REST HTTP client
//
// Wraps `reqwest::Client` with base-URL joining and the Mysa authorization
// convention: the id token goes in `Authorization` verbatim, with no
// `Bearer` scheme.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::http::HttpConfig;
use crate::rest::models::{DeviceStates, Devices, Firmwares};

/// Production REST base URL.
pub const DEFAULT_BASE_URL: &str = "https://app-prod.mysa.cloud";

/// HTTP client for the Mysa REST API.
///
/// Stateless with respect to authentication: every call takes the id token
/// to present, so token refresh stays with the caller.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    pub fn new(base_url: Url, http: &HttpConfig) -> Result<Self, Error> {
        Ok(Self::with_client(http.build_client()?, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /devices`
    pub async fn get_devices(&self, id_token: &SecretString) -> Result<Devices, Error> {
        self.get("devices", id_token).await
    }

    /// `GET /devices/firmware`
    pub async fn get_device_firmwares(&self, id_token: &SecretString) -> Result<Firmwares, Error> {
        self.get("devices/firmware", id_token).await
    }

    /// `GET /devices/state`
    pub async fn get_device_states(&self, id_token: &SecretString) -> Result<DeviceStates, Error> {
        self.get("devices/state", id_token).await
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, id_token: &SecretString) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");

        let resp = self
            .http
            .get(url.clone())
            .header(reqwest::header::AUTHORIZATION, id_token.expose_secret())
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_owned(),
                url: url.to_string(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })
    }
}
