//! HTTP client for the loan service REST API.

use std::sync::OnceLock;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::models::{DashboardStats, OverdueLoan, Settings, SettingsUpdate, SettingsUpdateResponse};
use crate::utils::json::{self, JsonContext};
use crate::{Error, Result};

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Endpoint paths relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    pub overdue_loans: String,
    pub settings: String,
    pub stats: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            overdue_loans: "/overdue-loans".to_string(),
            settings: "/settings".to_string(),
            stats: "/stats".to_string(),
        }
    }
}

/// Thin JSON client over `reqwest`.
///
/// One attempt per call: no retry, no backoff. Non-2xx responses surface as
/// [`Error::HttpStatus`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    endpoints: ApiEndpoints,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8000/api`).
    pub fn new(base_url: &str, endpoints: ApiEndpoints, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| Error::config(format!("Invalid API base URL '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "Unsupported API URL scheme '{}'",
                parsed.scheme()
            )));
        }

        install_rustls_provider();

        let mut builder = reqwest::Client::builder();
        if timeout > Duration::ZERO {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoints,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        url: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Loan service returned an error status");
            return Err(Error::http_status(status, url));
        }

        let body = response.text().await?;
        json::parse_or_warn(
            &body,
            JsonContext::ApiResponse { url },
            "Failed to parse loan service response",
        )
    }

    /// `GET {base}{path}` decoded as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url_for(path);
        debug!(url = %url, "GET");
        let response = self.client.get(&url).send().await?;
        self.read_json(&url, response).await
    }

    /// `PUT {base}{path}` with a JSON body, response decoded as JSON.
    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.url_for(path);
        debug!(url = %url, "PUT");
        let response = self.client.put(&url).json(body).send().await?;
        self.read_json(&url, response).await
    }

    pub async fn overdue_loans(&self) -> Result<Vec<OverdueLoan>> {
        self.get_json(&self.endpoints.overdue_loans).await
    }

    pub async fn settings(&self) -> Result<Settings> {
        self.get_json(&self.endpoints.settings).await
    }

    pub async fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
        let response: SettingsUpdateResponse =
            self.put_json(&self.endpoints.settings, update).await?;
        if let Some(message) = response.message.as_deref() {
            debug!(message, "Settings updated");
        }
        Ok(response.settings)
    }

    pub async fn stats(&self) -> Result<DashboardStats> {
        self.get_json(&self.endpoints.stats).await
    }
}
