//! HTTP transport posting pings to the collector.

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, DATE, HeaderMap, HeaderValue};
use tracing::{debug, warn};
use url::Url;

use super::{PingTransport, UploadOutcome};
use crate::Result;
use crate::config::TelemetryConfig;
use crate::error::ErrorKind;
use crate::ping::Ping;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Posts each ping's measurements to `<server_endpoint><upload_path>`.
pub struct HttpTransport {
    endpoint: Url,
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        install_rustls_provider();

        let endpoint = config.endpoint()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { endpoint, client })
    }

    /// The endpoint with the ping's upload path appended.
    fn upload_url(&self, ping: &Ping) -> std::result::Result<Url, String> {
        if !ping.upload_path.starts_with('/') {
            return Err(format!(
                "upload path must start with '/': {}",
                ping.upload_path
            ));
        }

        let base = self.endpoint.as_str().trim_end_matches('/');
        let url = Url::parse(&format!("{}{}", base, ping.upload_path))
            .map_err(|e| format!("{}: {}", ping.upload_path, e))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported scheme in {}", url));
        }
        Ok(url)
    }

    fn build_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));

        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(value) = HeaderValue::from_str(&date) {
            headers.insert(DATE, value);
        }
        headers
    }
}

#[async_trait]
impl PingTransport for HttpTransport {
    async fn upload(&self, ping: &Ping) -> UploadOutcome {
        let url = match self.upload_url(ping) {
            Ok(url) => url,
            Err(message) => {
                warn!(document_id = %ping.document_id, "Invalid upload URL: {}", message);
                return UploadOutcome::failed(ErrorKind::InvalidUploadUrl, message);
            }
        };

        let body = match ping.to_json() {
            Ok(body) => body,
            Err(e) => {
                warn!(document_id = %ping.document_id, "Failed to serialize ping: {}", e);
                return UploadOutcome::failed(ErrorKind::CannotGenerateJson, e.to_string());
            }
        };

        let response = self
            .client
            .post(url.clone())
            .headers(Self::build_headers())
            .body(body)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    debug!(%url, status = status.as_u16(), "Ping uploaded");
                } else {
                    warn!(%url, status = status.as_u16(), "Collector rejected ping");
                }
                UploadOutcome::response(status.as_u16())
            }
            Err(e) => {
                warn!(%url, error = %e, "Ping upload request failed");
                UploadOutcome::failed(ErrorKind::Network, e.to_string())
            }
        }
    }
}
