use crate::client::builder::GatewayConfig;
use crate::client::error_classification::RawFailure;
use crate::{Error, ErrorContext, Result};
use reqwest::{Method, Proxy};
use std::time::Duration;

/// Single-attempt HTTP transport. Retry, fault injection and classification live above it.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let parsed = url::Url::parse(&config.base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid base URL: {}", e),
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_details(config.base_url.clone())
                    .with_source("http_transport"),
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::configuration_with_context(
                "base URL must use http or https",
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_source("http_transport"),
            ));
        }

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        match config.proxy_url {
            Some(ref proxy_url) => {
                let proxy = Proxy::all(proxy_url).map_err(|e| {
                    Error::configuration_with_context(
                        format!("invalid proxy URL: {}", e),
                        ErrorContext::new()
                            .with_field_path("proxy_url")
                            .with_source("http_transport"),
                    )
                })?;
                builder = builder.proxy(proxy);
            }
            // ambient HTTP_PROXY is ignored
            None => builder = builder.no_proxy(),
        }

        let client = builder.build().map_err(|e| {
            Error::configuration_with_context(
                format!("failed to build HTTP client: {}", e),
                ErrorContext::new().with_source("http_transport"),
            )
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Perform one request and return the raw body of a 2xx response.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        request_id: &str,
    ) -> std::result::Result<Vec<u8>, RawFailure> {
        let url = self.url_for(path);
        let mut req = self
            .client
            .request(method, &url)
            .header("accept", "application/json")
            .header("x-request-id", request_id);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| RawFailure::from_reqwest(&e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RawFailure::Status(status.as_u16()));
        }

        let bytes = resp.bytes().await.map_err(|e| RawFailure::from_reqwest(&e))?;
        Ok(bytes.to_vec())
    }
}
