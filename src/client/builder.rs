use crate::client::core::CatalogClient;
use crate::resilience::fault_injector::FaultInjector;
use crate::resilience::retry::RetryProfile;
use crate::transport::HttpTransport;
use crate::Result;
use std::env;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://fakestoreapi.com";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Gateway settings, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// Transport-level retries after the first failure.
    pub max_retries: u32,
    pub proxy_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            proxy_url: None,
        }
    }
}

impl GatewayConfig {
    /// Defaults overridden by the environment:
    /// - `STOREFRONT_API_URL`
    /// - `STOREFRONT_HTTP_TIMEOUT_MS` (default 10000)
    /// - `STOREFRONT_MAX_RETRIES` (default 3)
    /// - `STOREFRONT_PROXY_URL`
    ///
    /// Unparseable numbers fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = env::var("STOREFRONT_API_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.base_url);
        let timeout = env::var("STOREFRONT_HTTP_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.timeout);
        let max_retries = env::var("STOREFRONT_MAX_RETRIES")
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(defaults.max_retries);
        let proxy_url = env::var("STOREFRONT_PROXY_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());
        Self {
            base_url,
            timeout,
            max_retries,
            proxy_url,
        }
    }
}

/// Builder for [`CatalogClient`].
///
/// Starts from [`GatewayConfig::from_env`]; every setter overrides the environment.
pub struct CatalogClientBuilder {
    config: GatewayConfig,
    retry: Option<RetryProfile>,
    faults: Option<Arc<FaultInjector>>,
}

impl Default for CatalogClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogClientBuilder {
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::from_env(),
            retry: None,
            faults: None,
        }
    }

    /// Start from an explicit config instead of the environment.
    pub fn with_config(config: GatewayConfig) -> Self {
        Self {
            config,
            retry: None,
            faults: None,
        }
    }

    /// Override the base URL (mock servers, staging mirrors).
    pub fn base_url_override(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.config.proxy_url = Some(url.into());
        self
    }

    /// Replace the transport retry profile entirely (its `max_retries` wins over the config).
    pub fn retry_profile(mut self, profile: RetryProfile) -> Self {
        self.retry = Some(profile);
        self
    }

    /// Share a fault injector with the client. Without one the client gets its own disarmed instance.
    pub fn fault_injector(mut self, injector: Arc<FaultInjector>) -> Self {
        self.faults = Some(injector);
        self
    }

    pub fn build(self) -> Result<CatalogClient> {
        let transport = HttpTransport::new(&self.config)?;
        let retry = self
            .retry
            .unwrap_or_else(|| RetryProfile::transport().with_max_retries(self.config.max_retries));
        let faults = self
            .faults
            .unwrap_or_else(|| Arc::new(FaultInjector::new()));
        Ok(CatalogClient::from_parts(transport, faults, retry))
    }
}
