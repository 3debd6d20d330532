//! Mock HTTP server setup for integration tests

use mockito::{Matcher, Mock, Server, ServerGuard};
use std::sync::Arc;
use std::time::Duration;
use storefront_client::cache::{CacheConfig, QueryCache};
use storefront_client::client::{CatalogClient, CatalogClientBuilder, GatewayConfig};
use storefront_client::facade::Catalog;
use storefront_client::resilience::{FaultInjector, RetryProfile};
use tokio::sync::Mutex;

/// Transport retries with millisecond delays so tests stay fast on real I/O.
pub fn fast_transport(max_retries: u32) -> RetryProfile {
    RetryProfile::transport()
        .with_base_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(20))
        .with_max_retries(max_retries)
}

/// Query-level profile with the production retry budget and short delays.
pub fn fast_query() -> RetryProfile {
    RetryProfile::query()
        .with_base_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(40))
}

pub fn product_json(id: i64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "title": format!("Product {}", id),
        "price": 10.0 + id as f64,
        "description": "A product served by the mock catalog",
        "category": "electronics",
        "image": format!("https://fakestoreapi.com/img/{}.jpg", id),
        "rating": { "rate": 4.1, "count": 120 }
    })
}

pub fn products_json(ids: &[i64]) -> String {
    serde_json::Value::Array(ids.iter().map(|id| product_json(*id)).collect()).to_string()
}

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: Arc<Mutex<ServerGuard>>,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self {
            server: Arc::new(Mutex::new(server)),
            base_url,
        }
    }

    /// Client pointed at the mock server, sharing `faults`.
    pub fn create_test_client(&self, faults: Arc<FaultInjector>, max_retries: u32) -> CatalogClient {
        CatalogClientBuilder::with_config(GatewayConfig::default())
            .base_url_override(&self.base_url)
            .timeout(Duration::from_secs(5))
            .retry_profile(fast_transport(max_retries))
            .fault_injector(faults)
            .build()
            .expect("mock client builds")
    }

    /// Catalog over a test client and a cache with fast query retries.
    pub fn create_test_catalog(&self, faults: Arc<FaultInjector>) -> Catalog {
        let client = self.create_test_client(faults, 0);
        let cache = QueryCache::new(CacheConfig::new().with_retry(fast_query()));
        Catalog::new(Arc::new(client), cache)
            .with_mutation_retry(fast_query().with_max_retries(2))
    }

    /// Create a mock for a JSON response
    pub async fn mock_json_response(&self, method: &str, path: &str, status: u16, body: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock(method, path)
            .match_query(Matcher::Any)
            .with_status(status as usize)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    /// Create a mock for a JSON response that must be requested exactly `hits` times
    pub async fn mock_json_expect(
        &self,
        method: &str,
        path: &str,
        status: u16,
        body: &str,
        hits: usize,
    ) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock(method, path)
            .match_query(Matcher::Any)
            .with_status(status as usize)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    /// `GET /products?limit=n`
    pub async fn mock_product_list(&self, limit: u32, ids: &[i64], hits: usize) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("GET", "/products")
            .match_query(Matcher::UrlEncoded("limit".into(), limit.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(products_json(ids))
            .expect(hits)
            .create_async()
            .await
    }

    /// Create a mock for an error response
    pub async fn mock_error_response(&self, path: &str, status: u16, hits: usize) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("GET", path)
            .match_query(Matcher::Any)
            .with_status(status as usize)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"mock failure"}"#)
            .expect(hits)
            .create_async()
            .await
    }
}
