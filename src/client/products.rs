//! 商品端点：FakeStore 目录的类型化 REST 调用。
//!
//! Typed product endpoints.

use super::core::CatalogClient;
use crate::error_code::ApiResult;
use crate::types::{CreateProduct, Product, ProductPatch, UpdateProduct};
use async_trait::async_trait;
use reqwest::Method;

/// The product operations the catalog facade depends on.
///
/// [`CatalogClient`] is the production implementation.
#[async_trait]
pub trait ProductApi: Send + Sync {
    /// `GET /products[?limit=n]`
    async fn products(&self, limit: Option<u32>) -> ApiResult<Vec<Product>>;
    /// `GET /products/{id}`
    async fn product(&self, id: i64) -> ApiResult<Product>;
    /// `GET /products/category/{category}`
    async fn products_in_category(&self, category: &str) -> ApiResult<Vec<Product>>;
    /// `GET /products/categories`
    async fn categories(&self) -> ApiResult<Vec<String>>;
    /// `POST /products`
    async fn create_product(&self, input: &CreateProduct) -> ApiResult<Product>;
    /// `PUT /products/{id}`
    async fn update_product(&self, id: i64, input: &UpdateProduct) -> ApiResult<ProductPatch>;
    /// `DELETE /products/{id}`
    async fn delete_product(&self, id: i64) -> ApiResult<ProductPatch>;
}

fn encode_segment(segment: &str) -> String {
    // form encoding turns spaces into '+' and escapes a literal '+' as %2B
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// A zero limit means no limit.
fn list_path(limit: Option<u32>) -> String {
    match limit.filter(|n| *n > 0) {
        Some(n) => format!("/products?limit={}", n),
        None => "/products".to_string(),
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> ApiResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| {
        crate::error_code::ErrorRecord::new(crate::error_code::ErrorKind::BadRequest)
            .with_message(format!("request body could not be encoded: {}", e))
    })
}

#[async_trait]
impl ProductApi for CatalogClient {
    async fn products(&self, limit: Option<u32>) -> ApiResult<Vec<Product>> {
        self.request(Method::GET, &list_path(limit), None).await
    }

    async fn product(&self, id: i64) -> ApiResult<Product> {
        self.request(Method::GET, &format!("/products/{}", id), None)
            .await
    }

    async fn products_in_category(&self, category: &str) -> ApiResult<Vec<Product>> {
        let path = format!("/products/category/{}", encode_segment(category));
        self.request(Method::GET, &path, None).await
    }

    async fn categories(&self) -> ApiResult<Vec<String>> {
        self.request(Method::GET, "/products/categories", None).await
    }

    async fn create_product(&self, input: &CreateProduct) -> ApiResult<Product> {
        let body = to_body(input)?;
        self.request(Method::POST, "/products", Some(body)).await
    }

    async fn update_product(&self, id: i64, input: &UpdateProduct) -> ApiResult<ProductPatch> {
        let body = to_body(input)?;
        self.request(Method::PUT, &format!("/products/{}", id), Some(body))
            .await
    }

    async fn delete_product(&self, id: i64) -> ApiResult<ProductPatch> {
        self.request(Method::DELETE, &format!("/products/{}", id), None)
            .await
    }
}
