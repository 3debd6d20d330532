//! 响应结构校验：在数据进入缓存前逐形状验证 API 响应。
//!
//! Response shape validation.
//!
//! Every endpoint declares the shape it expects; the body is checked
//! structurally before it is decoded, and nothing reaches a caller (or the
//! cache) unless it passes.

use super::error_classification::RawFailure;
use crate::types::{Product, ProductPatch};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// A structural validator for one expected response shape.
pub trait ResponseShape: DeserializeOwned + Send + 'static {
    /// Human-readable name, used in logs.
    const SHAPE: &'static str;

    /// Structural check on the raw JSON. `Err` carries what was wrong.
    fn check(value: &Value) -> Result<(), String>;
}

fn check_product_fields(obj: &Map<String, Value>) -> Result<(), String> {
    if !obj.get("id").map(Value::is_number).unwrap_or(false) {
        return Err("product.id must be a number".into());
    }
    match obj.get("price").and_then(Value::as_f64) {
        Some(price) if price >= 0.0 => {}
        Some(_) => return Err("product.price must not be negative".into()),
        None => return Err("product.price must be a number".into()),
    }
    for field in ["title", "description", "category", "image"] {
        if !obj.get(field).map(Value::is_string).unwrap_or(false) {
            return Err(format!("product.{} must be a string", field));
        }
    }
    if let Some(rating) = obj.get("rating") {
        let r = rating.as_object().ok_or("product.rating must be an object")?;
        match r.get("rate").and_then(Value::as_f64) {
            Some(rate) if (0.0..=5.0).contains(&rate) => {}
            Some(_) => return Err("product.rating.rate must be between 0 and 5".into()),
            None => return Err("product.rating.rate must be a number".into()),
        }
        // as_u64 rejects negative and fractional counts
        if r.get("count").and_then(Value::as_u64).is_none() {
            return Err("product.rating.count must be a non-negative integer".into());
        }
    }
    Ok(())
}

impl ResponseShape for Product {
    const SHAPE: &'static str = "product";

    fn check(value: &Value) -> Result<(), String> {
        let obj = value.as_object().ok_or("expected a product object")?;
        check_product_fields(obj)
    }
}

impl ResponseShape for Vec<Product> {
    const SHAPE: &'static str = "product list";

    fn check(value: &Value) -> Result<(), String> {
        let items = value.as_array().ok_or("expected an array of products")?;
        for (i, item) in items.iter().enumerate() {
            let obj = item
                .as_object()
                .ok_or_else(|| format!("item {} is not an object", i))?;
            check_product_fields(obj).map_err(|e| format!("item {}: {}", i, e))?;
        }
        Ok(())
    }
}

impl ResponseShape for Vec<String> {
    const SHAPE: &'static str = "category list";

    fn check(value: &Value) -> Result<(), String> {
        let items = value.as_array().ok_or("expected an array of strings")?;
        if items.iter().all(Value::is_string) {
            Ok(())
        } else {
            Err("every category must be a string".into())
        }
    }
}

impl ResponseShape for ProductPatch {
    const SHAPE: &'static str = "product echo";

    fn check(value: &Value) -> Result<(), String> {
        value
            .as_object()
            .map(|_| ())
            .ok_or_else(|| "expected an object".to_string())
    }
}

impl ResponseShape for Value {
    const SHAPE: &'static str = "any";

    fn check(_: &Value) -> Result<(), String> {
        Ok(())
    }
}

/// Parse, check and decode a response body.
///
/// An absent body or JSON `null` is an empty payload; anything that does not
/// parse, fails the structural check or fails to decode is an invalid payload.
pub fn validate_body<T: ResponseShape>(body: &[u8]) -> Result<T, RawFailure> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(RawFailure::EmptyPayload);
    }
    let value: Value = serde_json::from_slice(body).map_err(|e| RawFailure::InvalidPayload {
        detail: e.to_string(),
    })?;
    validate_value(value)
}

pub fn validate_value<T: ResponseShape>(value: Value) -> Result<T, RawFailure> {
    if value.is_null() {
        return Err(RawFailure::EmptyPayload);
    }
    T::check(&value).map_err(|detail| RawFailure::InvalidPayload { detail })?;
    serde_json::from_value(value).map_err(|e| RawFailure::InvalidPayload {
        detail: e.to_string(),
    })
}
