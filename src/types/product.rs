//! Catalog product types.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};

/// Categories accepted when creating or editing a product.
pub const PRODUCT_CATEGORIES: [&str; 4] = [
    "electronics",
    "jewelery",
    "men's clothing",
    "women's clothing",
];

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rating {
    pub rate: f64,
    pub count: u64,
}

/// A product as served by the remote catalog.
///
/// Freshly created products come back without a rating, so it defaults to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub title: String,
    pub price: f64,
    pub description: String,
    pub category: String,
    pub image: String,
    #[serde(default)]
    pub rating: Rating,
}

/// Partial product echoed by update and delete calls.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
}

impl Product {
    /// Field-wise merge: every field present in `patch` overrides this product.
    pub fn merged_with(&self, patch: &ProductPatch) -> Product {
        Product {
            id: self.id,
            title: patch.title.clone().unwrap_or_else(|| self.title.clone()),
            price: patch.price.unwrap_or(self.price),
            description: patch
                .description
                .clone()
                .unwrap_or_else(|| self.description.clone()),
            category: patch.category.clone().unwrap_or_else(|| self.category.clone()),
            image: patch.image.clone().unwrap_or_else(|| self.image.clone()),
            rating: patch.rating.unwrap_or(self.rating),
        }
    }
}

impl ProductPatch {
    /// Fields of `top` win; gaps are filled from `self`.
    pub fn overlay(self, top: &ProductPatch) -> ProductPatch {
        ProductPatch {
            id: top.id.or(self.id),
            title: top.title.clone().or(self.title),
            price: top.price.or(self.price),
            description: top.description.clone().or(self.description),
            category: top.category.clone().or(self.category),
            image: top.image.clone().or(self.image),
            rating: top.rating.or(self.rating),
        }
    }

    /// A full product, when every required field is present.
    pub fn into_product(self, id: i64) -> Option<Product> {
        Some(Product {
            id: self.id.unwrap_or(id),
            title: self.title?,
            price: self.price?,
            description: self.description?,
            category: self.category?,
            image: self.image?,
            rating: self.rating.unwrap_or_default(),
        })
    }
}

/// Body of `POST /products`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub title: String,
    pub price: f64,
    pub description: String,
    pub category: String,
    pub image: String,
}

/// Body of `PUT /products/{id}`; only present fields are sent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdateProduct {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl From<UpdateProduct> for ProductPatch {
    fn from(u: UpdateProduct) -> Self {
        ProductPatch {
            id: None,
            title: u.title,
            price: u.price,
            description: u.description,
            category: u.category,
            image: u.image,
            rating: None,
        }
    }
}

fn invalid(field: &str, msg: impl Into<String>) -> Error {
    Error::validation_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(format!("product.{}", field))
            .with_source("product_validator"),
    )
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let n = value.chars().count();
    if n < min {
        return Err(invalid(
            field,
            format!("{} must be at least {} characters", field, min),
        ));
    }
    if n > max {
        return Err(invalid(
            field,
            format!("{} cannot exceed {} characters", field, max),
        ));
    }
    Ok(())
}

fn check_price(price: f64) -> Result<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(invalid("price", "price must be greater than 0"));
    }
    if price > 99_999.0 {
        return Err(invalid("price", "price cannot exceed 99,999"));
    }
    Ok(())
}

fn check_category(category: &str) -> Result<()> {
    if PRODUCT_CATEGORIES.contains(&category) {
        Ok(())
    } else {
        Err(invalid("category", "select a valid category"))
    }
}

fn check_image(image: &str) -> Result<()> {
    match url::Url::parse(image) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.has_host() => Ok(()),
        _ => Err(invalid("image", "enter a valid URL for the image")),
    }
}

impl CreateProduct {
    pub fn validate(&self) -> Result<()> {
        check_len("title", &self.title, 3, 100)?;
        check_price(self.price)?;
        check_len("description", &self.description, 10, 1000)?;
        check_category(&self.category)?;
        check_image(&self.image)
    }
}

impl UpdateProduct {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref t) = self.title {
            check_len("title", t, 3, 100)?;
        }
        if let Some(p) = self.price {
            check_price(p)?;
        }
        if let Some(ref d) = self.description {
            check_len("description", d, 10, 1000)?;
        }
        if let Some(ref c) = self.category {
            check_category(c)?;
        }
        if let Some(ref i) = self.image {
            check_image(i)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == UpdateProduct::default()
    }
}

/// Placeholder products shown while the catalog cannot be reached.
///
/// Ids are negative so they never collide with real products.
pub fn fallback_products() -> Vec<Product> {
    fn demo(id: i64, title: &str, price: f64, category: &str, image: &str, rate: f64, count: u64) -> Product {
        Product {
            id,
            title: title.to_string(),
            price,
            description: format!("{} shown while the connection to the server is restored.", title),
            category: category.to_string(),
            image: format!("https://via.placeholder.com/300x300?text={}", image),
            rating: Rating { rate, count },
        }
    }
    vec![
        demo(-1, "Sample product", 99.99, "demo", "Demo+Product", 4.5, 100),
        demo(-2, "Premium T-Shirt", 29.99, "clothing", "T-Shirt", 4.2, 85),
        demo(-3, "Wireless Headphones", 149.99, "electronics", "Headphones", 4.7, 230),
        demo(-4, "Smart Watch", 199.99, "electronics", "Smart+Watch", 4.4, 150),
    ]
}
