//! 核心类型定义模块：目录商品及其输入结构。
//!
//! # Core Types Module
//!
//! | Type | Description |
//! |------|-------------|
//! | [`product::Product`] | Product as served by the catalog |
//! | [`product::CreateProduct`] | Validated body for creating a product |
//! | [`product::UpdateProduct`] | Partial body for editing a product |
//! | [`product::ProductPatch`] | Partial product echoed by update/delete |

pub mod product;

pub use product::{
    fallback_products, CreateProduct, Product, ProductPatch, Rating, UpdateProduct,
    PRODUCT_CATEGORIES,
};
