//! 目录客户端模块：弹性 HTTP 网关及其构建器。
//!
//! # Catalog Client Module
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CatalogClient`] | Gateway: fault consultation, classification, validation, transport retry |
//! | [`CatalogClientBuilder`] | Env-backed configuration with explicit overrides |
//! | [`ProductApi`] | Typed product endpoints |
//! | [`error_classification`] | Raw failure shapes and the `classify` rules |
//! | [`validation`] | One structural validator per response shape |

pub mod builder;
pub mod core;
pub mod error_classification;
pub mod products;
pub mod validation;

pub use builder::{CatalogClientBuilder, GatewayConfig};
pub use self::core::CatalogClient;
pub use error_classification::{classify, RawFailure};
pub use products::ProductApi;
pub use validation::ResponseShape;
