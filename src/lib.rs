//! # storefront-client
//!
//! 容错的商品目录客户端：分类错误、可注入故障、指数退避重试和带去重的查询缓存。
//!
//! Resilient client for a remote product catalog: classified errors,
//! injectable faults, exponential-backoff retries and a de-duplicating query
//! cache with optimistic updates.
//!
//! ## Overview
//!
//! Every failure that leaves the gateway is an [`ErrorRecord`] with a closed
//! [`ErrorKind`], an optional HTTP status and a retryability flag. Retries
//! happen at two layers: the gateway retries real transport failures, and
//! the cache retries whole reads with its own profile. A process-wide
//! [`FaultInjector`] lets a developer make the next N requests fail with a
//! chosen kind to exercise the recovery paths.
//!
//! ## Key Features
//!
//! - **Gateway**: [`CatalogClient`] issues one request per attempt and validates response shapes
//! - **Error taxonomy**: [`error_code`] maps statuses and transport failures to kinds and messages
//! - **Fault injection**: [`resilience::FaultInjector`] arms countdown faults and notifies subscribers
//! - **Retry**: [`resilience::RetryProfile`] computes capped exponential delays
//! - **Query cache**: [`cache::QueryCache`] shares in-flight fetches, keeps stale data on error and evicts idle entries
//! - **Catalog**: [`facade::Catalog`] wires the cache to the product endpoints
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use storefront_client::facade::Catalog;
//! use storefront_client::CatalogClient;
//!
//! #[tokio::main]
//! async fn main() -> storefront_client::Result<()> {
//!     let catalog = Catalog::from_client(CatalogClient::new()?);
//!
//!     let state = catalog.products(Some(5)).await;
//!     match (&state.data, &state.error) {
//!         (Some(products), _) => println!("{} products", products.len()),
//!         (None, Some(err)) => eprintln!("{}", err),
//!         _ => {}
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Catalog gateway, builder, failure classification, response validation |
//! | [`transport`] | Single HTTP attempt over reqwest |
//! | [`error_code`] | Error kinds and the classified error record |
//! | [`resilience`] | Fault injection and retry scheduling |
//! | [`cache`] | Query cache, fingerprints and product keys |
//! | [`facade`] | Catalog facade and prelude |
//! | [`types`] | Product types and input validation |

pub mod cache;
pub mod client;
pub mod error_code;
pub mod facade;
pub mod resilience;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{CatalogClient, CatalogClientBuilder, GatewayConfig, ProductApi};
pub use error_code::{ApiResult, ErrorKind, ErrorRecord};
pub use resilience::{shared_injector, FaultInjector, FaultKind};
pub use types::{CreateProduct, Product, ProductPatch, UpdateProduct};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
