//! Minimal prelude for application code.
//!
//! Goal: reduce import noise without hiding important concepts.

pub use crate::cache::{ProductKeys, QueryCache, QueryObserver, QueryState, QueryStatus};
pub use crate::client::{CatalogClient, CatalogClientBuilder, ProductApi};
pub use crate::error_code::{ApiResult, ErrorKind, ErrorRecord};
pub use crate::facade::catalog::{Catalog, FallbackProducts};
pub use crate::resilience::{shared_injector, FaultInjector, FaultKind, RetryProfile};
pub use crate::types::{CreateProduct, Product, ProductPatch, UpdateProduct};
pub use crate::{Error, Result};
