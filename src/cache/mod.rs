//! 查询缓存模块：对服务端状态进行去重请求、过期重取和乐观更新。
//!
//! # Query Cache Module
//!
//! Keeps server state in memory, keyed by [`Fingerprint`], so that views
//! reading the same resource share one fetch and one copy of the data.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`QueryCache`] | Entry store: reads, invalidation, optimistic writes, polling |
//! | [`CacheConfig`] | Stale time, garbage-collection time, retry profile, refetch triggers |
//! | [`QueryState`] | Snapshot handed to readers and observers |
//! | [`QueryObserver`] | Live subscription that keeps an entry alive |
//! | [`Fingerprint`] | Order-independent request identity |
//! | [`ProductKeys`] | Key hierarchy for product queries |
//!
//! ## Example
//!
//! ```rust,no_run
//! use storefront_client::cache::{ProductKeys, QueryCache};
//! use storefront_client::client::{CatalogClient, ProductApi};
//! use std::sync::Arc;
//!
//! # async fn run() -> storefront_client::Result<()> {
//! let api = Arc::new(CatalogClient::new()?);
//! let cache = QueryCache::default();
//!
//! let key = ProductKeys::list(Some(5));
//! let state = cache
//!     .read(&key, move || {
//!         let api = Arc::clone(&api);
//!         async move { api.products(Some(5)).await }
//!     })
//!     .await;
//! if let Some(products) = state.data {
//!     println!("{} products", products.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Entry lifecycle
//!
//! `Idle → Pending → Success | Error`. Data survives failed refetches, so an
//! entry in `Error` may still carry the last good payload. Unobserved entries
//! are evicted once `gc_time` passes without a reader.

mod entry;
mod key;
mod manager;

pub use entry::{QueryState, QueryStatus};
pub use key::{Fingerprint, ProductKeys, QueryFilter};
pub use manager::{
    CacheConfig, CacheStats, OptimisticSnapshot, PollHandle, QueryCache, QueryObserver,
    ReadOptions, DEFAULT_GC_TIME, DEFAULT_STALE_TIME,
};
