//! Application-facing facade (optional).
//!
//! The gateway and the cache stay usable on their own. [`catalog::Catalog`]
//! wires them together with the product key hierarchy and the mutation
//! reconciliation rules, so application code deals with one type.

pub mod catalog;
pub mod prelude;

pub use catalog::{Catalog, FallbackProducts, CATEGORY_STALE_TIME};
