//! 弹性模式模块：故障注入与重试退避策略。
//!
//! # Resilience Primitives Module
//!
//! This module holds the two building blocks the gateway and the query cache
//! share for surviving an unreliable remote service.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`fault_injector`] | Deterministic "fail the next N requests" switch |
//! | [`retry`] | Exponential backoff profiles and the retry driver |
//!
//! ## Fault Injection
//!
//! ```rust
//! use storefront_client::resilience::fault_injector::{FaultInjector, FaultKind};
//!
//! let injector = FaultInjector::new();
//! injector.arm(FaultKind::ServerError500, 2);
//! assert_eq!(injector.consume(), Some(FaultKind::ServerError500));
//! assert_eq!(injector.consume(), Some(FaultKind::ServerError500));
//! assert_eq!(injector.consume(), None);
//! ```
//!
//! ## Backoff
//!
//! ```rust
//! use storefront_client::resilience::retry::RetryProfile;
//! use std::time::Duration;
//!
//! let profile = RetryProfile::transport();
//! assert_eq!(profile.next_delay(0), Duration::from_secs(1));
//! assert_eq!(profile.next_delay(3), Duration::from_secs(8));
//! assert_eq!(profile.next_delay(9), Duration::from_secs(8));
//! ```

pub mod fault_injector;
pub mod retry;

pub use fault_injector::{
    shared_injector, FaultInjector, FaultKind, FaultSnapshot, Subscription, DEFAULT_FAULT_COUNT,
};
pub use retry::{retry_with, Decision, ManualRetry, RetryProfile};
