//! 传输层模块：单次 HTTP 请求执行。
//!
//! Transport layer: one reqwest call per attempt, nothing more.

pub mod http;

pub use http::HttpTransport;
