//! 错误分类码：定义目录 API 的封闭错误分类及其重试语义。
//!
//! Closed error taxonomy for the catalog API.
//!
//! Every failure observed by the gateway, whether it came from the network or
//! from the fault injector, is normalized into exactly one [`ErrorRecord`]
//! carrying an [`ErrorKind`].
//!
//! ## Kind Categories
//!
//! | Category    | Kinds                                                        | Retryable |
//! |-------------|--------------------------------------------------------------|-----------|
//! | transport   | `Network`, `Timeout`                                         | yes       |
//! | client      | `BadRequest`, `Unauthorized`, `Forbidden`, `NotFound`        | no        |
//! | rate        | `TooManyRequests`                                            | yes       |
//! | server      | `ServerError`, `BadGateway`, `ServiceUnavailable`, `GatewayTimeout` | yes |
//! | payload     | `EmptyResponse`, `InvalidResponse`                           | yes       |
//! | unknown     | `Unknown`                                                    | yes       |
//!
//! ## Example
//!
//! ```rust
//! use storefront_client::error_code::ErrorKind;
//!
//! let kind = ErrorKind::from_http_status(503);
//! assert_eq!(kind, ErrorKind::ServiceUnavailable);
//! assert!(kind.retryable());
//! assert_eq!(kind.code(), "SERVICE_UNAVAILABLE");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Semantic kind of a catalog API failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No response was received (connection refused, DNS, reset).
    Network,
    /// No response was received before the request deadline.
    Timeout,
    /// HTTP 400
    BadRequest,
    /// HTTP 401
    Unauthorized,
    /// HTTP 403
    Forbidden,
    /// HTTP 404
    NotFound,
    /// HTTP 429
    TooManyRequests,
    /// HTTP 500
    ServerError,
    /// HTTP 502
    BadGateway,
    /// HTTP 503
    ServiceUnavailable,
    /// HTTP 504
    GatewayTimeout,
    /// 2xx with a null or absent payload
    EmptyResponse,
    /// 2xx with a payload that fails structural validation
    InvalidResponse,
    /// Anything the rules above do not cover
    Unknown,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [ErrorKind; 14] = [
        Self::Network,
        Self::Timeout,
        Self::BadRequest,
        Self::Unauthorized,
        Self::Forbidden,
        Self::NotFound,
        Self::TooManyRequests,
        Self::ServerError,
        Self::BadGateway,
        Self::ServiceUnavailable,
        Self::GatewayTimeout,
        Self::EmptyResponse,
        Self::InvalidResponse,
        Self::Unknown,
    ];

    /// Returns the stable machine code (e.g., `"NOT_FOUND"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::ServerError => "SERVER_ERROR",
            Self::BadGateway => "BAD_GATEWAY",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::GatewayTimeout => "GATEWAY_TIMEOUT",
            Self::EmptyResponse => "EMPTY_RESPONSE",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Returns whether this kind is retryable by default.
    #[inline]
    pub fn retryable(&self) -> bool {
        !matches!(
            self,
            Self::BadRequest | Self::Unauthorized | Self::Forbidden | Self::NotFound
        )
    }

    /// Returns the category: `"transport"`, `"client"`, `"rate"`, `"server"`, `"payload"` or `"unknown"`.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Network | Self::Timeout => "transport",
            Self::BadRequest | Self::Unauthorized | Self::Forbidden | Self::NotFound => "client",
            Self::TooManyRequests => "rate",
            Self::ServerError
            | Self::BadGateway
            | Self::ServiceUnavailable
            | Self::GatewayTimeout => "server",
            Self::EmptyResponse | Self::InvalidResponse => "payload",
            Self::Unknown => "unknown",
        }
    }

    /// The fixed user-facing message for this kind.
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::Network => "Could not reach the server. Check your internet connection.",
            Self::Timeout => {
                "The connection took too long. Check your internet connection and try again."
            }
            Self::BadRequest => "The submitted data is not valid. Please review the form.",
            Self::Unauthorized => "You are not authorized to perform this action.",
            Self::Forbidden => "You do not have permission to access this resource.",
            Self::NotFound => "The requested resource was not found.",
            Self::TooManyRequests => "Too many requests. Please wait a moment before trying again.",
            Self::ServerError => "Internal server error. The team has been notified.",
            Self::BadGateway => "The server is temporarily unavailable. Try again in a few minutes.",
            Self::ServiceUnavailable => "The service is unavailable. Please try again later.",
            Self::GatewayTimeout => "The server took too long to respond. Try again.",
            Self::EmptyResponse => "The server returned an empty response.",
            Self::InvalidResponse => "The server returned incomplete or invalid data.",
            Self::Unknown => "Unexpected error. Please try again.",
        }
    }

    /// Maps an HTTP status code to its kind.
    ///
    /// Statuses without a dedicated kind (including 2xx) return `ErrorKind::Unknown`.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::TooManyRequests,
            500 => Self::ServerError,
            502 => Self::BadGateway,
            503 => Self::ServiceUnavailable,
            504 => Self::GatewayTimeout,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A classified failure. Constructed once per observed failure and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} [{kind}]")]
pub struct ErrorRecord {
    pub message: String,
    pub kind: ErrorKind,
    pub http_status: Option<u16>,
    pub retryable: bool,
}

impl ErrorRecord {
    /// Record for `kind` with its default message and retryability.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            message: kind.default_message().to_string(),
            kind,
            http_status: None,
            retryable: kind.retryable(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Record used when a fetch is abandoned before it could settle.
    pub(crate) fn cancelled() -> Self {
        Self::new(ErrorKind::Unknown).with_message("The request was cancelled before it completed.")
    }

    #[inline]
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

/// Result type returned by the gateway: every failure is an [`ErrorRecord`].
pub type ApiResult<T> = std::result::Result<T, ErrorRecord>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_kinds_are_not_retryable() {
        for kind in [
            ErrorKind::BadRequest,
            ErrorKind::Unauthorized,
            ErrorKind::Forbidden,
            ErrorKind::NotFound,
        ] {
            assert!(!kind.retryable(), "{kind} should not be retryable");
            assert_eq!(kind.category(), "client");
        }
    }

    #[test]
    fn test_every_other_kind_is_retryable() {
        let retryable: Vec<_> = ErrorKind::ALL.iter().filter(|k| k.retryable()).collect();
        assert_eq!(retryable.len(), 10);
        assert!(ErrorKind::TooManyRequests.retryable());
        assert!(ErrorKind::Unknown.retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorKind::from_http_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_http_status(429), ErrorKind::TooManyRequests);
        assert_eq!(ErrorKind::from_http_status(502), ErrorKind::BadGateway);
        assert_eq!(ErrorKind::from_http_status(418), ErrorKind::Unknown);
    }

    #[test]
    fn test_record_defaults_follow_kind() {
        let rec = ErrorRecord::new(ErrorKind::GatewayTimeout).with_status(504);
        assert!(rec.retryable);
        assert_eq!(rec.http_status, Some(504));
        assert_eq!(rec.code(), "GATEWAY_TIMEOUT");
        assert!(rec.to_string().contains("GATEWAY_TIMEOUT"));
    }
}
