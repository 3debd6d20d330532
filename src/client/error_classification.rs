//! Error classification logic

use crate::error_code::{ErrorKind, ErrorRecord};

/// A raw failure as observed at the transport boundary, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFailure {
    /// No response was received.
    NoResponse { timed_out: bool, detail: String },
    /// A response arrived with a non-success status.
    Status(u16),
    /// A success response whose payload is null or absent.
    EmptyPayload,
    /// A success response whose payload has the wrong shape.
    InvalidPayload { detail: String },
}

impl RawFailure {
    /// Map a reqwest error onto the raw failure shapes.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return RawFailure::NoResponse {
                timed_out: true,
                detail: err.to_string(),
            };
        }
        if let Some(status) = err.status() {
            return RawFailure::Status(status.as_u16());
        }
        if err.is_decode() {
            return RawFailure::InvalidPayload {
                detail: err.to_string(),
            };
        }
        RawFailure::NoResponse {
            timed_out: false,
            detail: err.to_string(),
        }
    }
}

/// Classify a raw failure. First matching rule wins; the function is pure.
pub fn classify(failure: &RawFailure) -> ErrorRecord {
    match failure {
        RawFailure::NoResponse { timed_out: true, .. } => {
            ErrorRecord::new(ErrorKind::Timeout).with_status(408)
        }
        RawFailure::NoResponse { .. } => ErrorRecord::new(ErrorKind::Network),
        RawFailure::Status(status) => match ErrorKind::from_http_status(*status) {
            // a literal 408 response is not a deadline; only the rule above yields Timeout
            ErrorKind::Unknown => ErrorRecord::new(ErrorKind::Unknown)
                .with_message(format!(
                    "Unexpected error (status {}). Please try again.",
                    status
                ))
                .with_status(*status),
            kind => ErrorRecord::new(kind).with_status(*status),
        },
        RawFailure::EmptyPayload => ErrorRecord::new(ErrorKind::EmptyResponse),
        RawFailure::InvalidPayload { .. } => ErrorRecord::new(ErrorKind::InvalidResponse),
    }
}
