//! Tests for error classification logic

use storefront_client::client::{classify, RawFailure};
use storefront_client::{ErrorKind, ErrorRecord};

#[test]
fn test_status_table() {
    let cases = [
        (400, ErrorKind::BadRequest, false),
        (401, ErrorKind::Unauthorized, false),
        (403, ErrorKind::Forbidden, false),
        (404, ErrorKind::NotFound, false),
        (429, ErrorKind::TooManyRequests, true),
        (500, ErrorKind::ServerError, true),
        (502, ErrorKind::BadGateway, true),
        (503, ErrorKind::ServiceUnavailable, true),
        (504, ErrorKind::GatewayTimeout, true),
    ];

    for (status, kind, retryable) in cases {
        let rec = classify(&RawFailure::Status(status));
        assert_eq!(rec.kind, kind, "status {}", status);
        assert_eq!(rec.http_status, Some(status));
        assert_eq!(rec.retryable, retryable, "status {}", status);
        assert_eq!(rec.message, kind.default_message());
    }
}

#[test]
fn test_statuses_outside_the_table_are_unknown() {
    for status in [302, 408, 418, 451, 599] {
        let rec = classify(&RawFailure::Status(status));
        assert_eq!(rec.kind, ErrorKind::Unknown, "status {}", status);
        assert!(rec.retryable);
        assert!(rec.message.contains(&status.to_string()));
    }
}

#[test]
fn test_only_client_errors_are_final() {
    let final_kinds: Vec<ErrorKind> = ErrorKind::ALL
        .into_iter()
        .filter(|k| !k.retryable())
        .collect();
    assert_eq!(
        final_kinds,
        vec![
            ErrorKind::BadRequest,
            ErrorKind::Unauthorized,
            ErrorKind::Forbidden,
            ErrorKind::NotFound
        ]
    );
}

#[test]
fn test_codes_are_unique_and_stable() {
    let mut codes: Vec<&str> = ErrorKind::ALL.iter().map(|k| k.code()).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), ErrorKind::ALL.len());
    assert_eq!(ErrorKind::Network.code(), "NETWORK_ERROR");
    assert_eq!(ErrorKind::Unknown.code(), "UNKNOWN_ERROR");
}

#[test]
fn test_payload_failures() {
    assert_eq!(classify(&RawFailure::EmptyPayload).kind, ErrorKind::EmptyResponse);
    let rec = classify(&RawFailure::InvalidPayload {
        detail: "expected array".into(),
    });
    assert_eq!(rec.kind, ErrorKind::InvalidResponse);
    assert_eq!(rec.http_status, None);
    assert!(rec.retryable);
}

#[test]
fn test_record_round_trips_through_json() {
    let rec = ErrorRecord::new(ErrorKind::GatewayTimeout).with_status(504);
    let json = serde_json::to_string(&rec).unwrap();
    let back: ErrorRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, rec);
    assert_eq!(rec.to_string(), format!("{} [GATEWAY_TIMEOUT]", rec.message));
}
