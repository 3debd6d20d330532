//! End-to-end recovery scenarios: catalog facade, query cache, gateway and
//! fault injector working together against a mock catalog.

use crate::mock_server::{product_json, products_json, MockServerFixture};
use std::sync::Arc;
use storefront_client::cache::{ProductKeys, QueryStatus};
use storefront_client::resilience::{FaultInjector, FaultKind};
use storefront_client::ErrorKind;

#[tokio::test]
async fn test_not_found_fault_is_final_after_one_attempt() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_json_expect("GET", "/products/1", 200, &product_json(1).to_string(), 0)
        .await;
    let faults = Arc::new(FaultInjector::new());
    let catalog = fixture.create_test_catalog(Arc::clone(&faults));

    faults.arm(FaultKind::NotFound404, 3);
    let state = catalog.product(1).await;

    assert_eq!(state.status, QueryStatus::Error);
    assert!(state.is_error_without_data());
    let err = state.error.unwrap();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(!err.retryable);
    assert_eq!(faults.state().remaining, 2);
    assert_eq!(faults.state().active, Some(FaultKind::NotFound404));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_errors_recover_with_real_data() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_json_expect("GET", "/products/1", 200, &product_json(1).to_string(), 1)
        .await;
    let faults = Arc::new(FaultInjector::new());
    let catalog = fixture.create_test_catalog(Arc::clone(&faults));

    faults.arm(FaultKind::ServerError500, 3);
    let state = catalog.product(1).await;

    assert!(state.is_success());
    assert_eq!(state.data.map(|p| p.id), Some(1));
    assert_eq!(state.failure_count, 0);
    assert!(!faults.is_armed());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_refetch_failure_keeps_stale_data() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture.mock_product_list(5, &[1, 2, 3], 1).await;
    let faults = Arc::new(FaultInjector::new());
    let catalog = fixture.create_test_catalog(Arc::clone(&faults));

    let first = catalog.products(Some(5)).await;
    assert!(first.is_success());

    faults.arm(FaultKind::NetworkDown, 10);
    assert_eq!(catalog.refetch_lists(), 1);
    let state = catalog.products(Some(5)).await;

    assert!(state.has_stale_data_with_error());
    assert_eq!(state.data.map(|v| v.len()), Some(3));
    assert_eq!(state.error.map(|e| e.kind), Some(ErrorKind::Network));
    assert_eq!(state.failure_count, 4);
    assert_eq!(faults.state().remaining, 6);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fallback_products_when_nothing_cached() {
    let fixture = MockServerFixture::new().await;
    let faults = Arc::new(FaultInjector::new());
    let catalog = fixture.create_test_catalog(Arc::clone(&faults));

    faults.arm(FaultKind::InvalidPayload, 10);
    let out = catalog.products_or_fallback(Some(3)).await;

    assert!(out.using_fallback);
    assert_eq!(out.state.data.map(|v| v.len()), Some(3));
    assert_eq!(
        out.state.error.map(|e| e.kind),
        Some(ErrorKind::InvalidResponse)
    );
}

#[tokio::test]
async fn test_concurrent_readers_issue_one_request() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_json_expect("GET", "/products", 200, &products_json(&[1, 2]), 1)
        .await;
    let catalog = fixture.create_test_catalog(Arc::new(FaultInjector::new()));

    let (a, b, c) = tokio::join!(
        catalog.products(None),
        catalog.products(None),
        catalog.products(None)
    );
    for state in [a, b, c] {
        assert_eq!(state.data.map(|v| v.len()), Some(2));
    }
    assert_eq!(catalog.cache().stats().deduplicated, 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_delete_twice_leaves_lists_consistent() {
    let fixture = MockServerFixture::new().await;
    let _list = fixture.mock_product_list(5, &[1, 2, 3], 1).await;
    let delete = fixture
        .mock_json_expect("DELETE", "/products/2", 200, &product_json(2).to_string(), 2)
        .await;
    let catalog = fixture.create_test_catalog(Arc::new(FaultInjector::new()));

    catalog.products(Some(5)).await;
    catalog.delete_product(2).await.unwrap();
    catalog.delete_product(2).await.unwrap();

    let ids: Vec<i64> = catalog
        .cache()
        .get_query_data::<Vec<storefront_client::Product>>(&ProductKeys::list(Some(5)))
        .unwrap_or_default()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(ids, vec![1, 3]);
    delete.assert_async().await;
}

#[tokio::test]
async fn test_failed_mutation_surfaces_classified_error() {
    let fixture = MockServerFixture::new().await;
    let faults = Arc::new(FaultInjector::new());
    let catalog = fixture.create_test_catalog(Arc::clone(&faults));

    faults.arm(FaultKind::ServerError500, 5);
    let err = catalog.delete_product(4).await.unwrap_err();

    assert_eq!(err.api_record().map(|r| r.kind), Some(ErrorKind::ServerError));
    // one attempt plus two mutation retries
    assert_eq!(faults.state().remaining, 2);
}
