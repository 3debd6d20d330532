//! Gateway behavior against a mock catalog: classification, transport
//! retries, shape validation and fault injection.

use crate::mock_server::{product_json, products_json, MockServerFixture};
use mockito::Matcher;
use std::sync::{Arc, Mutex};
use storefront_client::client::{CatalogClientBuilder, GatewayConfig, ProductApi};
use std::time::Duration;
use storefront_client::resilience::{FaultInjector, FaultKind, FaultSnapshot, RetryProfile};
use storefront_client::types::{CreateProduct, UpdateProduct};
use storefront_client::ErrorKind;

#[tokio::test]
async fn test_list_with_limit_decodes_products() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture.mock_product_list(5, &[1, 2], 1).await;
    let client = fixture.create_test_client(Arc::new(FaultInjector::new()), 3);

    let products = client.products(Some(5)).await.unwrap();
    assert_eq!(products.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(products[0].rating.count, 120);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_not_found_is_classified_and_not_retried() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture.mock_error_response("/products/999", 404, 1).await;
    let client = fixture.create_test_client(Arc::new(FaultInjector::new()), 3);

    let err = client.product(999).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.http_status, Some(404));
    assert!(!err.retryable);
    assert_eq!(err.message, "The requested resource was not found.");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_error_is_retried_until_budget_is_spent() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture.mock_error_response("/products/1", 500, 4).await;
    let client = fixture.create_test_client(Arc::new(FaultInjector::new()), 3);

    let err = client.product(1).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServerError);
    assert_eq!(err.http_status, Some(500));
    assert!(err.retryable);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unmapped_status_reads_as_unknown() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture.mock_error_response("/products/1", 418, 1).await;
    let client = fixture.create_test_client(Arc::new(FaultInjector::new()), 0);

    let err = client.product(1).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unknown);
    assert_eq!(err.http_status, Some(418));
    assert!(err.message.contains("418"));
}

#[tokio::test]
async fn test_empty_and_malformed_payloads() {
    let fixture = MockServerFixture::new().await;
    let _empty = fixture.mock_json_expect("GET", "/products/1", 200, "", 2).await;
    let _wrong = fixture
        .mock_json_expect("GET", "/products", 200, r#"{"products": []}"#, 2)
        .await;
    let client = fixture.create_test_client(Arc::new(FaultInjector::new()), 1);

    let err = client.product(1).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::EmptyResponse);
    assert!(err.retryable);

    let err = client.products(None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidResponse);
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_error() {
    let client = CatalogClientBuilder::with_config(GatewayConfig::default())
        .base_url_override("http://127.0.0.1:9")
        .retry_profile(crate::mock_server::fast_transport(1))
        .build()
        .unwrap();

    let err = client.categories().await.unwrap_err();
    assert!(
        matches!(err.kind, ErrorKind::Network | ErrorKind::Timeout),
        "unexpected kind {:?}",
        err.kind
    );
    assert!(err.retryable);
}

#[tokio::test]
async fn test_silent_server_times_out_as_408() {
    // accepts connections and never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let silent = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let client = CatalogClientBuilder::with_config(GatewayConfig::default())
        .base_url_override(format!("http://{}", addr))
        .timeout(Duration::from_millis(200))
        .retry_profile(RetryProfile::none())
        .build()
        .unwrap();

    let err = client.product(1).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(err.http_status, Some(408));
    assert!(err.retryable);
    silent.abort();
}

#[tokio::test]
async fn test_requests_carry_a_request_id() {
    let fixture = MockServerFixture::new().await;
    let mock = {
        let mut server = fixture.server.lock().await;
        server
            .mock("GET", "/products/categories")
            .match_header("x-request-id", Matcher::Regex("^[0-9a-f-]{36}$".into()))
            .with_status(200)
            .with_body(r#"["electronics","jewelery"]"#)
            .create_async()
            .await
    };
    let client = fixture.create_test_client(Arc::new(FaultInjector::new()), 0);

    let categories = client.categories().await.unwrap();
    assert_eq!(categories, vec!["electronics", "jewelery"]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_category_is_path_encoded() {
    let fixture = MockServerFixture::new().await;
    let mock = {
        let mut server = fixture.server.lock().await;
        server
            .mock("GET", Matcher::Regex(r"^/products/category/men%27s%20clothing$".into()))
            .with_status(200)
            .with_body(products_json(&[3]))
            .create_async()
            .await
    };
    let client = fixture.create_test_client(Arc::new(FaultInjector::new()), 0);

    let products = client.products_in_category("men's clothing").await.unwrap();
    assert_eq!(products.len(), 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_mutations_send_json_bodies() {
    let fixture = MockServerFixture::new().await;
    let create = {
        let mut server = fixture.server.lock().await;
        server
            .mock("POST", "/products")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "title": "Desk lamp",
                "category": "electronics"
            })))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "id": 21,
                    "title": "Desk lamp",
                    "price": 24.5,
                    "description": "A small lamp for the desk",
                    "category": "electronics",
                    "image": "https://example.com/lamp.png"
                })
                .to_string(),
            )
            .create_async()
            .await
    };
    let update = {
        let mut server = fixture.server.lock().await;
        server
            .mock("PUT", "/products/7")
            .match_body(Matcher::Json(serde_json::json!({ "price": 5.0 })))
            .with_status(200)
            .with_body(r#"{"id":7,"price":5.0}"#)
            .create_async()
            .await
    };
    let client = fixture.create_test_client(Arc::new(FaultInjector::new()), 0);

    let created = client
        .create_product(&CreateProduct {
            title: "Desk lamp".into(),
            price: 24.5,
            description: "A small lamp for the desk".into(),
            category: "electronics".into(),
            image: "https://example.com/lamp.png".into(),
        })
        .await
        .unwrap();
    assert_eq!(created.id, 21);
    assert_eq!(created.rating.count, 0);

    let patch = client
        .update_product(7, &UpdateProduct {
            price: Some(5.0),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(patch.id, Some(7));
    assert_eq!(patch.title, None);

    create.assert_async().await;
    update.assert_async().await;
}

#[tokio::test]
async fn test_injected_faults_skip_the_network() {
    let fixture = MockServerFixture::new().await;
    let body = product_json(1).to_string();
    let mock = fixture.mock_json_expect("GET", "/products/1", 200, &body, 1).await;
    let faults = Arc::new(FaultInjector::new());
    let client = fixture.create_test_client(Arc::clone(&faults), 3);

    faults.arm(FaultKind::Timeout, 1);
    let err = client.product(1).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(err.http_status, Some(408));
    assert!(!faults.is_armed());

    let product = client.product(1).await.unwrap();
    assert_eq!(product.id, 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_every_fault_kind_maps_to_its_error_kind() {
    let faults = Arc::new(FaultInjector::new());
    let client = CatalogClientBuilder::with_config(GatewayConfig::default())
        .base_url_override("http://127.0.0.1:9")
        .fault_injector(Arc::clone(&faults))
        .build()
        .unwrap();

    let expected = [
        (FaultKind::ServerError500, ErrorKind::ServerError, Some(500)),
        (FaultKind::NotFound404, ErrorKind::NotFound, Some(404)),
        (FaultKind::Timeout, ErrorKind::Timeout, Some(408)),
        (FaultKind::NetworkDown, ErrorKind::Network, None),
        (FaultKind::EmptyResponse, ErrorKind::EmptyResponse, None),
        (FaultKind::InvalidPayload, ErrorKind::InvalidResponse, None),
    ];
    for (fault, kind, status) in expected {
        faults.arm(fault, 1);
        let err = client.categories().await.unwrap_err();
        assert_eq!((err.kind, err.http_status), (kind, status), "fault {}", fault);
    }
}

#[tokio::test]
async fn test_subscribers_see_countdown_and_auto_clear() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_json_response("GET", "/products/categories", 200, r#"["electronics"]"#)
        .await;
    let faults = Arc::new(FaultInjector::new());
    let client = fixture.create_test_client(Arc::clone(&faults), 0);

    let seen: Arc<Mutex<Vec<FaultSnapshot>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = faults.subscribe(move |s| sink.lock().unwrap().push(*s));

    faults.arm(FaultKind::ServerError500, 2);
    assert!(client.categories().await.is_err());
    assert!(client.categories().await.is_err());
    assert!(client.categories().await.is_ok());

    // arm and auto-clear notify; individual decrements do not
    let remaining: Vec<u32> = seen.lock().unwrap().iter().map(|s| s.remaining).collect();
    assert_eq!(remaining, vec![2, 0]);
    assert_eq!(seen.lock().unwrap().last().and_then(|s| s.active), None);

    drop(subscription);
    faults.arm(FaultKind::NotFound404, 1);
    assert_eq!(seen.lock().unwrap().len(), 2);
}
