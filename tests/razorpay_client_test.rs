//! Razorpay HTTP client against a mock gateway.

use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::{
    config::PaymentsConfig,
    errors::ServiceError,
    services::{
        payments::{CreateGatewayOrder, PaymentGateway},
        razorpay::{RazorpayClient, IDEMPOTENCY_KEY_HEADER},
    },
};
use wiremock::{
    matchers::{basic_auth, body_json, header_exists, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn client(server: &MockServer) -> RazorpayClient {
    let config = PaymentsConfig {
        razorpay_key_id: "rzp_test_key".to_string(),
        razorpay_key_secret: "rzp_test_secret".to_string(),
        razorpay_base_url: server.uri(),
        gateway_max_attempts: 3,
        gateway_initial_backoff_ms: 1,
        ..PaymentsConfig::default()
    };
    RazorpayClient::new(&config).unwrap()
}

fn request() -> CreateGatewayOrder {
    CreateGatewayOrder {
        amount: dec!(1300),
        currency: "INR".to_string(),
        receipt: "rcpt_1".to_string(),
        idempotency_key: "idem-123".to_string(),
    }
}

fn gateway_order() -> serde_json::Value {
    json!({
        "id": "order_Mock123",
        "entity": "order",
        "amount": 130000,
        "currency": "INR",
        "receipt": "rcpt_1",
        "status": "created"
    })
}

#[tokio::test]
async fn creates_order_in_minor_units_with_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .and(basic_auth("rzp_test_key", "rzp_test_secret"))
        .and(header_exists(IDEMPOTENCY_KEY_HEADER))
        .and(body_json(json!({
            "amount": 130000,
            "currency": "INR",
            "receipt": "rcpt_1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(gateway_order()))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = client(&server);
    let order = gateway.create_order(request()).await.unwrap();
    assert_eq!(order.id, "order_Mock123");
    assert_eq!(order.amount, 130_000);
    assert_eq!(gateway.key_id(), "rzp_test_key");
}

#[tokio::test]
async fn server_errors_are_retried_with_the_same_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gateway_order()))
        .mount(&server)
        .await;

    let order = client(&server).create_order(request()).await.unwrap();
    assert_eq!(order.id, "order_Mock123");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 3);
    for req in &received {
        assert_eq!(
            req.headers.get(IDEMPOTENCY_KEY_HEADER).unwrap(),
            "idem-123"
        );
    }
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": "BAD_REQUEST_ERROR", "description": "amount too small" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).create_order(request()).await.unwrap_err();
    assert!(matches!(err, ServiceError::ExternalServiceError(_)), "{err:?}");
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server).create_order(request()).await.unwrap_err();
    assert!(matches!(err, ServiceError::ExternalServiceError(_)));
}

#[tokio::test]
async fn zero_amount_never_reaches_the_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gateway_order()))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server)
        .create_order(CreateGatewayOrder {
            amount: dec!(0),
            ..request()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}
