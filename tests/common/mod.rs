#![allow(dead_code)]

use std::str::FromStr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use storefront_api::{
    auth::Claims,
    config::AppConfig,
    db,
    entities::commerce::ProductModel,
    errors::ServiceError,
    events,
    services::{
        commerce::CreateProductInput,
        payments::{sign_hex, to_minor_units, CreateGatewayOrder, GatewayOrder, PaymentGateway},
    },
    AppState,
};
use tower::ServiceExt;

pub const JWT_SECRET: &str = "integration-test-secret-with-plenty-of-bytes-0123";
pub const KEY_SECRET: &str = "rzp_test_secret_for_integration";
pub const WEBHOOK_SECRET: &str = "whsec_integration";

pub const CUSTOMER: &str = "customer-1";
pub const OTHER_CUSTOMER: &str = "customer-2";
pub const ADMIN: &str = "admin-1";

/// Gateway double that records every request and answers with a fresh order id.
#[derive(Default)]
pub struct FakeGateway {
    calls: AtomicUsize,
    pub requests: Mutex<Vec<CreateGatewayOrder>>,
}

impl FakeGateway {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        request: CreateGatewayOrder,
    ) -> Result<GatewayOrder, ServiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let amount = to_minor_units(request.amount)?;
        let order = GatewayOrder {
            id: format!("order_test_{n}"),
            amount,
            currency: request.currency.clone(),
            receipt: Some(request.receipt.clone()),
            status: "created".to_string(),
        };
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        Ok(order)
    }

    fn key_id(&self) -> &str {
        "rzp_test_key"
    }
}

/// Application over a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection keeps every query on the same in-memory database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payments.razorpay_key_id = "rzp_test_key".to_string();
        cfg.payments.razorpay_key_secret = KEY_SECRET.to_string();
        cfg.payments.razorpay_webhook_secret = Some(WEBHOOK_SECRET.to_string());
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("in-memory database");
        db::run_migrations(&pool).await.expect("migrations");

        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(FakeGateway::default());
        let state = AppState::new(
            Arc::new(pool),
            cfg,
            Arc::new(event_sender),
            gateway.clone(),
        );
        let router = storefront_api::build_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
        }
    }

    pub fn customer_token(&self) -> String {
        mint_token(CUSTOMER, &["user"])
    }

    pub fn other_customer_token(&self) -> String {
        mint_token(OTHER_CUSTOMER, &["user"])
    }

    pub fn admin_token(&self) -> String {
        mint_token(ADMIN, &["admin"])
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).expect("build request")).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_product(&self, name: &str, price: Decimal) -> ProductModel {
        self.seed_product_with_variants(name, price, &[], &[]).await
    }

    pub async fn seed_product_with_variants(
        &self,
        name: &str,
        price: Decimal,
        sizes: &[&str],
        colors: &[&str],
    ) -> ProductModel {
        self.state
            .services
            .products
            .create_product(CreateProductInput {
                name: name.to_string(),
                description: None,
                price,
                sizes: sizes.iter().map(|s| s.to_string()).collect(),
                colors: colors.iter().map(|c| c.to_string()).collect(),
                image_url: None,
                is_active: true,
            })
            .await
            .expect("seed product")
    }

    /// Adds a product to the customer's cart through the HTTP surface.
    pub async fn add_to_cart(&self, token: &str, product_id: uuid::Uuid, quantity: i32) -> Value {
        let response = self
            .request(
                Method::POST,
                "/api/cart/add",
                Some(json!({ "product_id": product_id, "quantity": quantity })),
                Some(token),
            )
            .await;
        assert_eq!(response.status(), 200, "add to cart should succeed");
        response_json(response).await
    }

    /// Runs the gateway checkout for `token` and returns the response.
    pub async fn pay_and_verify(&self, token: &str, payment_id: &str) -> Response {
        let intent = self
            .request(
                Method::POST,
                "/api/orders/create-razorpay-order",
                Some(json!({})),
                Some(token),
            )
            .await;
        assert_eq!(intent.status(), 200, "payment intent should be created");
        let intent = response_json(intent).await;
        let gateway_order_id = intent["razorpay_order"]["id"]
            .as_str()
            .expect("gateway order id")
            .to_string();

        self.verify(token, &gateway_order_id, payment_id, &signature(&gateway_order_id, payment_id))
            .await
    }

    pub async fn verify(
        &self,
        token: &str,
        gateway_order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Response {
        self.request(
            Method::POST,
            "/api/orders/verify-payment",
            Some(json!({
                "razorpay_order_id": gateway_order_id,
                "razorpay_payment_id": payment_id,
                "razorpay_signature": signature,
                "shipping_address": shipping_address(),
            })),
            Some(token),
        )
        .await
    }

    pub async fn cod_checkout(&self, token: &str) -> Response {
        self.request(
            Method::POST,
            "/api/orders/checkout",
            Some(json!({
                "payment_method": "cod",
                "shipping_address": shipping_address(),
            })),
            Some(token),
        )
        .await
    }

    pub async fn set_status(&self, order_id: &str, status: &str) -> Response {
        self.request(
            Method::PUT,
            &format!("/api/orders/{order_id}/status"),
            Some(json!({ "status": status })),
            Some(&self.admin_token()),
        )
        .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn mint_token(user_id: &str, roles: &[&str]) -> String {
    mint_token_with_permissions(user_id, roles, &[])
}

pub fn mint_token_with_permissions(user_id: &str, roles: &[&str], permissions: &[&str]) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        name: None,
        email: None,
        roles: roles.iter().map(|r| r.to_string()).collect(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        jti: Some(uuid::Uuid::new_v4().to_string()),
        iat: now,
        exp: now + 3600,
        iss: "storefront-auth".to_string(),
        aud: "storefront-api".to_string(),
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("encode token")
}

/// Checkout callback signature as the gateway would compute it
pub fn signature(gateway_order_id: &str, payment_id: &str) -> String {
    sign_hex(
        KEY_SECRET,
        format!("{}|{}", gateway_order_id, payment_id).as_bytes(),
    )
}

pub fn shipping_address() -> Value {
    json!({
        "full_name": "Asha Verma",
        "phone": "9876543210",
        "address_line1": "12 MG Road",
        "city": "Bengaluru",
        "state": "Karnataka",
        "postal_code": "560001"
    })
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Reads a decimal that the API serialized as a string or number.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}
