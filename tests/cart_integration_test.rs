//! Cart endpoints driven through the full router.

mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn missing_cart_reads_as_empty_default() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    let response = app.request(Method::GET, "/api/cart", None, Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert!(body["cart"]["id"].is_null());
    assert_eq!(body["cart"]["items"].as_array().unwrap().len(), 0);
    assert_eq!(decimal(&body["cart"]["total_amount"]), dec!(0));
}

#[tokio::test]
async fn cart_requires_a_bearer_token() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api/cart", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, "/api/cart", None, Some("not-a-jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn adding_items_accumulates_and_recomputes_total() {
    let app = TestApp::new().await;
    let token = app.customer_token();
    let tee = app.seed_product("Tee", dec!(500)).await;
    let cap = app.seed_product("Cap", dec!(300)).await;

    app.add_to_cart(&token, tee.id, 1).await;
    app.add_to_cart(&token, tee.id, 1).await;
    let body = app.add_to_cart(&token, cap.id, 1).await;

    let items = body["cart"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2, "same product and variant shares one line");
    assert_eq!(items[0]["quantity"], 2);
    assert_eq!(decimal(&items[0]["line_total"]), dec!(1000));
    assert_eq!(decimal(&body["cart"]["total_amount"]), dec!(1300));
    assert_eq!(body["cart"]["item_count"], 3);
}

#[tokio::test]
async fn variants_are_separate_lines_and_must_be_offered() {
    let app = TestApp::new().await;
    let token = app.customer_token();
    let tee = app
        .seed_product_with_variants("Tee", dec!(500), &["M", "L"], &["black"])
        .await;

    for size in ["M", "L"] {
        let response = app
            .request(
                Method::POST,
                "/api/cart/add",
                Some(json!({ "product_id": tee.id, "quantity": 1, "size": size, "color": "black" })),
                Some(&token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .request(
            Method::POST,
            "/api/cart/add",
            Some(json!({ "product_id": tee.id, "quantity": 1, "size": "XXL" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let cart = response_json(app.request(Method::GET, "/api/cart", None, Some(&token)).await).await;
    assert_eq!(cart["cart"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(decimal(&cart["cart"]["total_amount"]), dec!(1000));
}

#[tokio::test]
async fn invalid_quantity_and_unknown_product_are_rejected() {
    let app = TestApp::new().await;
    let token = app.customer_token();
    let tee = app.seed_product("Tee", dec!(500)).await;

    let response = app
        .request(
            Method::POST,
            "/api/cart/add",
            Some(json!({ "product_id": tee.id, "quantity": 0 })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/cart/add",
            Some(json!({ "product_id": Uuid::new_v4(), "quantity": 1 })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_overwrites_and_zero_removes() {
    let app = TestApp::new().await;
    let token = app.customer_token();
    let tee = app.seed_product("Tee", dec!(500)).await;
    let body = app.add_to_cart(&token, tee.id, 1).await;
    let item_id = body["cart"]["items"][0]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::PUT,
            "/api/cart/update",
            Some(json!({ "item_id": item_id, "quantity": 4 })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["cart"]["items"][0]["quantity"], 4);
    assert_eq!(decimal(&body["cart"]["total_amount"]), dec!(2000));

    let response = app
        .request(
            Method::PUT,
            "/api/cart/update",
            Some(json!({ "item_id": item_id, "quantity": 0 })),
            Some(&token),
        )
        .await;
    let body = response_json(response).await;
    assert!(body["cart"]["items"].as_array().unwrap().is_empty());
    assert_eq!(decimal(&body["cart"]["total_amount"]), dec!(0));

    let response = app
        .request(
            Method::PUT,
            "/api/cart/update",
            Some(json!({ "item_id": Uuid::new_v4(), "quantity": 1 })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn remove_and_clear() {
    let app = TestApp::new().await;
    let token = app.customer_token();
    let tee = app.seed_product("Tee", dec!(500)).await;
    let cap = app.seed_product("Cap", dec!(300)).await;
    app.add_to_cart(&token, tee.id, 2).await;
    let body = app.add_to_cart(&token, cap.id, 1).await;
    let cap_line = body["cart"]["items"][1]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/cart/remove/{cap_line}"),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(decimal(&body["cart"]["total_amount"]), dec!(1000));

    // Removing an unknown line leaves the cart as it is
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/cart/remove/{}", Uuid::new_v4()),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::DELETE, "/api/cart/clear", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert!(body["cart"]["id"].is_string(), "cart row survives clearing");
    assert!(body["cart"]["items"].as_array().unwrap().is_empty());
    assert_eq!(decimal(&body["cart"]["total_amount"]), dec!(0));
}

#[tokio::test]
async fn carts_are_isolated_per_user() {
    let app = TestApp::new().await;
    let tee = app.seed_product("Tee", dec!(500)).await;
    app.add_to_cart(&app.customer_token(), tee.id, 1).await;

    let other = response_json(
        app.request(
            Method::GET,
            "/api/cart",
            None,
            Some(&app.other_customer_token()),
        )
        .await,
    )
    .await;
    assert!(other["cart"]["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn responses_echo_request_id() {
    let app = TestApp::new().await;
    let token = app.customer_token();
    let request = axum::http::Request::builder()
        .method(Method::GET)
        .uri("/api/cart")
        .header("authorization", format!("Bearer {token}"))
        .header("x-request-id", "req-cart-1")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-cart-1"
    );
}

#[tokio::test]
async fn concurrent_adds_on_one_cart_lose_no_quantity() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("carts.db").display());
    let app = TestApp::with_config(|cfg| {
        cfg.database_url = url;
        cfg.db_max_connections = 4;
    })
    .await;
    let token = app.customer_token();
    let tee = app.seed_product("Tee", dec!(500)).await;

    let (app_ref, token_ref, product_id) = (&app, token.as_str(), tee.id);
    let add = move |quantity: i32| {
        app_ref.request(
            Method::POST,
            "/api/cart/add",
            Some(json!({ "product_id": product_id, "quantity": quantity })),
            Some(token_ref),
        )
    };
    let (a, b, c, d) = tokio::join!(add(1), add(2), add(3), add(4));

    let mut accepted = 0;
    for (quantity, response) in [(1, a), (2, b), (3, c), (4, d)] {
        match response.status() {
            StatusCode::OK => accepted += quantity,
            StatusCode::CONFLICT => {
                let body = response_json(response).await;
                assert_eq!(body["success"], false);
            }
            other => panic!("unexpected status {other} for quantity {quantity}"),
        }
    }
    assert!(accepted > 0, "at least one add must win");

    let cart = response_json(app.request(Method::GET, "/api/cart", None, Some(&token)).await).await;
    let items = cart["cart"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], accepted);
    assert_eq!(
        decimal(&cart["cart"]["total_amount"]),
        dec!(500) * rust_decimal::Decimal::from(accepted)
    );
}
