//! Storefront API Library
//!
//! Carts, gateway-backed checkout, order lifecycle tracking and settlement
//! behind an axum HTTP surface.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{http::HeaderValue, Extension, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowHeaders, AllowMethods, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
};

use crate::handlers::{
    commerce::{carts_routes, products_routes},
    health::health_routes,
    orders::orders_routes,
    payment_webhooks::payment_webhook_routes,
    AppServices,
};
use crate::services::payments::PaymentGateway;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: AppServices,
    pub auth: Arc<auth::AuthService>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Arc<events::EventSender>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let services = AppServices::new(db.clone(), event_sender.clone(), gateway, &config);
        let auth = Arc::new(auth::AuthService::new(auth::AuthConfig::new(
            config.jwt_secret.clone(),
            config.auth_audience.clone(),
            config.auth_issuer.clone(),
        )));

        Self {
            db,
            config,
            event_sender,
            services,
            auth,
        }
    }
}

/// Success envelope: `{ "success": true, "message"?: ..., ...payload }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;
    use serde_json::json;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success(json!({ "cart": null }))
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn payload_is_flattened_next_to_success_flag() {
        let body = serde_json::to_value(
            ApiResponse::success(json!({ "order": { "id": 1 } })).with_message("Order placed"),
        )
        .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Order placed");
        assert_eq!(body["order"]["id"], 1);
        assert!(body.get("data").is_none());
    }
}

/// Routes mounted under `/api`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/products", products_routes())
        .nest("/cart", carts_routes())
        .nest("/orders", orders_routes().merge(payment_webhook_routes()))
}

/// Full application router with the HTTP middleware stack.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let timeout = state.config.request_timeout();
    let body_limit = state.config.max_body_size;
    let auth = state.auth.clone();

    Router::new()
        .merge(health_routes())
        .nest("/api", api_routes())
        .merge(openapi::swagger_ui())
        .layer(Extension(auth))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    match cfg.cors_origins() {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect();
            let layer = CorsLayer::new().allow_origin(origins);
            if cfg.cors_allow_credentials {
                // Wildcards are not allowed together with credentials
                layer
                    .allow_methods(AllowMethods::mirror_request())
                    .allow_headers(AllowHeaders::mirror_request())
                    .allow_credentials(true)
            } else {
                layer.allow_methods(Any).allow_headers(Any)
            }
        }
        None if cfg.is_development() => CorsLayer::permissive(),
        // Same-origin only
        None => CorsLayer::new(),
    }
}
