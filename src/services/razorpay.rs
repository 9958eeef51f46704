//! HTTP client for the Razorpay orders API.

use async_trait::async_trait;
use metrics::counter;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::{
    config::PaymentsConfig,
    errors::ServiceError,
    middleware_helpers::retry::{with_retry, RetryConfig, RetryPolicy},
    services::payments::{to_minor_units, CreateGatewayOrder, GatewayOrder, PaymentGateway},
};

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, thiserror::Error)]
enum GatewayCallError {
    #[error("transient gateway failure: {0}")]
    Transient(String),
    #[error("gateway rejected request: {0}")]
    Rejected(String),
}

/// Timeouts, connection failures, 5xx and 429 are worth another attempt.
struct TransientGatewayFailures;

impl RetryPolicy<GatewayCallError> for TransientGatewayFailures {
    fn is_retryable(&self, error: &GatewayCallError) -> bool {
        matches!(error, GatewayCallError::Transient(_))
    }
}

#[derive(Serialize)]
struct OrderRequestBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    retry: RetryConfig,
}

impl RazorpayClient {
    pub fn new(config: &PaymentsConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.gateway_timeout())
            .build()
            .map_err(|e| ServiceError::InternalError(format!("gateway client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.razorpay_base_url.trim_end_matches('/').to_string(),
            key_id: config.razorpay_key_id.clone(),
            key_secret: config.razorpay_key_secret.clone(),
            retry: RetryConfig::new(
                config.gateway_max_attempts,
                Duration::from_millis(config.gateway_initial_backoff_ms),
            ),
        })
    }

    async fn send_once(
        &self,
        body: &OrderRequestBody<'_>,
        idempotency_key: &str,
    ) -> Result<GatewayOrder, GatewayCallError> {
        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    GatewayCallError::Transient(e.to_string())
                } else {
                    GatewayCallError::Rejected(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<GatewayOrder>()
                .await
                .map_err(|e| GatewayCallError::Rejected(format!("unreadable response: {}", e)));
        }

        let detail = response.text().await.unwrap_or_default();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(GatewayCallError::Transient(format!("{}: {}", status, detail)))
        } else {
            Err(GatewayCallError::Rejected(format!("{}: {}", status, detail)))
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    #[instrument(skip(self, request), fields(receipt = %request.receipt))]
    async fn create_order(&self, request: CreateGatewayOrder) -> Result<GatewayOrder, ServiceError> {
        let body = OrderRequestBody {
            amount: to_minor_units(request.amount)?,
            currency: &request.currency,
            receipt: &request.receipt,
        };
        let body = &body;
        let key = request.idempotency_key.as_str();

        let mut attempt = 0u32;
        let result = with_retry(&self.retry, TransientGatewayFailures, move || {
            attempt += 1;
            if attempt > 1 {
                counter!("storefront.gateway.retries", 1);
            }
            self.send_once(body, key)
        })
        .await;

        match result {
            Ok(order) => {
                debug!(gateway_order_id = %order.id, "gateway order created");
                Ok(order)
            }
            Err(e) => {
                warn!(error = %e, "gateway order creation failed");
                Err(ServiceError::ExternalServiceError(e.to_string()))
            }
        }
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}
