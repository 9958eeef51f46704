use crate::{
    errors::{ApiError, ServiceError},
    events::Event,
    handlers::common::{map_service_error, success_response},
    services::payments::verify_webhook_signature,
    AppState,
};
use axum::{
    extract::State,
    http::HeaderMap,
    response::Response,
    routing::post,
    Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Webhook route; authenticated by body signature rather than a bearer token
pub fn payment_webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(payment_webhook))
}

/// Subset of the gateway webhook envelope this service reacts to
#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    payment: Option<PaymentWrapper>,
}

#[derive(Debug, Deserialize)]
struct PaymentWrapper {
    entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: Option<String>,
    order_id: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub event: String,
    /// Whether an order was updated
    pub processed: bool,
}

// POST /api/orders/webhook
#[utoipa::path(
    post,
    path = "/api/orders/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook acknowledged", body = WebhookAck),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 503, description = "Webhook secret not configured", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let secret = state
        .config
        .payments
        .razorpay_webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ServiceError::ServiceUnavailable("Payment webhooks are not configured".to_string())
        })?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("Missing webhook signature".to_string()))?;

    if !verify_webhook_signature(secret, &body, signature) {
        warn!("Payment webhook signature verification failed");
        return Err(ServiceError::Unauthorized("Invalid webhook signature".to_string()).into());
    }

    let envelope: WebhookEnvelope = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid webhook payload: {}", e)))?;
    let entity = envelope.payload.payment.map(|p| p.entity);

    let processed = match (envelope.event.as_str(), entity) {
        ("payment.captured", Some(entity)) => match entity.order_id.as_deref() {
            Some(gateway_order_id) => {
                let updated = state
                    .services
                    .orders
                    .mark_payment_captured(gateway_order_id, entity.id.as_deref())
                    .await
                    .map_err(map_service_error)?;
                if updated.is_none() {
                    info!(gateway_order_id, "Captured payment references no known order");
                }
                updated.is_some()
            }
            None => false,
        },
        ("payment.failed", Some(entity)) => {
            warn!(
                gateway_order_id = ?entity.order_id,
                gateway_payment_id = ?entity.id,
                reason = ?entity.error_description,
                "Gateway reported a failed payment"
            );
            state
                .event_sender
                .send_or_log(Event::PaymentFailed {
                    gateway_order_id: entity.order_id.unwrap_or_default(),
                    gateway_payment_id: entity.id,
                    reason: entity.error_description,
                })
                .await;
            false
        }
        (event, _) => {
            info!(event, "Ignoring payment webhook");
            false
        }
    };

    Ok(success_response(WebhookAck {
        event: envelope.event,
        processed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gateway_envelope() {
        let body = br#"{
            "entity": "event",
            "event": "payment.captured",
            "payload": {"payment": {"entity": {"id": "pay_1", "order_id": "order_1", "amount": 130000}}}
        }"#;
        let envelope: WebhookEnvelope = serde_json::from_slice(body).unwrap();
        assert_eq!(envelope.event, "payment.captured");
        let entity = envelope.payload.payment.unwrap().entity;
        assert_eq!(entity.order_id.as_deref(), Some("order_1"));
        assert_eq!(entity.id.as_deref(), Some("pay_1"));
    }

    #[test]
    fn tolerates_events_without_payment() {
        let envelope: WebhookEnvelope =
            serde_json::from_slice(br#"{"event": "order.paid"}"#).unwrap();
        assert!(envelope.payload.payment.is_none());
    }
}
