use crate::auth::consts as perm;
use crate::auth::{AuthRouterExt, AuthUser};
use crate::entities::{OrderStatus, PaymentMethod};
use crate::handlers::common::{
    created_response, map_service_error, message_response, success_response, validate_input,
    PaginationMeta, PaginationParams,
};
use crate::{
    errors::ApiError,
    services::{
        commerce::{PaymentIntent, PaymentIntentInput, VerifyPaymentInput},
        orders::{OrderFilter, OrderView, ShippingAddress, TrackingView, UpdateStatusInput},
    },
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Creates the router for order endpoints. The gateway webhook is mounted
/// separately because it carries no bearer token.
pub fn orders_routes() -> Router<AppState> {
    let staff = Router::new()
        .route("/all", get(list_all_orders))
        .route("/:id/status", put(update_order_status))
        .with_permission(perm::ORDERS_MANAGE);

    Router::new()
        .route("/create-razorpay-order", post(create_razorpay_order))
        .route("/verify-payment", post(verify_payment))
        .route("/checkout", post(checkout))
        .route("/my-orders", get(list_my_orders))
        .route("/track/:order_number", get(track_order))
        .route("/:id", get(get_order))
        .route("/:id/cancel", put(cancel_order))
        .with_permission(perm::ORDERS_OWN)
        .merge(staff)
}

/// Open a gateway order for the current cart total
#[utoipa::path(
    post,
    path = "/api/orders/create-razorpay-order",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 200, description = "Gateway order created", body = PaymentIntent),
        (status = 400, description = "Empty cart or amount mismatch", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn create_razorpay_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePaymentIntentRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;

    let intent = state
        .services
        .checkout
        .create_payment_intent(
            &user.user_id,
            PaymentIntentInput {
                amount: payload.amount,
                currency: payload.currency,
                receipt: payload.receipt,
            },
        )
        .await
        .map_err(map_service_error)?;

    Ok(success_response(intent))
}

/// Verify the gateway signature and turn the cart into an order
#[utoipa::path(
    post,
    path = "/api/orders/verify-payment",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 201, description = "Payment verified and order created", body = OrderEnvelope),
        (status = 400, description = "Signature mismatch or empty cart", body = crate::errors::ErrorResponse),
        (status = 403, description = "Payment belongs to another account", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;

    let order = state
        .services
        .checkout
        .verify_payment(
            &user.user_id,
            VerifyPaymentInput {
                gateway_order_id: payload.razorpay_order_id,
                gateway_payment_id: payload.razorpay_payment_id,
                signature: payload.razorpay_signature,
                shipping_address: payload.shipping_address,
            },
        )
        .await
        .map_err(map_service_error)?;

    Ok(created_response(
        OrderEnvelope { order },
        "Payment verified and order placed",
    ))
}

/// Cash on delivery checkout
#[utoipa::path(
    post,
    path = "/api/orders/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed", body = OrderEnvelope),
        (status = 400, description = "Empty cart or unsupported payment method", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;

    let order = state
        .services
        .checkout
        .checkout(
            &user.user_id,
            payload.payment_method,
            &payload.shipping_address,
        )
        .await
        .map_err(map_service_error)?;

    Ok(created_response(OrderEnvelope { order }, "Order placed"))
}

/// The caller's orders, newest first
#[utoipa::path(
    get,
    path = "/api/orders/my-orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders retrieved", body = OrderListResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<Response, ApiError> {
    let (page, limit) = params.resolve(&state.config);
    let (orders, total) = state
        .services
        .orders
        .list_my_orders(&user.user_id, page, limit)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(OrderListResponse {
        orders,
        pagination: PaginationMeta::new(page, limit, total),
    }))
}

/// Status history and delivery estimate by order number
#[utoipa::path(
    get,
    path = "/api/orders/track/{order_number}",
    params(("order_number" = String, Path, description = "Public order number")),
    responses(
        (status = 200, description = "Tracking retrieved", body = TrackingEnvelope),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn track_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_number): Path<String>,
) -> Result<Response, ApiError> {
    let tracking = state
        .services
        .orders
        .track_order(order_number.trim(), &user.as_actor())
        .await
        .map_err(map_service_error)?;

    Ok(success_response(TrackingEnvelope { tracking }))
}

/// Order detail with status history
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order retrieved", body = OrderEnvelope),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let order = state
        .services
        .orders
        .get_order(id, &user.as_actor())
        .await
        .map_err(map_service_error)?;

    Ok(success_response(OrderEnvelope { order }))
}

/// Cancel an order
#[utoipa::path(
    put,
    path = "/api/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled", body = OrderEnvelope),
        (status = 400, description = "Order can no longer be cancelled", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelOrderRequest>>,
) -> Result<Response, ApiError> {
    let reason = match payload {
        Some(Json(body)) => {
            validate_input(&body)?;
            body.reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
        }
        None => None,
    };

    let order = state
        .services
        .orders
        .cancel_order(id, &user.as_actor(), reason)
        .await
        .map_err(map_service_error)?;

    Ok(message_response(OrderEnvelope { order }, "Order cancelled"))
}

/// Staff listing with filters
#[utoipa::path(
    get,
    path = "/api/orders/all",
    params(PaginationParams, OrderFilterParams),
    responses(
        (status = 200, description = "Orders retrieved", body = OrderListResponse),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
    Query(filter): Query<OrderFilterParams>,
) -> Result<Response, ApiError> {
    let (page, limit) = params.resolve(&state.config);
    let filter = filter.into_filter()?;

    let (orders, total) = state
        .services
        .orders
        .list_orders(filter, page, limit)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(OrderListResponse {
        orders,
        pagination: PaginationMeta::new(page, limit, total),
    }))
}

/// Drive the order status machine
#[utoipa::path(
    put,
    path = "/api/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = OrderEnvelope),
        (status = 400, description = "Invalid transition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;

    let input = UpdateStatusInput {
        status: payload.status,
        note: payload.note,
        carrier: payload.carrier,
        tracking_number: payload.tracking_number,
        tracking_url: payload.tracking_url,
        estimated_delivery: payload.estimated_delivery,
        cancellation_reason: payload.cancellation_reason,
    };

    let order = state
        .services
        .orders
        .update_status(id, &user.as_actor(), input)
        .await
        .map_err(map_service_error)?;

    Ok(message_response(
        OrderEnvelope { order },
        "Order status updated",
    ))
}

// Request DTOs

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CreatePaymentIntentRequest {
    /// Must equal the cart total when supplied
    pub amount: Option<Decimal>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[validate(length(max = 40))]
    pub receipt: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, max = 64))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, max = 64))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, max = 256))]
    pub razorpay_signature: String,
    #[validate]
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
    #[validate]
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CancelOrderRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    #[validate(length(max = 500))]
    pub note: Option<String>,
    #[validate(length(max = 100))]
    pub carrier: Option<String>,
    #[validate(length(max = 100))]
    pub tracking_number: Option<String>,
    #[validate(url)]
    pub tracking_url: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    #[validate(length(max = 500))]
    pub cancellation_reason: Option<String>,
}

/// Filters for the staff listing. Dates accept RFC 3339 or `YYYY-MM-DD`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderFilterParams {
    pub status: Option<String>,
    pub user_id: Option<String>,
    /// Order number substring
    pub search: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl OrderFilterParams {
    fn into_filter(self) -> Result<OrderFilter, ApiError> {
        let status = match non_blank(self.status) {
            Some(raw) => Some(OrderStatus::from_str(&raw.to_lowercase()).map_err(|_| {
                ApiError::BadRequest(format!("Unknown order status '{}'", raw))
            })?),
            None => None,
        };

        Ok(OrderFilter {
            status,
            user_id: non_blank(self.user_id),
            search: non_blank(self.search),
            from: parse_bound(self.from, NaiveTime::MIN)?,
            to: parse_bound(self.to, end_of_day())?,
        })
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bound(value: Option<String>, time: NaiveTime) -> Result<Option<DateTime<Utc>>, ApiError> {
    let Some(raw) = non_blank(value) else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map(|date| Some(date.and_time(time).and_utc()))
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{}'", raw)))
}

// Response DTOs

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderEnvelope {
    pub order: OrderView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderView>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrackingEnvelope {
    pub tracking: TrackingView,
}
