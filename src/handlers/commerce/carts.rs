use crate::auth::consts as perm;
use crate::auth::{AuthRouterExt, AuthUser};
use crate::handlers::common::{map_service_error, message_response, success_response, validate_input};
use crate::{
    errors::ApiError,
    services::commerce::{AddToCartInput, CartView},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for the caller's cart
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/add", post(add_item))
        .route("/update", put(update_item))
        .route("/remove/:item_id", delete(remove_item))
        .route("/clear", delete(clear_cart))
        .with_permission(perm::CART_MANAGE)
}

/// Fetch the current cart. A user without a cart gets an empty one.
#[utoipa::path(
    get,
    path = "/api/cart",
    responses(
        (status = 200, description = "Cart retrieved", body = CartEnvelope),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ApiError> {
    let cart = state
        .services
        .cart
        .get_cart(&user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(CartEnvelope { cart }))
}

/// Add a product to the cart
#[utoipa::path(
    post,
    path = "/api/cart/add",
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Item added", body = CartEnvelope),
        (status = 400, description = "Invalid quantity or variant", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Cart modified concurrently", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddItemRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;

    let input = AddToCartInput {
        product_id: payload.product_id,
        quantity: payload.quantity,
        size: non_blank(payload.size),
        color: non_blank(payload.color),
    };

    let cart = state
        .services
        .cart
        .add_item(&user.user_id, input)
        .await
        .map_err(map_service_error)?;

    Ok(message_response(CartEnvelope { cart }, "Item added to cart"))
}

/// Set a line's quantity. Zero or less removes the line.
#[utoipa::path(
    put,
    path = "/api/cart/update",
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Cart updated", body = CartEnvelope),
        (status = 404, description = "Cart or item not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<Response, ApiError> {
    let cart = state
        .services
        .cart
        .update_item_quantity(&user.user_id, payload.item_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(message_response(CartEnvelope { cart }, "Cart updated"))
}

/// Remove a line from the cart
#[utoipa::path(
    delete,
    path = "/api/cart/remove/{item_id}",
    params(("item_id" = Uuid, Path, description = "Cart line id")),
    responses(
        (status = 200, description = "Item removed", body = CartEnvelope),
    ),
    security(("bearer_auth" = [])),
    tag = "cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let cart = state
        .services
        .cart
        .remove_item(&user.user_id, item_id)
        .await
        .map_err(map_service_error)?;

    Ok(message_response(CartEnvelope { cart }, "Item removed from cart"))
}

/// Remove every line from the cart
#[utoipa::path(
    delete,
    path = "/api/cart/clear",
    responses(
        (status = 200, description = "Cart cleared", body = CartEnvelope),
    ),
    security(("bearer_auth" = [])),
    tag = "cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ApiError> {
    let cart = state
        .services
        .cart
        .clear_cart(&user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(message_response(CartEnvelope { cart }, "Cart cleared"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Request DTOs

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
    #[validate(length(max = 50))]
    pub size: Option<String>,
    #[validate(length(max = 50))]
    pub color: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateItemRequest {
    pub item_id: Uuid,
    /// Zero or negative removes the line
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartEnvelope {
    pub cart: CartView,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_must_be_positive() {
        let request = AddItemRequest {
            product_id: Uuid::new_v4(),
            quantity: 0,
            size: None,
            color: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn blank_variants_are_dropped() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(Some(" M ".into())).as_deref(), Some("M"));
    }
}
