use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront API

Carts, gateway checkout, order tracking and settlement for a single storefront.

## Authentication

Every `/api` endpoint except the gateway webhook requires an HS256 bearer token:

```
Authorization: Bearer <your-jwt-token>
```

Staff endpoints additionally require the `orders:manage` or `products:manage`
permission, granted to the `admin` and `marketer` roles.

## Envelope

Successful responses carry `success: true` next to the payload:

```json
{ "success": true, "message": "Order placed", "order": { "order_number": "ORD-20240301-7KQ2M9XA" } }
```

Errors use a single shape:

```json
{
  "success": false,
  "error": "Bad Request",
  "message": "Cart is empty",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 10, max 100)
and return a `pagination` object with `page`, `limit`, `total` and `total_pages`.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "products", description = "Catalog endpoints"),
        (name = "cart", description = "Shopping cart endpoints"),
        (name = "orders", description = "Checkout, tracking and order management"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::health::health_check,

        crate::handlers::commerce::products::list_products,
        crate::handlers::commerce::products::get_product,
        crate::handlers::commerce::products::create_product,
        crate::handlers::commerce::products::update_product,

        crate::handlers::commerce::carts::get_cart,
        crate::handlers::commerce::carts::add_item,
        crate::handlers::commerce::carts::update_item,
        crate::handlers::commerce::carts::remove_item,
        crate::handlers::commerce::carts::clear_cart,

        crate::handlers::orders::create_razorpay_order,
        crate::handlers::orders::verify_payment,
        crate::handlers::orders::checkout,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::track_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::list_all_orders,
        crate::handlers::orders::update_order_status,

        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::handlers::common::PaginationMeta,
            crate::handlers::health::HealthResponse,

            crate::entities::OrderStatus,
            crate::entities::PaymentMethod,
            crate::entities::PaymentStatus,
            crate::entities::RefundStatus,

            crate::handlers::commerce::products::ProductResponse,
            crate::handlers::commerce::products::CreateProductRequest,
            crate::handlers::commerce::products::UpdateProductRequest,

            crate::handlers::commerce::carts::AddItemRequest,
            crate::handlers::commerce::carts::UpdateItemRequest,
            crate::services::commerce::CartView,

            crate::handlers::orders::CreatePaymentIntentRequest,
            crate::handlers::orders::VerifyPaymentRequest,
            crate::handlers::orders::CheckoutRequest,
            crate::handlers::orders::CancelOrderRequest,
            crate::handlers::orders::UpdateStatusRequest,
            crate::services::orders::ShippingAddress,
            crate::services::orders::OrderView,
            crate::services::orders::TrackingView,
            crate::services::commerce::PaymentIntent,
            crate::services::payments::GatewayOrder,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url(OPENAPI_JSON_PATH, ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from(OPENAPI_JSON_PATH).try_it_out_enabled(true))
}
