use crate::auth::consts as perm;
use crate::auth::AuthRouterExt;
use crate::entities::commerce::ProductModel;
use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input, PaginationMeta,
    PaginationParams,
};
use crate::{
    errors::ApiError,
    services::commerce::{CreateProductInput, UpdateProductInput},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_price(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("price_must_be_positive"));
    }
    Ok(())
}

fn normalize_options(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Creates the router for product endpoints
pub fn products_routes() -> Router<AppState> {
    let staff = Router::new()
        .route("/", post(create_product))
        .route("/:id", axum::routing::put(update_product))
        .with_permission(perm::PRODUCTS_MANAGE);

    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
        .with_permission(perm::PRODUCTS_READ)
        .merge(staff)
}

/// List active products
#[utoipa::path(
    get,
    path = "/api/products",
    params(PaginationParams),
    responses(
        (status = 200, description = "Products retrieved", body = ProductListResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Response, ApiError> {
    let (page, limit) = params.resolve(&state.config);
    let (products, total) = state
        .services
        .products
        .list_products(page, limit)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductListResponse {
        products: products.into_iter().map(ProductResponse::from).collect(),
        pagination: PaginationMeta::new(page, limit, total),
    }))
}

/// Get a product by id
#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product retrieved", body = ProductEnvelope),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    user: crate::auth::AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let product = state
        .services
        .products
        .get_product(id, user.has_permission(perm::PRODUCTS_MANAGE))
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductEnvelope {
        product: product.into(),
    }))
}

/// Create a product
#[utoipa::path(
    post,
    path = "/api/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductEnvelope),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;

    let input = CreateProductInput {
        name: payload.name.trim().to_string(),
        description: normalize_optional_string(payload.description),
        price: payload.price,
        sizes: normalize_options(payload.sizes),
        colors: normalize_options(payload.colors),
        image_url: normalize_optional_string(payload.image_url),
        is_active: payload.is_active.unwrap_or(true),
    };

    let product = state
        .services
        .products
        .create_product(input)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(
        ProductEnvelope {
            product: product.into(),
        },
        "Product created",
    ))
}

/// Update a product. Price changes never touch existing orders.
#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = ProductEnvelope),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;

    let input = UpdateProductInput {
        name: payload.name.map(|n| n.trim().to_string()),
        description: normalize_optional_string(payload.description),
        price: payload.price,
        sizes: payload.sizes.map(normalize_options),
        colors: payload.colors.map(normalize_options),
        image_url: normalize_optional_string(payload.image_url),
        is_active: payload.is_active,
    };

    let product = state
        .services
        .products
        .update_product(id, input)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductEnvelope {
        product: product.into(),
    }))
}

// Request DTOs

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[validate(url)]
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    pub sizes: Option<Vec<String>>,
    pub colors: Option<Vec<String>>,
    #[validate(url)]
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

// Response DTOs

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductModel> for ProductResponse {
    fn from(product: ProductModel) -> Self {
        Self {
            sizes: product.size_options(),
            colors: product.color_options(),
            id: product.id,
            name: product.name,
            description: product.description,
            price: product.price,
            image_url: product.image_url,
            is_active: product.is_active,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductEnvelope {
    pub product: ProductResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
    pub pagination: PaginationMeta,
}
