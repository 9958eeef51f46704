use crate::{
    entities::commerce::{cart, cart_item, product, Cart, CartItem, CartItemModel, CartModel, Product},
    errors::ServiceError,
    events::{Event, EventSender},
    middleware_helpers::retry::{with_retry, ConcurrencyRetryPolicy, RetryConfig},
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Line total: unit price x quantity
pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Cart total is always derived from the lines, never stored independently of them.
pub fn calculate_total(items: &[CartItemModel]) -> Decimal {
    items
        .iter()
        .map(|item| line_total(item.unit_price, item.quantity))
        .sum()
}

/// Shopping cart service. One cart per user, created lazily on first add.
///
/// Every mutation runs in its own transaction and finishes with a
/// compare-and-set on `carts.version`. A lost race surfaces as
/// [`ServiceError::ConcurrentModification`] and the whole mutation is retried
/// a bounded number of times.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    retry: RetryConfig,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db,
            event_sender,
            retry: RetryConfig::new(3, Duration::from_millis(25)),
        }
    }

    /// Current cart, or an empty virtual cart when the user has none yet.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: &str) -> Result<CartView, ServiceError> {
        match find_cart(&*self.db, user_id).await? {
            Some(cart) => {
                let items = load_items(&*self.db, cart.id).await?;
                Ok(CartView::from_parts(&cart, &items))
            }
            None => Ok(CartView::empty(user_id)),
        }
    }

    /// Adds a line, or accumulates quantity on an identical product+variant line.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: &str,
        input: AddToCartInput,
    ) -> Result<CartView, ServiceError> {
        let input = &input;
        let view = self
            .retrying(move || self.add_item_once(user_id, input))
            .await?;

        if let Some(cart_id) = view.id {
            self.event_sender
                .send_or_log(Event::CartItemAdded {
                    cart_id,
                    product_id: input.product_id,
                    quantity: input.quantity,
                })
                .await;
        }

        info!(
            user_id,
            product_id = %input.product_id,
            quantity = input.quantity,
            "Added item to cart"
        );
        Ok(view)
    }

    /// Overwrites a line's quantity; zero or less removes the line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: &str,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        self.retrying(move || self.update_item_once(user_id, item_id, quantity))
            .await
    }

    /// Removes a line. An unknown line id leaves the cart untouched.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: &str, item_id: Uuid) -> Result<CartView, ServiceError> {
        self.retrying(move || self.remove_item_once(user_id, item_id))
            .await
    }

    /// Empties the cart. The cart row itself is kept.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: &str) -> Result<CartView, ServiceError> {
        let view = self.retrying(move || self.clear_once(user_id)).await?;

        if let Some(cart_id) = view.id {
            self.event_sender
                .send_or_log(Event::CartCleared(cart_id))
                .await;
            info!(user_id, %cart_id, "Cleared cart");
        }
        Ok(view)
    }

    async fn retrying<F, Fut>(&self, mut operation: F) -> Result<CartView, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<CartView, ServiceError>>,
    {
        let result = with_retry(&self.retry, ConcurrencyRetryPolicy, || {
            let attempt = operation();
            async move { attempt.await.map_err(lock_contention_as_conflict) }
        })
        .await;
        if let Err(ServiceError::ConcurrentModification(cart_id)) = &result {
            warn!(%cart_id, "cart update lost every optimistic concurrency retry");
        }
        result
    }

    async fn add_item_once(
        &self,
        user_id: &str,
        input: &AddToCartInput,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let product = Product::find_by_id(input.product_id)
            .filter(product::Column::IsActive.eq(true))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        if !product.offers_size(input.size.as_deref()) {
            return Err(ServiceError::ValidationError(format!(
                "Size {} is not available for {}",
                input.size.as_deref().unwrap_or_default(),
                product.name
            )));
        }
        if !product.offers_color(input.color.as_deref()) {
            return Err(ServiceError::ValidationError(format!(
                "Color {} is not available for {}",
                input.color.as_deref().unwrap_or_default(),
                product.name
            )));
        }

        let cart = find_or_create_cart(&txn, user_id).await?;
        let items = load_items(&txn, cart.id).await?;
        let now = Utc::now();

        let existing = items.iter().find(|item| {
            item.product_id == input.product_id
                && item.size == input.size
                && item.color == input.color
        });

        match existing {
            Some(item) => {
                let quantity = item.quantity.checked_add(input.quantity).ok_or_else(|| {
                    ServiceError::ValidationError("Quantity is too large".to_string())
                })?;
                let mut active: cart_item::ActiveModel = item.clone().into();
                active.quantity = Set(quantity);
                active.updated_at = Set(now);
                active.update(&txn).await?;
            }
            None => {
                let position = items.iter().map(|i| i.position + 1).max().unwrap_or(0);
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    product_name: Set(product.name.clone()),
                    size: Set(input.size.clone()),
                    color: Set(input.color.clone()),
                    quantity: Set(input.quantity),
                    unit_price: Set(product.price),
                    position: Set(position),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?;
            }
        }

        let view = finish_mutation(&txn, &cart).await?;
        txn.commit().await?;
        Ok(view)
    }

    async fn update_item_once(
        &self,
        user_id: &str,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = find_cart(&txn, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        let item = CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if quantity <= 0 {
            CartItem::delete_by_id(item.id).exec(&txn).await?;
        } else {
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
        }

        let view = finish_mutation(&txn, &cart).await?;
        txn.commit().await?;
        Ok(view)
    }

    async fn remove_item_once(&self, user_id: &str, item_id: Uuid) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let Some(cart) = find_cart(&txn, user_id).await? else {
            return Ok(CartView::empty(user_id));
        };

        let deleted = CartItem::delete_many()
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        if deleted.rows_affected == 0 {
            let items = load_items(&txn, cart.id).await?;
            return Ok(CartView::from_parts(&cart, &items));
        }

        let view = finish_mutation(&txn, &cart).await?;
        txn.commit().await?;
        Ok(view)
    }

    async fn clear_once(&self, user_id: &str) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let Some(cart) = find_cart(&txn, user_id).await? else {
            return Ok(CartView::empty(user_id));
        };

        let version = empty_cart(&txn, &cart).await?;
        txn.commit().await?;

        Ok(CartView {
            version,
            ..CartView::from_parts(&cart, &[])
        })
    }
}

pub(crate) async fn find_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
) -> Result<Option<CartModel>, ServiceError> {
    Ok(Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?)
}

/// Lines in insertion order
pub(crate) async fn load_items<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> Result<Vec<CartItemModel>, ServiceError> {
    Ok(CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .order_by_asc(cart_item::Column::Position)
        .all(conn)
        .await?)
}

async fn find_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
) -> Result<CartModel, ServiceError> {
    if let Some(cart) = find_cart(conn, user_id).await? {
        return Ok(cart);
    }

    let now = Utc::now();
    let id = Uuid::new_v4();
    let created = cart::ActiveModel {
        id: Set(id),
        user_id: Set(user_id.to_string()),
        total_amount: Set(Decimal::ZERO),
        version: Set(1),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await;

    match created {
        Ok(cart) => Ok(cart),
        // Another request created the user's cart first
        Err(err) if is_unique_violation(&err) => Err(ServiceError::ConcurrentModification(id)),
        Err(err) => Err(err.into()),
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// SQLite reports a lost write race between pooled connections as a locked
/// database instead of a version mismatch. The cart id is not known here.
fn lock_contention_as_conflict(err: ServiceError) -> ServiceError {
    match err {
        ServiceError::DatabaseError(db_err) if is_lock_contention(&db_err) => {
            counter!("storefront.cart.conflicts", 1);
            ServiceError::ConcurrentModification(Uuid::nil())
        }
        other => other,
    }
}

fn is_lock_contention(err: &DbErr) -> bool {
    let message = err.to_string();
    message.contains("database is locked") || message.contains("database table is locked")
}

/// Recomputes the total from the persisted lines and bumps the version.
async fn finish_mutation<C: ConnectionTrait>(
    conn: &C,
    cart: &CartModel,
) -> Result<CartView, ServiceError> {
    let items = load_items(conn, cart.id).await?;
    let total = calculate_total(&items);
    let version = compare_and_set(conn, cart, total).await?;

    Ok(CartView {
        version,
        ..CartView::from_parts(cart, &items)
    })
}

/// Deletes every line, zeroes the total and bumps the version.
/// Shared with checkout so the cart is emptied inside the order transaction.
pub(crate) async fn empty_cart<C: ConnectionTrait>(
    conn: &C,
    cart: &CartModel,
) -> Result<i32, ServiceError> {
    CartItem::delete_many()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .exec(conn)
        .await?;
    compare_and_set(conn, cart, Decimal::ZERO).await
}

/// `UPDATE carts SET version = version + 1 ... WHERE id = ? AND version = ?`
async fn compare_and_set<C: ConnectionTrait>(
    conn: &C,
    cart: &CartModel,
    total: Decimal,
) -> Result<i32, ServiceError> {
    let next_version = cart.version + 1;
    let result = Cart::update_many()
        .col_expr(cart::Column::Version, Expr::value(next_version))
        .col_expr(cart::Column::TotalAmount, Expr::value(total))
        .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(cart::Column::Id.eq(cart.id))
        .filter(cart::Column::Version.eq(cart.version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        counter!("storefront.cart.conflicts", 1);
        return Err(ServiceError::ConcurrentModification(cart.id));
    }
    Ok(next_version)
}

/// Input for adding an item to the cart
#[derive(Debug, Clone)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub size: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<&CartItemModel> for CartLineView {
    fn from(item: &CartItemModel) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            size: item.size.clone(),
            color: item.color.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: line_total(item.unit_price, item.quantity),
        }
    }
}

/// Cart as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartView {
    /// Absent for a cart that has not been persisted yet
    pub id: Option<Uuid>,
    pub user_id: String,
    pub items: Vec<CartLineView>,
    pub total_amount: Decimal,
    pub item_count: i64,
    pub version: i32,
}

impl CartView {
    pub fn empty(user_id: &str) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            items: Vec::new(),
            total_amount: Decimal::ZERO,
            item_count: 0,
            version: 0,
        }
    }

    pub fn from_parts(cart: &CartModel, items: &[CartItemModel]) -> Self {
        Self {
            id: Some(cart.id),
            user_id: cart.user_id.clone(),
            items: items.iter().map(CartLineView::from).collect(),
            total_amount: calculate_total(items),
            item_count: items.iter().map(|i| i64::from(i.quantity)).sum(),
            version: cart.version,
        }
    }
}
