use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbBackend,
    DbErr, EntityTrait, IntoActiveModel, Iterable, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        commerce::{CartItemModel, CartModel},
        order::{self, Entity as Order, Model as OrderModel},
        order_item::{self, Entity as OrderItem, Model as OrderItemModel},
        order_status_history::{self, Entity as OrderStatusHistory, Model as HistoryModel},
        OrderStatus, PaymentMethod, PaymentStatus, RefundStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        commerce::cart_service::{calculate_total, empty_cart, line_total},
        order_status::{apply_transition, authorize_cancel, Actor, TransitionRequest},
    },
};

const ORDER_NUMBER_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ORDER_NUMBER_SUFFIX_LEN: usize = 8;
const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// `ORD-YYYYMMDD-XXXXXXXX` with eight random uppercase alphanumerics
pub fn generate_order_number(date: NaiveDate) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ORDER_NUMBER_SUFFIX_LEN)
        .map(|_| ORDER_NUMBER_ALPHABET[rng.gen_range(0..ORDER_NUMBER_ALPHABET.len())] as char)
        .collect();
    format!("ORD-{}-{}", date.format("%Y%m%d"), suffix)
}

/// Delivery address captured with the order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShippingAddress {
    #[validate(length(min = 1, max = 100, message = "full_name is required"))]
    pub full_name: String,
    #[validate(length(min = 7, max = 20, message = "phone must be 7 to 20 characters"))]
    pub phone: String,
    #[validate(length(min = 1, max = 200, message = "address_line1 is required"))]
    pub address_line1: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub address_line2: Option<String>,
    #[validate(length(min = 1, max = 100, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, max = 100, message = "state is required"))]
    pub state: String,
    #[validate(length(min = 3, max = 12, message = "postal_code must be 3 to 12 characters"))]
    pub postal_code: String,
    #[serde(default = "default_country")]
    #[validate(length(min = 1, max = 56))]
    pub country: String,
}

fn default_country() -> String {
    "India".to_string()
}

/// Payment block for a new order
#[derive(Debug, Clone)]
pub(crate) struct NewOrderPayment {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Amount the gateway was asked to collect; defaults to the cart total
    pub amount: Option<Decimal>,
}

/// Snapshots the cart into an order, writes the initial history and empties
/// the cart. Must run inside the caller's transaction.
pub(crate) async fn create_order_from_cart<C: ConnectionTrait>(
    conn: &C,
    cart: &CartModel,
    items: &[CartItemModel],
    address: &ShippingAddress,
    payment: NewOrderPayment,
    currency: &str,
) -> Result<OrderView, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::EmptyCart);
    }

    let now = Utc::now();
    let order_number = unique_order_number(conn, now.date_naive()).await?;
    let total = calculate_total(items);
    let order_id = Uuid::new_v4();

    let initial_statuses: &[OrderStatus] = match payment.method {
        PaymentMethod::Cod => &[OrderStatus::Placed],
        _ => &[OrderStatus::Placed, OrderStatus::Confirmed],
    };
    let status = initial_statuses
        .last()
        .copied()
        .unwrap_or(OrderStatus::Placed);

    let address_json = serde_json::to_value(address)?;
    let order = order::ActiveModel {
        id: Set(order_id),
        order_number: Set(order_number),
        user_id: Set(cart.user_id.clone()),
        shipping_address: Set(address_json),
        payment_method: Set(payment.method),
        payment_status: Set(payment.status),
        gateway_order_id: Set(payment.gateway_order_id),
        gateway_payment_id: Set(payment.gateway_payment_id),
        gateway_signature: Set(payment.gateway_signature),
        paid_at: Set(payment.paid_at),
        payment_amount: Set(payment.amount.unwrap_or(total)),
        currency: Set(currency.to_string()),
        status: Set(status),
        subtotal: Set(total),
        tax: Set(Decimal::ZERO),
        shipping_cost: Set(Decimal::ZERO),
        discount: Set(Decimal::ZERO),
        total_amount: Set(total),
        carrier: Set(None),
        tracking_number: Set(None),
        tracking_url: Set(None),
        estimated_delivery: Set(None),
        actual_delivery: Set(None),
        cancellation_reason: Set(None),
        cancelled_at: Set(None),
        cancelled_by: Set(None),
        refund_status: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    let mut order_items = Vec::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        let saved = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(item.product_id),
            product_name: Set(item.product_name.clone()),
            size: Set(item.size.clone()),
            color: Set(item.color.clone()),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
            line_total: Set(line_total(item.unit_price, item.quantity)),
            position: Set(position as i32),
        }
        .insert(conn)
        .await?;
        order_items.push(saved);
    }

    let mut history = Vec::with_capacity(initial_statuses.len());
    for status in initial_statuses {
        history.push(append_history(conn, order_id, *status, None, None, now).await?);
    }

    empty_cart(conn, cart).await?;

    Ok(OrderView::build(order, order_items, Some(history)))
}

async fn unique_order_number<C: ConnectionTrait>(
    conn: &C,
    date: NaiveDate,
) -> Result<String, ServiceError> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let candidate = generate_order_number(date);
        let taken = Order::find()
            .filter(order::Column::OrderNumber.eq(candidate.as_str()))
            .count(conn)
            .await?
            > 0;
        if !taken {
            return Ok(candidate);
        }
        warn!(order_number = %candidate, "order number collision, regenerating");
    }
    Err(ServiceError::InternalError(
        "could not allocate a unique order number".to_string(),
    ))
}

/// Appends the next history entry. The (order, sequence) unique index turns a
/// racing writer into a concurrency error instead of a duplicate slot.
pub(crate) async fn append_history<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    status: OrderStatus,
    note: Option<String>,
    actor: Option<String>,
    now: DateTime<Utc>,
) -> Result<HistoryModel, ServiceError> {
    let last = OrderStatusHistory::find()
        .filter(order_status_history::Column::OrderId.eq(order_id))
        .order_by_desc(order_status_history::Column::Sequence)
        .one(conn)
        .await?;
    let sequence = last.map_or(1, |entry| entry.sequence + 1);

    order_status_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        sequence: Set(sequence),
        status: Set(status),
        note: Set(note),
        actor: Set(actor),
        created_at: Set(now),
    }
    .insert(conn)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            ServiceError::ConcurrentModification(order_id)
        } else {
            err.into()
        }
    })
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Filters accepted by the staff order listing
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub user_id: Option<String>,
    /// Order number substring
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Staff-supplied data for a status change
#[derive(Debug, Clone)]
pub struct UpdateStatusInput {
    pub status: OrderStatus,
    pub note: Option<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

/// Order queries, cancellation and the staff status machine
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    estimated_delivery_days: i64,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        estimated_delivery_days: i64,
    ) -> Self {
        Self {
            db,
            event_sender,
            estimated_delivery_days,
        }
    }

    /// Orders of one customer, newest first
    #[instrument(skip(self))]
    pub async fn list_my_orders(
        &self,
        user_id: &str,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderView>, u64), ServiceError> {
        let filter = OrderFilter {
            user_id: Some(user_id.to_string()),
            ..OrderFilter::default()
        };
        self.list_orders(filter, page, per_page).await
    }

    /// Staff listing with filters, newest first
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        filter: OrderFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderView>, u64), ServiceError> {
        let mut condition = Condition::all();
        if let Some(status) = filter.status {
            condition = condition.add(order::Column::Status.eq(status));
        }
        if let Some(user_id) = filter.user_id {
            condition = condition.add(order::Column::UserId.eq(user_id));
        }
        if let Some(search) = filter.search.filter(|s| !s.trim().is_empty()) {
            condition = condition.add(order::Column::OrderNumber.contains(search.trim()));
        }
        if let Some(from) = filter.from {
            condition = condition.add(order::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            condition = condition.add(order::Column::CreatedAt.lte(to));
        }

        let paginator = Order::find()
            .filter(condition)
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut items_by_order: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
        for item in OrderItem::find()
            .filter(order_item::Column::OrderId.is_in(ids))
            .order_by_asc(order_item::Column::Position)
            .all(&*self.db)
            .await?
        {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        let views = orders
            .into_iter()
            .map(|order| {
                let items = items_by_order.remove(&order.id).unwrap_or_default();
                OrderView::build(order, items, None)
            })
            .collect();

        Ok((views, total))
    }

    /// Order detail with history, visible to the owner and staff
    #[instrument(skip(self))]
    pub async fn get_order(&self, id: Uuid, actor: &Actor) -> Result<OrderView, ServiceError> {
        let order = self.find_order(id).await?;
        if !actor.can_view(&order) {
            return Err(ServiceError::Forbidden(
                "You do not have access to this order".to_string(),
            ));
        }
        self.load_view(&*self.db, order).await
    }

    /// Tracking summary by order number
    #[instrument(skip(self))]
    pub async fn track_order(
        &self,
        order_number: &str,
        actor: &Actor,
    ) -> Result<TrackingView, ServiceError> {
        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;

        if !actor.can_view(&order) {
            return Err(ServiceError::Forbidden(
                "You do not have access to this order".to_string(),
            ));
        }

        let history = load_history(&*self.db, order.id).await?;
        Ok(TrackingView {
            order_number: order.order_number,
            status: order.status,
            carrier: order.carrier,
            tracking_number: order.tracking_number,
            tracking_url: order.tracking_url,
            estimated_delivery: order.estimated_delivery,
            actual_delivery: order.actual_delivery,
            status_history: history.into_iter().map(StatusHistoryEntry::from).collect(),
        })
    }

    /// Customer or staff cancellation
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        id: Uuid,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<OrderView, ServiceError> {
        let view = self
            .transition(
                id,
                TransitionRequest::cancel(reason.clone()),
                actor,
                authorize_cancel,
            )
            .await?;

        self.event_sender
            .send_or_log(Event::OrderCancelled {
                order_id: view.id,
                reason,
                cancelled_by: actor.label(),
            })
            .await;
        Ok(view)
    }

    /// Staff status change with the side effects of the target status
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: Uuid,
        actor: &Actor,
        input: UpdateStatusInput,
    ) -> Result<OrderView, ServiceError> {
        if !actor.is_staff {
            return Err(ServiceError::Forbidden(
                "Only staff can change order status".to_string(),
            ));
        }
        let request = TransitionRequest {
            to: input.status,
            note: input.note,
            carrier: input.carrier,
            tracking_number: input.tracking_number,
            tracking_url: input.tracking_url,
            estimated_delivery: input.estimated_delivery,
            cancellation_reason: input.cancellation_reason,
        };
        self.transition(id, request, actor, |_, _| Ok(())).await
    }

    /// Marks the order behind a gateway order id as paid. Returns `None` when
    /// no order references that gateway order.
    #[instrument(skip(self))]
    pub async fn mark_payment_captured(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: Option<&str>,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let Some(order) = Order::find()
            .filter(order::Column::GatewayOrderId.eq(gateway_order_id))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        if matches!(
            order.payment_status,
            PaymentStatus::Completed | PaymentStatus::Refunded
        ) && order.paid_at.is_some()
        {
            return Ok(Some(order));
        }

        let now = Utc::now();
        let mut active = order.clone().into_active_model();
        if order.payment_status != PaymentStatus::Refunded {
            active.payment_status = Set(PaymentStatus::Completed);
        }
        if order.paid_at.is_none() {
            active.paid_at = Set(Some(now));
        }
        if order.gateway_payment_id.is_none() {
            active.gateway_payment_id = Set(gateway_payment_id.map(str::to_owned));
        }
        active.updated_at = Set(now);
        let updated = active.update(&*self.db).await?;

        info!(
            order_id = %updated.id,
            order_number = %updated.order_number,
            "Payment captured via webhook"
        );
        self.event_sender
            .send_or_log(Event::PaymentCaptured {
                order_id: updated.id,
                gateway_payment_id: updated.gateway_payment_id.clone().unwrap_or_default(),
                captured_at: now,
            })
            .await;
        Ok(Some(updated))
    }

    async fn find_order(&self, id: Uuid) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))
    }

    async fn load_view<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: OrderModel,
    ) -> Result<OrderView, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::Position)
            .all(conn)
            .await?;
        let history = load_history(conn, order.id).await?;
        Ok(OrderView::build(order, items, Some(history)))
    }

    /// Moves the order to `request.to`. The row is read, guarded and written
    /// inside one transaction; the write only touches changed columns and
    /// only lands if status and `updated_at` still match what was read.
    async fn transition(
        &self,
        id: Uuid,
        request: TransitionRequest,
        actor: &Actor,
        guard: fn(&OrderModel, &Actor) -> Result<(), ServiceError>,
    ) -> Result<OrderView, ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let mut query = Order::find_by_id(id);
        if txn.get_database_backend() == DbBackend::Postgres {
            query = query.lock_exclusive();
        }
        let current = query
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        guard(&current, actor)?;
        let transition =
            apply_transition(&current, &request, actor, now, self.estimated_delivery_days)?;
        let to = transition.order.status;

        if transition.backward {
            warn!(
                order_id = %current.id,
                order_number = %current.order_number,
                from = %transition.from,
                to = %to,
                actor = %actor.label(),
                backward = true,
                "order status moved backwards"
            );
        }

        let result = Order::update_many()
            .set(changed_columns(&current, &transition.order))
            .filter(order::Column::Id.eq(id))
            .filter(order::Column::Status.eq(current.status))
            .filter(order::Column::UpdatedAt.eq(current.updated_at))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            warn!(order_id = %id, to = %to, "order changed underneath a status transition");
            return Err(ServiceError::ConcurrentModification(id));
        }

        append_history(&txn, id, to, request.note.clone(), Some(actor.label()), now).await?;
        let view = self.load_view(&txn, transition.order).await?;
        txn.commit().await?;

        info!(
            order_id = %view.id,
            order_number = %view.order_number,
            from = %transition.from,
            to = %to,
            actor = %actor.label(),
            "Order status changed"
        );
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id: view.id,
                old_status: transition.from,
                new_status: to,
                actor: Some(actor.label()),
            })
            .await;

        Ok(view)
    }
}

/// Active model holding only the columns that differ between the two rows
fn changed_columns(current: &OrderModel, next: &OrderModel) -> order::ActiveModel {
    let mut changes = <order::ActiveModel as ActiveModelTrait>::default();
    for column in order::Column::iter() {
        let value = next.get(column);
        if value != current.get(column) {
            changes.set(column, value);
        }
    }
    changes
}

async fn load_history<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<HistoryModel>, ServiceError> {
    Ok(OrderStatusHistory::find()
        .filter(order_status_history::Column::OrderId.eq(order_id))
        .order_by_asc(order_status_history::Column::Sequence)
        .all(conn)
        .await?)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemView {
    pub product_id: Uuid,
    pub product_name: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<OrderItemModel> for OrderItemView {
    fn from(item: OrderItemModel) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name,
            size: item.size,
            color: item.color,
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.line_total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusHistoryEntry {
    pub sequence: i32,
    pub status: OrderStatus,
    pub note: Option<String>,
    pub actor: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<HistoryModel> for StatusHistoryEntry {
    fn from(entry: HistoryModel) -> Self {
        Self {
            sequence: entry.sequence,
            status: entry.status,
            note: entry.note,
            actor: entry.actor,
            timestamp: entry.created_at,
        }
    }
}

/// Payment block. The verification signature is kept server side.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentInfoView {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PricingView {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping_cost: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeliveryView {
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CancellationView {
    pub reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub refund_status: Option<RefundStatus>,
}

/// Order as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItemView>,
    #[schema(value_type = Object)]
    pub shipping_address: serde_json::Value,
    pub payment: PaymentInfoView,
    pub pricing: PricingView,
    pub tracking: DeliveryView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<CancellationView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_history: Option<Vec<StatusHistoryEntry>>,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderView {
    fn build(
        order: OrderModel,
        items: Vec<OrderItemModel>,
        history: Option<Vec<HistoryModel>>,
    ) -> Self {
        let cancellation = order.cancelled_at.map(|_| CancellationView {
            reason: order.cancellation_reason.clone(),
            cancelled_at: order.cancelled_at,
            cancelled_by: order.cancelled_by.clone(),
            refund_status: order.refund_status,
        });

        Self {
            id: order.id,
            order_number: order.order_number,
            user_id: order.user_id,
            status: order.status,
            items: items.into_iter().map(OrderItemView::from).collect(),
            shipping_address: order.shipping_address,
            payment: PaymentInfoView {
                method: order.payment_method,
                status: order.payment_status,
                gateway_order_id: order.gateway_order_id,
                gateway_payment_id: order.gateway_payment_id,
                paid_at: order.paid_at,
                amount: order.payment_amount,
                currency: order.currency,
            },
            pricing: PricingView {
                subtotal: order.subtotal,
                tax: order.tax,
                shipping_cost: order.shipping_cost,
                discount: order.discount,
                total: order.total_amount,
            },
            tracking: DeliveryView {
                carrier: order.carrier,
                tracking_number: order.tracking_number,
                tracking_url: order.tracking_url,
                estimated_delivery: order.estimated_delivery,
                actual_delivery: order.actual_delivery,
            },
            cancellation,
            status_history: history
                .map(|entries| entries.into_iter().map(StatusHistoryEntry::from).collect()),
            total_amount: order.total_amount,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// Tracking summary
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrackingView {
    pub order_number: String,
    pub status: OrderStatus,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub status_history: Vec<StatusHistoryEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_follow_the_documented_shape() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let number = generate_order_number(date);
        assert!(number.starts_with("ORD-20240309-"));
        let suffix = &number["ORD-20240309-".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn order_numbers_vary() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let a = generate_order_number(date);
        let b = generate_order_number(date);
        let c = generate_order_number(date);
        assert!(a != b || b != c);
    }

    #[test]
    fn address_defaults_country_and_validates() {
        let address: ShippingAddress = serde_json::from_value(serde_json::json!({
            "full_name": "Asha Rao",
            "phone": "9876543210",
            "address_line1": "12 MG Road",
            "city": "Bengaluru",
            "state": "KA",
            "postal_code": "560001"
        }))
        .unwrap();
        assert_eq!(address.country, "India");
        assert!(address.validate().is_ok());

        let blank = ShippingAddress {
            full_name: String::new(),
            ..address
        };
        assert!(blank.validate().is_err());
    }
}
