use crate::{
    entities::{
        commerce::CartItemModel,
        order::{self, Entity as Order},
        payment_intent::{self, Entity as PaymentIntentRecord, Model as PaymentIntentModel},
        PaymentMethod, PaymentStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        commerce::cart_service::{calculate_total, find_cart, load_items},
        orders::{
            create_order_from_cart, is_unique_violation, NewOrderPayment, OrderService, OrderView,
            ShippingAddress,
        },
        order_status::Actor,
        payments::{
            to_minor_units, verify_payment_signature, CreateGatewayOrder, GatewayOrder,
            PaymentGateway,
        },
    },
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

const MAX_RECEIPT_LEN: usize = 40;

/// Input for opening a gateway payment intent
#[derive(Debug, Clone, Default)]
pub struct PaymentIntentInput {
    /// When present it must equal the live cart total
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub receipt: Option<String>,
}

/// Signed result posted back by the checkout widget
#[derive(Debug, Clone)]
pub struct VerifyPaymentInput {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentIntent {
    pub razorpay_order: GatewayOrder,
    /// Publishable key for the checkout widget
    pub key_id: String,
}

/// Checkout: payment intents, signature verification and cart-to-order conversion.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<OrderService>,
    event_sender: Arc<EventSender>,
    key_secret: String,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<OrderService>,
        event_sender: Arc<EventSender>,
        key_secret: String,
        currency: String,
    ) -> Self {
        Self {
            db,
            gateway,
            orders,
            event_sender,
            key_secret,
            currency,
        }
    }

    /// Opens a gateway order for the live cart total and records it, so that
    /// verification can only settle the amount the gateway was asked for. No
    /// transaction is held while the gateway is called.
    #[instrument(skip(self))]
    pub async fn create_payment_intent(
        &self,
        user_id: &str,
        input: PaymentIntentInput,
    ) -> Result<PaymentIntent, ServiceError> {
        let cart = find_cart(&*self.db, user_id)
            .await?
            .ok_or(ServiceError::EmptyCart)?;
        let items = load_items(&*self.db, cart.id).await?;
        if items.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let total = calculate_total(&items);
        if let Some(requested) = input.amount {
            if requested != total {
                return Err(ServiceError::ValidationError(format!(
                    "Amount {} does not match the cart total {}",
                    requested, total
                )));
            }
        }

        let currency = input
            .currency
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.currency.clone())
            .to_uppercase();
        let receipt = receipt_or_default(input.receipt);
        let expected = to_minor_units(total)?;

        let razorpay_order = self
            .gateway
            .create_order(CreateGatewayOrder {
                amount: total,
                currency,
                receipt: receipt.clone(),
                idempotency_key: Uuid::new_v4().to_string(),
            })
            .await?;
        if razorpay_order.amount != expected {
            return Err(ServiceError::ExternalServiceError(format!(
                "Gateway order {} is for {} minor units, expected {}",
                razorpay_order.id, razorpay_order.amount, expected
            )));
        }

        payment_intent::ActiveModel {
            id: Set(Uuid::new_v4()),
            gateway_order_id: Set(razorpay_order.id.clone()),
            user_id: Set(user_id.to_string()),
            amount: Set(razorpay_order.amount),
            currency: Set(razorpay_order.currency.clone()),
            receipt: Set(razorpay_order.receipt.clone().unwrap_or(receipt)),
            order_id: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        info!(
            user_id,
            gateway_order_id = %razorpay_order.id,
            amount = %total,
            "Payment intent created"
        );
        Ok(PaymentIntent {
            razorpay_order,
            key_id: self.gateway.key_id().to_string(),
        })
    }

    /// Verifies the gateway signature and converts the cart into a confirmed
    /// order. The gateway order must be one of this user's intents and the
    /// cart total must still equal its amount. Replaying an already used
    /// payment id returns the existing order.
    #[instrument(skip(self, input), fields(gateway_order_id = %input.gateway_order_id))]
    pub async fn verify_payment(
        &self,
        user_id: &str,
        input: VerifyPaymentInput,
    ) -> Result<OrderView, ServiceError> {
        if !verify_payment_signature(
            &self.key_secret,
            &input.gateway_order_id,
            &input.gateway_payment_id,
            &input.signature,
        ) {
            counter!("storefront.payments.verification_failed", 1);
            warn!(user_id, "Payment signature mismatch");
            self.event_sender
                .send_or_log(Event::PaymentVerificationFailed {
                    gateway_order_id: input.gateway_order_id,
                    gateway_payment_id: input.gateway_payment_id,
                    user_id: user_id.to_string(),
                })
                .await;
            return Err(ServiceError::PaymentVerificationFailed);
        }

        if let Some(existing) = self
            .existing_order_for_payment(user_id, &input.gateway_payment_id)
            .await?
        {
            info!(order_number = %existing.order_number, "Payment already verified, returning existing order");
            return Ok(existing);
        }

        let intent = self.find_intent(user_id, &input.gateway_order_id).await?;
        let payment = NewOrderPayment {
            method: PaymentMethod::Razorpay,
            status: PaymentStatus::Completed,
            gateway_order_id: Some(input.gateway_order_id.clone()),
            gateway_payment_id: Some(input.gateway_payment_id.clone()),
            gateway_signature: Some(input.signature.clone()),
            paid_at: Some(Utc::now()),
            amount: Some(Decimal::new(intent.amount, 2)),
        };

        match self
            .place_order(user_id, &input.shipping_address, payment, Some(&intent))
            .await
        {
            Ok(order) => {
                self.event_sender
                    .send_or_log(Event::PaymentVerified {
                        order_id: order.id,
                        gateway_payment_id: input.gateway_payment_id,
                    })
                    .await;
                Ok(order)
            }
            // A concurrent verify of the same payment won the unique index
            Err(ServiceError::DatabaseError(err)) if is_unique_violation(&err) => self
                .existing_order_for_payment(user_id, &input.gateway_payment_id)
                .await?
                .ok_or(ServiceError::DatabaseError(err)),
            Err(err) => Err(err),
        }
    }

    /// Cash on delivery: the order is placed with payment pending.
    #[instrument(skip(self, address))]
    pub async fn checkout(
        &self,
        user_id: &str,
        method: PaymentMethod,
        address: &ShippingAddress,
    ) -> Result<OrderView, ServiceError> {
        match method {
            PaymentMethod::Cod => {}
            PaymentMethod::Razorpay => {
                return Err(ServiceError::ValidationError(
                    "Gateway payments go through create-razorpay-order and verify-payment"
                        .to_string(),
                ))
            }
            PaymentMethod::Wallet => {
                return Err(ServiceError::ValidationError(
                    "Wallet payments are not supported".to_string(),
                ))
            }
        }

        let payment = NewOrderPayment {
            method: PaymentMethod::Cod,
            status: PaymentStatus::Pending,
            gateway_order_id: None,
            gateway_payment_id: None,
            gateway_signature: None,
            paid_at: None,
            amount: None,
        };
        self.place_order(user_id, address, payment, None).await
    }

    async fn place_order(
        &self,
        user_id: &str,
        address: &ShippingAddress,
        payment: NewOrderPayment,
        intent: Option<&PaymentIntentModel>,
    ) -> Result<OrderView, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = find_cart(&txn, user_id)
            .await?
            .ok_or(ServiceError::EmptyCart)?;
        let items = load_items(&txn, cart.id).await?;
        if let Some(intent) = intent {
            ensure_intent_covers_cart(intent, &items)?;
        }

        let order =
            create_order_from_cart(&txn, &cart, &items, address, payment, &self.currency).await?;
        if let Some(intent) = intent {
            consume_intent(&txn, intent, order.id).await?;
        }
        txn.commit().await?;

        counter!("storefront.orders.created", 1);
        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            user_id,
            total = %order.total_amount,
            "Order created"
        );
        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: order.id,
                order_number: order.order_number.clone(),
                total_amount: order.total_amount,
            })
            .await;

        Ok(order)
    }

    async fn find_intent(
        &self,
        user_id: &str,
        gateway_order_id: &str,
    ) -> Result<PaymentIntentModel, ServiceError> {
        let intent = PaymentIntentRecord::find()
            .filter(payment_intent::Column::GatewayOrderId.eq(gateway_order_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "No payment was opened for gateway order {}",
                    gateway_order_id
                ))
            })?;
        if intent.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "Payment belongs to another account".to_string(),
            ));
        }
        Ok(intent)
    }

    async fn existing_order_for_payment(
        &self,
        user_id: &str,
        gateway_payment_id: &str,
    ) -> Result<Option<OrderView>, ServiceError> {
        let existing = Order::find()
            .filter(order::Column::GatewayPaymentId.eq(gateway_payment_id))
            .one(&*self.db)
            .await?;

        match existing {
            None => Ok(None),
            Some(order) if order.user_id == user_id => self
                .orders
                .get_order(order.id, &Actor::customer(user_id))
                .await
                .map(Some),
            Some(_) => Err(ServiceError::Forbidden(
                "Payment belongs to another account".to_string(),
            )),
        }
    }
}

/// The cart must still total what the gateway was asked to collect.
fn ensure_intent_covers_cart(
    intent: &PaymentIntentModel,
    items: &[CartItemModel],
) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::EmptyCart);
    }
    let total = calculate_total(items);
    if to_minor_units(total)? != intent.amount {
        counter!("storefront.payments.amount_mismatch", 1);
        warn!(
            gateway_order_id = %intent.gateway_order_id,
            intent_amount = intent.amount,
            cart_total = %total,
            "Cart changed after the payment was opened"
        );
        return Err(ServiceError::Conflict(format!(
            "Cart total {} no longer matches the payment of {} {}",
            total,
            Decimal::new(intent.amount, 2),
            intent.currency
        )));
    }
    Ok(())
}

/// Claims the intent for `order_id`; a second conversion of the same intent
/// finds it already claimed.
async fn consume_intent<C: ConnectionTrait>(
    conn: &C,
    intent: &PaymentIntentModel,
    order_id: Uuid,
) -> Result<(), ServiceError> {
    let result = PaymentIntentRecord::update_many()
        .col_expr(payment_intent::Column::OrderId, Expr::value(order_id))
        .filter(payment_intent::Column::Id.eq(intent.id))
        .filter(payment_intent::Column::OrderId.is_null())
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "Gateway order {} has already been settled",
            intent.gateway_order_id
        )));
    }
    Ok(())
}

fn receipt_or_default(receipt: Option<String>) -> String {
    let receipt = receipt
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| format!("rcpt_{}", Uuid::new_v4().simple()));
    receipt.chars().take(MAX_RECEIPT_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(amount: i64) -> PaymentIntentModel {
        PaymentIntentModel {
            id: Uuid::new_v4(),
            gateway_order_id: "order_1".into(),
            user_id: "customer".into(),
            amount,
            currency: "INR".into(),
            receipt: "rcpt_1".into(),
            order_id: None,
            created_at: Utc::now(),
        }
    }

    fn item(unit_price: Decimal, quantity: i32) -> CartItemModel {
        let now = Utc::now();
        CartItemModel {
            id: Uuid::new_v4(),
            cart_id: Uuid::nil(),
            product_id: Uuid::new_v4(),
            product_name: "Tee".into(),
            size: None,
            color: None,
            quantity,
            unit_price,
            position: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn intent_must_match_cart_total() {
        let items = vec![item(Decimal::new(50000, 2), 2)];
        assert!(ensure_intent_covers_cart(&intent(100_000), &items).is_ok());
        assert!(matches!(
            ensure_intent_covers_cart(&intent(500), &items),
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            ensure_intent_covers_cart(&intent(500), &[]),
            Err(ServiceError::EmptyCart)
        ));
    }

    #[test]
    fn generated_receipts_fit_gateway_limit() {
        let receipt = receipt_or_default(None);
        assert!(receipt.starts_with("rcpt_"));
        assert!(receipt.len() <= MAX_RECEIPT_LEN);
    }

    #[test]
    fn supplied_receipts_are_trimmed_and_truncated() {
        assert_eq!(receipt_or_default(Some("  r-1 ".into())), "r-1");
        assert_eq!(receipt_or_default(Some("x".repeat(64))).len(), MAX_RECEIPT_LEN);
        assert!(receipt_or_default(Some("   ".into())).starts_with("rcpt_"));
    }
}
