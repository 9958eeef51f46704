//! Order status machine.
//!
//! Everything here is pure: the order service reads the current row inside
//! its write transaction, runs the guards and [`apply_transition`] on it and
//! persists the changed columns together with one history entry.

use chrono::{DateTime, Duration, Utc};

use crate::{
    entities::{
        order::Model as OrderModel, OrderStatus, PaymentMethod, PaymentStatus, RefundStatus,
    },
    errors::ServiceError,
};

/// Who is driving a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub is_staff: bool,
}

impl Actor {
    pub fn customer(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_staff: false,
        }
    }

    pub fn staff(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_staff: true,
        }
    }

    /// Value recorded in `cancelled_by` and the history `actor` column
    pub fn label(&self) -> String {
        if self.is_staff {
            format!("staff:{}", self.user_id)
        } else {
            self.user_id.clone()
        }
    }

    pub fn can_view(&self, order: &OrderModel) -> bool {
        self.is_staff || order.user_id == self.user_id
    }
}

/// Requested transition plus the optional data staff may attach to it
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub to: OrderStatus,
    pub note: Option<String>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

impl TransitionRequest {
    pub fn to(status: OrderStatus) -> Self {
        Self {
            to: status,
            note: None,
            carrier: None,
            tracking_number: None,
            tracking_url: None,
            estimated_delivery: None,
            cancellation_reason: None,
        }
    }

    pub fn cancel(reason: Option<String>) -> Self {
        Self {
            cancellation_reason: reason,
            ..Self::to(OrderStatus::Cancelled)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub order: OrderModel,
    pub from: OrderStatus,
    /// The target ranks lower than the current status on the forward chain
    pub backward: bool,
}

/// Customers may cancel their own orders until processing ends. Staff may
/// always cancel. Nobody may cancel twice.
pub fn authorize_cancel(order: &OrderModel, actor: &Actor) -> Result<(), ServiceError> {
    if order.status == OrderStatus::Cancelled {
        return Err(ServiceError::Conflict(format!(
            "Order {} is already cancelled",
            order.order_number
        )));
    }
    if actor.is_staff {
        return Ok(());
    }
    if order.user_id != actor.user_id {
        return Err(ServiceError::Forbidden(
            "You can only cancel your own orders".to_string(),
        ));
    }
    if !order.status.is_customer_cancellable() {
        return Err(ServiceError::Conflict(format!(
            "Order cannot be cancelled once it is {}",
            order.status
        )));
    }
    Ok(())
}

pub fn is_backward(from: OrderStatus, to: OrderStatus) -> bool {
    to.rank() < from.rank()
}

/// Computes the order row after moving to `request.to`.
pub fn apply_transition(
    order: &OrderModel,
    request: &TransitionRequest,
    actor: &Actor,
    now: DateTime<Utc>,
    estimated_delivery_days: i64,
) -> Result<Transition, ServiceError> {
    let from = order.status;
    if from == OrderStatus::Cancelled && request.to == OrderStatus::Cancelled {
        return Err(ServiceError::Conflict(format!(
            "Order {} is already cancelled",
            order.order_number
        )));
    }

    let mut next = order.clone();
    next.status = request.to;
    next.updated_at = now;

    if let Some(carrier) = &request.carrier {
        next.carrier = Some(carrier.clone());
    }
    if let Some(number) = &request.tracking_number {
        next.tracking_number = Some(number.clone());
    }
    if let Some(url) = &request.tracking_url {
        next.tracking_url = Some(url.clone());
    }
    if let Some(eta) = request.estimated_delivery {
        next.estimated_delivery = Some(eta);
    }

    match request.to {
        OrderStatus::Shipped => {
            if next.estimated_delivery.is_none() {
                next.estimated_delivery = Some(now + Duration::days(estimated_delivery_days));
            }
        }
        OrderStatus::Delivered => {
            next.actual_delivery = Some(now);
            if next.payment_method == PaymentMethod::Cod
                && next.payment_status == PaymentStatus::Pending
            {
                next.payment_status = PaymentStatus::Completed;
                next.paid_at = Some(now);
                next.payment_amount = next.total_amount;
            }
        }
        OrderStatus::Cancelled => {
            next.cancellation_reason = request.cancellation_reason.clone();
            next.cancelled_at = Some(now);
            next.cancelled_by = Some(actor.label());
            next.refund_status = (next.payment_status == PaymentStatus::Completed)
                .then_some(RefundStatus::Pending);
        }
        OrderStatus::Refunded => {
            if next.refund_status == Some(RefundStatus::Pending) {
                next.refund_status = Some(RefundStatus::Completed);
            }
            next.payment_status = PaymentStatus::Refunded;
        }
        _ => {}
    }

    Ok(Transition {
        order: next,
        from,
        backward: is_backward(from, request.to),
    })
}
