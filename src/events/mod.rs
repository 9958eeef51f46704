use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishing never fails the caller; a closed channel is only logged.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, "{}", e);
        }
    }
}

/// Domain events emitted after the corresponding state change is committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CartItemAdded {
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartCleared(Uuid),

    OrderCreated {
        order_id: Uuid,
        order_number: String,
        total_amount: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
        actor: Option<String>,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: Option<String>,
        cancelled_by: String,
    },

    PaymentVerified {
        order_id: Uuid,
        gateway_payment_id: String,
    },
    PaymentVerificationFailed {
        gateway_order_id: String,
        gateway_payment_id: String,
        user_id: String,
    },
    PaymentCaptured {
        order_id: Uuid,
        gateway_payment_id: String,
        captured_at: DateTime<Utc>,
    },
    PaymentFailed {
        gateway_order_id: String,
        gateway_payment_id: Option<String>,
        reason: Option<String>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::CartItemAdded { .. } => "cart.item_added",
            Event::CartCleared(_) => "cart.cleared",
            Event::OrderCreated { .. } => "order.created",
            Event::OrderStatusChanged { .. } => "order.status_changed",
            Event::OrderCancelled { .. } => "order.cancelled",
            Event::PaymentVerified { .. } => "payment.verified",
            Event::PaymentVerificationFailed { .. } => "payment.verification_failed",
            Event::PaymentCaptured { .. } => "payment.captured",
            Event::PaymentFailed { .. } => "payment.failed",
        }
    }
}

/// Creates the in-process event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");
    while let Some(event) = rx.recv().await {
        let name = event.name();
        match &event {
            Event::PaymentVerificationFailed {
                gateway_order_id,
                user_id,
                ..
            } => {
                warn!(event = name, %gateway_order_id, %user_id, "payment signature rejected");
            }
            Event::PaymentFailed {
                gateway_order_id,
                reason,
                ..
            } => {
                warn!(event = name, %gateway_order_id, reason = ?reason, "gateway reported a failed payment");
            }
            Event::OrderCreated {
                order_id,
                order_number,
                total_amount,
            } => {
                info!(event = name, %order_id, %order_number, %total_amount, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
                ..
            } => {
                info!(event = name, %order_id, from = %old_status, to = %new_status, "order status changed");
            }
            other => debug!(event = name, payload = ?other, "event"),
        }
    }
    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_survives_closed_channel() {
        let (sender, rx) = channel(4);
        drop(rx);
        sender.send_or_log(Event::CartCleared(Uuid::nil())).await;
        assert!(sender.send(Event::CartCleared(Uuid::nil())).await.is_err());
    }

    #[tokio::test]
    async fn events_reach_the_receiver_in_order() {
        let (sender, mut rx) = channel(4);
        sender.send_or_log(Event::CartCleared(Uuid::nil())).await;
        sender
            .send_or_log(Event::PaymentFailed {
                gateway_order_id: "order_1".into(),
                gateway_payment_id: None,
                reason: None,
            })
            .await;
        assert_eq!(rx.recv().await.unwrap().name(), "cart.cleared");
        assert_eq!(rx.recv().await.unwrap().name(), "payment.failed");
    }
}
