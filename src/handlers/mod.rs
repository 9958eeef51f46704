pub mod commerce;
pub mod common;
pub mod health;
pub mod orders;
pub mod payment_webhooks;

use crate::{
    db::DbPool,
    events::EventSender,
    services::{
        commerce::{CartService, CheckoutService, ProductService},
        orders::OrderService,
        payments::PaymentGateway,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub products: Arc<ProductService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        config: &crate::config::AppConfig,
    ) -> Self {
        let products = Arc::new(ProductService::new(db_pool.clone()));
        let cart = Arc::new(CartService::new(db_pool.clone(), event_sender.clone()));
        let orders = Arc::new(OrderService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.estimated_delivery_days,
        ));
        let checkout = Arc::new(CheckoutService::new(
            db_pool,
            gateway,
            orders.clone(),
            event_sender,
            config.payments.razorpay_key_secret.clone(),
            config.payments.currency.clone(),
        ));

        Self {
            products,
            cart,
            checkout,
            orders,
        }
    }
}
