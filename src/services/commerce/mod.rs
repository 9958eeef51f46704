//! Catalog, cart and checkout services
pub mod cart_service;
pub mod checkout_service;
pub mod product_service;

pub use cart_service::{AddToCartInput, CartService, CartView};
pub use checkout_service::{CheckoutService, PaymentIntent, PaymentIntentInput, VerifyPaymentInput};
pub use product_service::{CreateProductInput, ProductService, UpdateProductInput};
