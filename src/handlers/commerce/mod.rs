/// Catalog and cart handlers
pub mod carts;
pub mod products;

// Re-export route builders
pub use carts::carts_routes;
pub use products::products_routes;
