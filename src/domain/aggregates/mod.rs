//! Aggregates module
pub mod catalog_entry;
pub mod snapshot;
pub mod order;
pub mod cart;

pub use catalog_entry::{CatalogEntry, CatalogError, CatalogUpdate, NewCatalogEntry};
pub use snapshot::PriceSnapshot;
pub use order::{Order, OrderError, OrderHeader, OrderLine};
pub use cart::{Cart, CartLine, Checkout};
