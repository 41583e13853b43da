//! Storefront Orders
//!
//! Turns carts into durable orders while concurrent buyers compete for the same
//! stock.
//!
//! ## Features
//! - Price snapshots taken when a catalog entry is created; orders are priced from
//!   the snapshot, never from the live entry
//! - Oversell-safe stock: one conditional decrement per line
//! - All-or-nothing orders: header, lines, stock and total commit together
//! - Unique invoice codes derived from the order identity
//! - Per-user order queries that never reveal other users' orders

pub mod config;
pub mod domain;
pub mod http;
pub mod service;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{Config, OrderSettings};
pub use domain::aggregates::{
    Cart, CartLine, CatalogEntry, CatalogError, CatalogUpdate, NewCatalogEntry, Order, OrderError, OrderHeader,
    OrderLine, PriceSnapshot,
};
pub use domain::events::{DomainEvent, EventSink};
pub use domain::value_objects::{
    AddressId, CatalogEntryId, CategoryId, InvoiceCode, Money, OrderId, PaymentMethod, Quantity, SnapshotId, Slug,
    StoreId, UserId,
};
pub use service::{Catalog, CatalogListing, CatalogService, Fulfillment, OrderService};
pub use store::{memory::MemoryStorage, postgres::PgStorage, Page, StockOutcome, Storage, StoreError, UnitOfWork};
