//! Service capabilities used by the HTTP layer.
//!
//! Each capability is a trait with one production implementation generic over
//! [`Storage`](crate::store::Storage); tests run the same implementation on
//! [`MemoryStorage`](crate::store::memory::MemoryStorage).

pub mod catalog;
pub mod orders;

use async_trait::async_trait;

use crate::domain::aggregates::{Cart, CatalogEntry, CatalogError, CatalogUpdate, NewCatalogEntry, Order, OrderError, PriceSnapshot};
use crate::domain::value_objects::{CatalogEntryId, CategoryId, OrderId, SnapshotId, UserId};
use crate::store::Page;

pub use catalog::{Catalog, CatalogListing};
pub use orders::Fulfillment;

#[async_trait]
pub trait OrderService: Send + Sync {
    /// Turns a cart into a committed order, or changes nothing.
    async fn create_order(&self, user_id: UserId, cart: Cart) -> Result<Order, OrderError>;
    async fn list_orders(&self, user_id: UserId, page: Page) -> Result<Vec<Order>, OrderError>;
    /// `NotFound` both for unknown ids and for orders of other users.
    async fn get_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order, OrderError>;
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Creates the entry and its initial price snapshot in one transaction.
    /// `seller` must run the draft's store.
    async fn create_entry(&self, seller: UserId, draft: NewCatalogEntry) -> Result<(CatalogEntry, PriceSnapshot), CatalogError>;
    /// `Forbidden` unless `seller` runs the entry's store.
    async fn update_entry(&self, seller: UserId, id: CatalogEntryId, update: CatalogUpdate) -> Result<CatalogEntry, CatalogError>;
    async fn find_entry(&self, id: CatalogEntryId) -> Result<CatalogEntry, CatalogError>;
    async fn find_snapshot(&self, id: SnapshotId) -> Result<PriceSnapshot, CatalogError>;
    async fn snapshots_for(&self, id: CatalogEntryId) -> Result<Vec<PriceSnapshot>, CatalogError>;
    /// Newest first, each entry with its snapshots.
    async fn list_entries(&self, category: Option<CategoryId>, page: Page) -> Result<Vec<CatalogListing>, CatalogError>;
}
