//! Storage seam: read access plus a scoped unit of work.
//!
//! Every multi-step write goes through a [`UnitOfWork`] obtained from
//! [`Storage::begin`]. The handle is either committed or rolled back; dropping it
//! without a commit (early return, panic, cancelled future) discards every write.
//!
//! Two backends implement the traits: [`postgres::PgStorage`] for production and
//! [`memory::MemoryStorage`] as the in-process test double.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::aggregates::{CatalogEntry, Order, OrderHeader, OrderLine, PriceSnapshot};
use crate::domain::value_objects::{
    AddressId, CatalogEntryId, CategoryId, Money, OrderId, Quantity, SnapshotId, StoreId, UserId,
};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write (slug, invoice code).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A row the write depends on does not exist.
    #[error("missing {0}")]
    MissingRow(&'static str),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                let what = db_err.constraint().unwrap_or("unique constraint").to_string();
                StoreError::Conflict(what)
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Result of the conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockOutcome {
    Decremented { remaining: i32 },
    /// Nothing was written.
    Insufficient { available: i32 },
}

/// One page of a listing. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub const DEFAULT_PER_PAGE: u32 = 10;
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(Self::DEFAULT_PER_PAGE).clamp(1, Self::MAX_PER_PAGE),
        }
    }

    // Fields are public, so a hand-built page may still be out of range.
    pub fn limit(&self) -> i64 { i64::from(self.per_page.clamp(1, Self::MAX_PER_PAGE)) }
    pub fn offset(&self) -> i64 { i64::from(self.page.saturating_sub(1)) * self.limit() }
}

impl Default for Page {
    fn default() -> Self { Self::new(None, None) }
}

/// Reads outside of any unit of work. Readers never observe uncommitted writes.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    async fn find_catalog_entry(&self, id: CatalogEntryId) -> StoreResult<Option<CatalogEntry>>;
    async fn find_snapshot(&self, id: SnapshotId) -> StoreResult<Option<PriceSnapshot>>;
    async fn snapshots_for(&self, id: CatalogEntryId) -> StoreResult<Vec<PriceSnapshot>>;
    /// Newest first, optionally restricted to one category.
    async fn list_catalog_entries(&self, category: Option<CategoryId>, page: Page) -> StoreResult<Vec<CatalogEntry>>;
    async fn snapshots_for_entries(&self, ids: &[CatalogEntryId]) -> StoreResult<Vec<PriceSnapshot>>;

    /// Scoped to `user_id`: another user's order reads as absent.
    async fn find_order(&self, user_id: UserId, order_id: OrderId) -> StoreResult<Option<Order>>;
    /// Newest first, lines included.
    async fn list_orders(&self, user_id: UserId, page: Page) -> StoreResult<Vec<Order>>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    async fn insert_catalog_entry(&mut self, entry: &CatalogEntry) -> StoreResult<()>;
    /// Loads an entry and holds it against concurrent edits until the unit ends.
    async fn lock_catalog_entry(&mut self, id: CatalogEntryId) -> StoreResult<Option<CatalogEntry>>;
    /// Writes every editable field. Stock is not written here.
    async fn update_catalog_entry(&mut self, entry: &CatalogEntry) -> StoreResult<()>;
    async fn insert_snapshot(&mut self, snapshot: &PriceSnapshot) -> StoreResult<()>;
    async fn find_snapshot(&mut self, id: SnapshotId) -> StoreResult<Option<PriceSnapshot>>;

    async fn address_belongs_to(&mut self, user_id: UserId, address_id: AddressId) -> StoreResult<bool>;
    async fn store_owner(&mut self, store_id: StoreId) -> StoreResult<Option<UserId>>;

    async fn insert_order(&mut self, header: &OrderHeader) -> StoreResult<()>;
    async fn insert_order_line(&mut self, line: &OrderLine) -> StoreResult<()>;
    async fn set_order_total(&mut self, order_id: OrderId, total: Money) -> StoreResult<OrderHeader>;

    /// The stock ledger operation: subtracts `qty` only if at least `qty` is in stock,
    /// as one conditional write.
    async fn decrement_stock(&mut self, id: CatalogEntryId, qty: Quantity) -> StoreResult<StockOutcome>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Ends a unit of work according to `result`: commit on success, rollback otherwise.
/// A failed rollback is logged; the original error is what the caller sees.
pub async fn settle<T, E>(uow: Box<dyn UnitOfWork>, result: Result<T, E>) -> Result<T, E>
where
    E: From<StoreError> + std::fmt::Display,
{
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(e) => {
            tracing::debug!(error = %e, "rolling back unit of work");
            if let Err(rb) = uow.rollback().await {
                tracing::error!(error = %rb, "rollback failed");
            }
            Err(e)
        }
    }
}
