//! Postgres-backed storage.
//!
//! ## Stock ledger
//!
//! `decrement_stock` is a single `UPDATE … WHERE stock >= $2`. Postgres takes the
//! row lock for the statement and keeps it until the surrounding transaction ends,
//! so a competing order re-evaluates the condition against the committed stock
//! instead of a value it read earlier. The `CHECK (stock >= 0)` constraint backs
//! this up at the schema level.
//!
//! ## Error mapping
//!
//! | SQLx error                     | StoreError    |
//! |--------------------------------|---------------|
//! | Database, SQLSTATE `23505`     | `Conflict`    |
//! | PoolTimedOut / PoolClosed / Io | `Unavailable` |
//! | anything else                  | `Database`    |

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use super::{Page, StockOutcome, Storage, StoreError, StoreResult, UnitOfWork};
use crate::domain::aggregates::{CatalogEntry, Order, OrderHeader, OrderLine, PriceSnapshot};
use crate::domain::value_objects::{
    AddressId, CatalogEntryId, CategoryId, Money, OrderId, Quantity, SnapshotId, StoreId, UserId,
};

const ENTRY_COLUMNS: &str = "id, name, slug, reseller_price, consumer_price, stock, description, category_id, store_id, created_at, updated_at";
const SNAPSHOT_COLUMNS: &str = "id, catalog_entry_id, name, slug, reseller_price, consumer_price, description, category_id, store_id, initial_stock, created_at";
const ORDER_COLUMNS: &str = "id, user_id, shipping_address_id, payment_method, invoice_code, total_price, created_at, updated_at";
const LINE_COLUMNS: &str = "id, order_id, line_no, snapshot_id, store_id, quantity, subtotal, created_at";

/// Storage over an explicit connection pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn lines_for(&self, order_ids: &[OrderId]) -> StoreResult<HashMap<OrderId, Vec<OrderLine>>> {
        if order_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<Uuid> = order_ids.iter().map(|id| *id.as_uuid()).collect();
        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM order_lines WHERE order_id = ANY($1) ORDER BY order_id, line_no"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<OrderId, Vec<OrderLine>> = HashMap::new();
        for line in lines {
            grouped.entry(line.order_id).or_default().push(line);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn find_catalog_entry(&self, id: CatalogEntryId) -> StoreResult<Option<CatalogEntry>> {
        let entry = sqlx::query_as::<_, CatalogEntry>(&format!("SELECT {ENTRY_COLUMNS} FROM catalog_entries WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    async fn find_snapshot(&self, id: SnapshotId) -> StoreResult<Option<PriceSnapshot>> {
        let snapshot = sqlx::query_as::<_, PriceSnapshot>(&format!("SELECT {SNAPSHOT_COLUMNS} FROM price_snapshots WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(snapshot)
    }

    async fn snapshots_for(&self, id: CatalogEntryId) -> StoreResult<Vec<PriceSnapshot>> {
        let snapshots = sqlx::query_as::<_, PriceSnapshot>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM price_snapshots WHERE catalog_entry_id = $1 ORDER BY created_at, id"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(snapshots)
    }

    #[instrument(skip(self), fields(page = page.page, per_page = page.per_page))]
    async fn list_catalog_entries(&self, category: Option<CategoryId>, page: Page) -> StoreResult<Vec<CatalogEntry>> {
        let entries = sqlx::query_as::<_, CatalogEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM catalog_entries \
             WHERE ($1::uuid IS NULL OR category_id = $1) \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(category)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn snapshots_for_entries(&self, ids: &[CatalogEntryId]) -> StoreResult<Vec<PriceSnapshot>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let snapshots = sqlx::query_as::<_, PriceSnapshot>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM price_snapshots WHERE catalog_entry_id = ANY($1) ORDER BY created_at, id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(snapshots)
    }

    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    async fn find_order(&self, user_id: UserId, order_id: OrderId) -> StoreResult<Option<Order>> {
        let header = sqlx::query_as::<_, OrderHeader>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND user_id = $2"
        ))
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else { return Ok(None) };
        let mut lines = self.lines_for(&[header.id]).await?;
        let lines = lines.remove(&header.id).unwrap_or_default();
        Ok(Some(Order::from_parts(header, lines)))
    }

    #[instrument(skip(self), fields(user_id = %user_id, page = page.page, per_page = page.per_page))]
    async fn list_orders(&self, user_id: UserId, page: Page) -> StoreResult<Vec<Order>> {
        let headers = sqlx::query_as::<_, OrderHeader>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<OrderId> = headers.iter().map(|h| h.id).collect();
        let mut lines = self.lines_for(&ids).await?;
        Ok(headers
            .into_iter()
            .map(|h| {
                let l = lines.remove(&h.id).unwrap_or_default();
                Order::from_parts(h, l)
            })
            .collect())
    }
}

/// One Postgres transaction. Dropping it without `commit` rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_catalog_entry(&mut self, entry: &CatalogEntry) -> StoreResult<()> {
        sqlx::query(&format!("INSERT INTO catalog_entries ({ENTRY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"))
            .bind(entry.id)
            .bind(&entry.name)
            .bind(&entry.slug)
            .bind(&entry.reseller_price)
            .bind(&entry.consumer_price)
            .bind(entry.stock())
            .bind(&entry.description)
            .bind(entry.category_id)
            .bind(entry.store_id)
            .bind(entry.created_at)
            .bind(entry.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn lock_catalog_entry(&mut self, id: CatalogEntryId) -> StoreResult<Option<CatalogEntry>> {
        let entry = sqlx::query_as::<_, CatalogEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM catalog_entries WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(entry)
    }

    async fn update_catalog_entry(&mut self, entry: &CatalogEntry) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE catalog_entries
            SET name = $2, slug = $3, reseller_price = $4, consumer_price = $5,
                description = $6, category_id = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(entry.id)
        .bind(&entry.name)
        .bind(&entry.slug)
        .bind(&entry.reseller_price)
        .bind(&entry.consumer_price)
        .bind(&entry.description)
        .bind(entry.category_id)
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow("catalog entry"));
        }
        Ok(())
    }

    async fn insert_snapshot(&mut self, snapshot: &PriceSnapshot) -> StoreResult<()> {
        sqlx::query(&format!("INSERT INTO price_snapshots ({SNAPSHOT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"))
            .bind(snapshot.id())
            .bind(snapshot.catalog_entry_id())
            .bind(snapshot.name())
            .bind(snapshot.slug())
            .bind(snapshot.reseller_price())
            .bind(snapshot.consumer_price())
            .bind(snapshot.description())
            .bind(snapshot.category_id())
            .bind(snapshot.store_id())
            .bind(snapshot.initial_stock())
            .bind(snapshot.created_at())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn find_snapshot(&mut self, id: SnapshotId) -> StoreResult<Option<PriceSnapshot>> {
        let snapshot = sqlx::query_as::<_, PriceSnapshot>(&format!("SELECT {SNAPSHOT_COLUMNS} FROM price_snapshots WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(snapshot)
    }

    async fn address_belongs_to(&mut self, user_id: UserId, address_id: AddressId) -> StoreResult<bool> {
        let owned = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM addresses WHERE id = $1 AND user_id = $2)")
            .bind(address_id)
            .bind(user_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(owned)
    }

    async fn store_owner(&mut self, store_id: StoreId) -> StoreResult<Option<UserId>> {
        let owner = sqlx::query_scalar::<_, UserId>("SELECT user_id FROM stores WHERE id = $1")
            .bind(store_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(owner)
    }

    async fn insert_order(&mut self, header: &OrderHeader) -> StoreResult<()> {
        sqlx::query(&format!("INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"))
            .bind(header.id)
            .bind(header.user_id)
            .bind(header.shipping_address_id)
            .bind(&header.payment_method)
            .bind(&header.invoice_code)
            .bind(header.total_price)
            .bind(header.created_at)
            .bind(header.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_order_line(&mut self, line: &OrderLine) -> StoreResult<()> {
        sqlx::query(&format!("INSERT INTO order_lines ({LINE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"))
            .bind(line.id)
            .bind(line.order_id)
            .bind(line.line_no)
            .bind(line.snapshot_id)
            .bind(line.store_id)
            .bind(line.quantity)
            .bind(line.subtotal)
            .bind(line.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn set_order_total(&mut self, order_id: OrderId, total: Money) -> StoreResult<OrderHeader> {
        sqlx::query_as::<_, OrderHeader>(&format!(
            "UPDATE orders SET total_price = $2, updated_at = NOW() WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order_id)
        .bind(total)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::MissingRow("order"))
    }

    #[instrument(skip(self), fields(catalog_entry_id = %id, qty = qty.value()))]
    async fn decrement_stock(&mut self, id: CatalogEntryId, qty: Quantity) -> StoreResult<StockOutcome> {
        let remaining = sqlx::query_scalar::<_, i32>(
            "UPDATE catalog_entries SET stock = stock - $2, updated_at = NOW() WHERE id = $1 AND stock >= $2 RETURNING stock",
        )
        .bind(id)
        .bind(qty)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(StockOutcome::Decremented { remaining });
        }

        let available = sqlx::query_scalar::<_, i32>("SELECT stock FROM catalog_entries WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StoreError::MissingRow("catalog entry"))?;
        Ok(StockOutcome::Insufficient { available })
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PgUnitOfWork { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let PgUnitOfWork { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
