//! In-memory storage.
//!
//! Intended for tests/dev. A unit of work holds the single table lock for its whole
//! lifetime and writes to a staged copy, so transactions are serializable and an
//! uncommitted unit leaves nothing behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Page, StockOutcome, Storage, StoreError, StoreResult, UnitOfWork};
use crate::domain::aggregates::{CatalogEntry, Order, OrderHeader, OrderLine, PriceSnapshot};
use crate::domain::value_objects::{
    AddressId, CatalogEntryId, CategoryId, Money, OrderId, Quantity, SnapshotId, StoreId, UserId,
};

#[derive(Debug, Default, Clone)]
struct Tables {
    entries: HashMap<CatalogEntryId, CatalogEntry>,
    snapshots: Vec<PriceSnapshot>,
    orders: Vec<OrderHeader>,
    lines: Vec<OrderLine>,
    addresses: HashMap<AddressId, UserId>,
    stores: HashMap<StoreId, UserId>,
}

impl Tables {
    fn snapshot(&self, id: SnapshotId) -> Option<&PriceSnapshot> {
        self.snapshots.iter().find(|s| s.id() == id)
    }

    fn assemble(&self, header: &OrderHeader) -> Order {
        let mut lines: Vec<OrderLine> = self.lines.iter().filter(|l| l.order_id == header.id).cloned().collect();
        lines.sort_by_key(|l| l.line_no);
        Order::from_parts(header.clone(), lines)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<Mutex<Tables>>,
    fail_commit: Arc<AtomicBool>,
    stock_delay: Arc<std::sync::Mutex<Option<Duration>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an address as owned by `user_id` (address collaborator data).
    pub async fn seed_address(&self, user_id: UserId, address_id: AddressId) {
        self.tables.lock().await.addresses.insert(address_id, user_id);
    }

    /// Registers a store as run by `user_id` (store collaborator data).
    pub async fn seed_store(&self, user_id: UserId, store_id: StoreId) {
        self.tables.lock().await.stores.insert(store_id, user_id);
    }

    /// Inserts an entry plus its initial snapshot without any validation, for
    /// fixtures that need data the catalog service would refuse.
    pub async fn seed_catalog_entry(&self, entry: CatalogEntry) -> PriceSnapshot {
        let snapshot = PriceSnapshot::capture(&entry, Utc::now());
        let mut tables = self.tables.lock().await;
        tables.entries.insert(entry.id, entry);
        tables.snapshots.push(snapshot.clone());
        snapshot
    }

    pub async fn stock_of(&self, id: CatalogEntryId) -> Option<i32> {
        self.tables.lock().await.entries.get(&id).map(CatalogEntry::stock)
    }

    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    pub async fn line_count(&self) -> usize {
        self.tables.lock().await.lines.len()
    }

    /// Makes the next commit fail as if the database went away.
    pub fn fail_next_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    /// Stalls every stock decrement, simulating a slow storage engine.
    pub fn set_stock_delay(&self, delay: Option<Duration>) {
        if let Ok(mut slot) = self.stock_delay.lock() {
            *slot = delay;
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        let stock_delay = self.stock_delay.lock().map(|d| *d).unwrap_or(None);
        Ok(Box::new(MemoryUnitOfWork { guard, staged, fail_commit: self.fail_commit.clone(), stock_delay }))
    }

    async fn find_catalog_entry(&self, id: CatalogEntryId) -> StoreResult<Option<CatalogEntry>> {
        Ok(self.tables.lock().await.entries.get(&id).cloned())
    }

    async fn find_snapshot(&self, id: SnapshotId) -> StoreResult<Option<PriceSnapshot>> {
        Ok(self.tables.lock().await.snapshot(id).cloned())
    }

    async fn snapshots_for(&self, id: CatalogEntryId) -> StoreResult<Vec<PriceSnapshot>> {
        let tables = self.tables.lock().await;
        Ok(tables.snapshots.iter().filter(|s| s.catalog_entry_id() == id).cloned().collect())
    }

    async fn list_catalog_entries(&self, category: Option<CategoryId>, page: Page) -> StoreResult<Vec<CatalogEntry>> {
        let tables = self.tables.lock().await;
        let mut entries: Vec<&CatalogEntry> = tables
            .entries
            .values()
            .filter(|e| category.map_or(true, |c| e.category_id == c))
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect())
    }

    async fn snapshots_for_entries(&self, ids: &[CatalogEntryId]) -> StoreResult<Vec<PriceSnapshot>> {
        let tables = self.tables.lock().await;
        Ok(tables.snapshots.iter().filter(|s| ids.contains(&s.catalog_entry_id())).cloned().collect())
    }

    async fn find_order(&self, user_id: UserId, order_id: OrderId) -> StoreResult<Option<Order>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .iter()
            .find(|h| h.id == order_id && h.user_id == user_id)
            .map(|h| tables.assemble(h)))
    }

    async fn list_orders(&self, user_id: UserId, page: Page) -> StoreResult<Vec<Order>> {
        let tables = self.tables.lock().await;
        let mut headers: Vec<&OrderHeader> = tables.orders.iter().filter(|h| h.user_id == user_id).collect();
        headers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(headers
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .map(|h| tables.assemble(h))
            .collect())
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    fail_commit: Arc<AtomicBool>,
    stock_delay: Option<Duration>,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_catalog_entry(&mut self, entry: &CatalogEntry) -> StoreResult<()> {
        if self.staged.entries.values().any(|e| e.slug == entry.slug) {
            return Err(StoreError::Conflict(format!("catalog_entries_slug_key ({})", entry.slug)));
        }
        self.staged.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn lock_catalog_entry(&mut self, id: CatalogEntryId) -> StoreResult<Option<CatalogEntry>> {
        Ok(self.staged.entries.get(&id).cloned())
    }

    async fn update_catalog_entry(&mut self, entry: &CatalogEntry) -> StoreResult<()> {
        if self.staged.entries.values().any(|e| e.id != entry.id && e.slug == entry.slug) {
            return Err(StoreError::Conflict(format!("catalog_entries_slug_key ({})", entry.slug)));
        }
        let current = self.staged.entries.get_mut(&entry.id).ok_or(StoreError::MissingRow("catalog entry"))?;
        // stock stays whatever the ledger made it
        current.name = entry.name.clone();
        current.slug = entry.slug.clone();
        current.reseller_price = entry.reseller_price.clone();
        current.consumer_price = entry.consumer_price.clone();
        current.description = entry.description.clone();
        current.category_id = entry.category_id;
        current.updated_at = entry.updated_at;
        Ok(())
    }

    async fn insert_snapshot(&mut self, snapshot: &PriceSnapshot) -> StoreResult<()> {
        if !self.staged.entries.contains_key(&snapshot.catalog_entry_id()) {
            return Err(StoreError::MissingRow("catalog entry"));
        }
        self.staged.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn find_snapshot(&mut self, id: SnapshotId) -> StoreResult<Option<PriceSnapshot>> {
        Ok(self.staged.snapshot(id).cloned())
    }

    async fn address_belongs_to(&mut self, user_id: UserId, address_id: AddressId) -> StoreResult<bool> {
        Ok(self.staged.addresses.get(&address_id) == Some(&user_id))
    }

    async fn store_owner(&mut self, store_id: StoreId) -> StoreResult<Option<UserId>> {
        Ok(self.staged.stores.get(&store_id).copied())
    }

    async fn insert_order(&mut self, header: &OrderHeader) -> StoreResult<()> {
        if self.staged.orders.iter().any(|o| o.invoice_code == header.invoice_code) {
            return Err(StoreError::Conflict(format!("orders_invoice_code_key ({})", header.invoice_code)));
        }
        self.staged.orders.push(header.clone());
        Ok(())
    }

    async fn insert_order_line(&mut self, line: &OrderLine) -> StoreResult<()> {
        if !self.staged.orders.iter().any(|o| o.id == line.order_id) {
            return Err(StoreError::MissingRow("order"));
        }
        if self.staged.snapshot(line.snapshot_id).is_none() {
            return Err(StoreError::MissingRow("snapshot"));
        }
        self.staged.lines.push(line.clone());
        Ok(())
    }

    async fn set_order_total(&mut self, order_id: OrderId, total: Money) -> StoreResult<OrderHeader> {
        let header = self.staged.orders.iter_mut().find(|o| o.id == order_id).ok_or(StoreError::MissingRow("order"))?;
        header.total_price = total;
        header.updated_at = Utc::now().trunc_subsecs(6);
        Ok(header.clone())
    }

    async fn decrement_stock(&mut self, id: CatalogEntryId, qty: Quantity) -> StoreResult<StockOutcome> {
        if let Some(delay) = self.stock_delay {
            tokio::time::sleep(delay).await;
        }
        let entry = self.staged.entries.get_mut(&id).ok_or(StoreError::MissingRow("catalog entry"))?;
        Ok(entry.take_stock(qty, Utc::now().trunc_subsecs(6)))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit failed".into()));
        }
        let MemoryUnitOfWork { mut guard, staged, .. } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::catalog_entry::tests::draft;

    #[tokio::test]
    async fn test_uncommitted_unit_leaves_no_trace() {
        let storage = MemoryStorage::new();
        let entry = CatalogEntry::create(draft("Gula", "10", 5), Utc::now()).unwrap();
        let id = entry.id;
        {
            let mut uow = storage.begin().await.unwrap();
            uow.insert_catalog_entry(&entry).await.unwrap();
        }
        assert!(storage.find_catalog_entry(id).await.unwrap().is_none());

        let mut uow = storage.begin().await.unwrap();
        uow.insert_catalog_entry(&entry).await.unwrap();
        uow.commit().await.unwrap();
        assert_eq!(storage.stock_of(id).await, Some(5));
    }

    #[tokio::test]
    async fn test_decrement_is_conditional() {
        let storage = MemoryStorage::new();
        let entry = CatalogEntry::create(draft("Gula", "10", 2), Utc::now()).unwrap();
        storage.seed_catalog_entry(entry.clone()).await;

        let mut uow = storage.begin().await.unwrap();
        let three = Quantity::new(3).unwrap();
        assert_eq!(uow.decrement_stock(entry.id, three).await.unwrap(), StockOutcome::Insufficient { available: 2 });
        let two = Quantity::new(2).unwrap();
        assert_eq!(uow.decrement_stock(entry.id, two).await.unwrap(), StockOutcome::Decremented { remaining: 0 });
        uow.commit().await.unwrap();
        assert_eq!(storage.stock_of(entry.id).await, Some(0));
    }

    #[tokio::test]
    async fn test_update_keeps_ledger_stock() {
        let storage = MemoryStorage::new();
        let entry = CatalogEntry::create(draft("Gula", "10", 4), Utc::now()).unwrap();
        storage.seed_catalog_entry(entry.clone()).await;

        let mut uow = storage.begin().await.unwrap();
        uow.decrement_stock(entry.id, Quantity::new(1).unwrap()).await.unwrap();
        let mut stale = entry.clone();
        stale.consumer_price = "12".into();
        uow.update_catalog_entry(&stale).await.unwrap();
        uow.commit().await.unwrap();

        let stored = storage.find_catalog_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.stock(), 3);
        assert_eq!(stored.consumer_price, "12");
    }
}
