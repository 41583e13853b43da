use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use super::CatalogService;
use crate::domain::aggregates::{CatalogEntry, CatalogError, CatalogUpdate, NewCatalogEntry, PriceSnapshot};
use crate::domain::events::{DomainEvent, EventSink};
use crate::domain::value_objects::{CatalogEntryId, CategoryId, SnapshotId, StoreId, UserId};
use crate::store::{settle, Page, Storage, UnitOfWork};

/// Catalog management: the only place price snapshots are taken.
pub struct Catalog<S> {
    storage: Arc<S>,
    events: EventSink,
}

/// An entry together with the snapshots buyers order from.
#[derive(Clone, Debug, Serialize)]
pub struct CatalogListing {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    pub snapshots: Vec<PriceSnapshot>,
}

impl<S: Storage> Catalog<S> {
    pub fn new(storage: Arc<S>, events: EventSink) -> Self {
        Self { storage, events }
    }
}

async fn ensure_store_owner(uow: &mut dyn UnitOfWork, seller: UserId, store_id: StoreId) -> Result<(), CatalogError> {
    match uow.store_owner(store_id).await? {
        Some(owner) if owner == seller => Ok(()),
        Some(_) => Err(CatalogError::Forbidden(format!("store {store_id} belongs to another seller"))),
        None => Err(CatalogError::Forbidden(format!("store {store_id} is not registered"))),
    }
}

async fn write_new_entry(uow: &mut dyn UnitOfWork, seller: UserId, entry: &CatalogEntry, snapshot: &PriceSnapshot) -> Result<(), CatalogError> {
    ensure_store_owner(uow, seller, entry.store_id).await?;
    uow.insert_catalog_entry(entry).await?;
    uow.insert_snapshot(snapshot).await?;
    Ok(())
}

async fn write_update(uow: &mut dyn UnitOfWork, seller: UserId, id: CatalogEntryId, update: CatalogUpdate) -> Result<CatalogEntry, CatalogError> {
    let mut entry = uow.lock_catalog_entry(id).await?.ok_or(CatalogError::NotFound)?;
    ensure_store_owner(uow, seller, entry.store_id).await?;
    entry.apply(update, Utc::now().trunc_subsecs(6))?;
    uow.update_catalog_entry(&entry).await?;
    Ok(entry)
}

#[async_trait]
impl<S: Storage> CatalogService for Catalog<S> {
    #[instrument(skip(self, draft), fields(seller = %seller, store_id = %draft.store_id, name = %draft.name), err)]
    async fn create_entry(&self, seller: UserId, draft: NewCatalogEntry) -> Result<(CatalogEntry, PriceSnapshot), CatalogError> {
        let now = Utc::now().trunc_subsecs(6);
        let entry = CatalogEntry::create(draft, now)?;
        let snapshot = PriceSnapshot::capture(&entry, now);

        let mut uow = self.storage.begin().await?;
        let result = write_new_entry(uow.as_mut(), seller, &entry, &snapshot).await;
        settle(uow, result).await?;

        info!(catalog_entry_id = %entry.id, snapshot_id = %snapshot.id(), slug = %entry.slug, "catalog entry created");
        self.events.publish(DomainEvent::catalog_entry_created(&entry, &snapshot)).await;
        Ok((entry, snapshot))
    }

    #[instrument(skip(self, update), fields(seller = %seller, catalog_entry_id = %id), err)]
    async fn update_entry(&self, seller: UserId, id: CatalogEntryId, update: CatalogUpdate) -> Result<CatalogEntry, CatalogError> {
        let mut uow = self.storage.begin().await?;
        let result = write_update(uow.as_mut(), seller, id, update).await;
        let entry = settle(uow, result).await?;
        info!(catalog_entry_id = %entry.id, "catalog entry updated");
        Ok(entry)
    }

    async fn find_entry(&self, id: CatalogEntryId) -> Result<CatalogEntry, CatalogError> {
        self.storage.find_catalog_entry(id).await?.ok_or(CatalogError::NotFound)
    }

    async fn find_snapshot(&self, id: SnapshotId) -> Result<PriceSnapshot, CatalogError> {
        self.storage.find_snapshot(id).await?.ok_or(CatalogError::NotFound)
    }

    async fn snapshots_for(&self, id: CatalogEntryId) -> Result<Vec<PriceSnapshot>, CatalogError> {
        if self.storage.find_catalog_entry(id).await?.is_none() {
            return Err(CatalogError::NotFound);
        }
        Ok(self.storage.snapshots_for(id).await?)
    }

    async fn list_entries(&self, category: Option<CategoryId>, page: Page) -> Result<Vec<CatalogListing>, CatalogError> {
        let entries = self.storage.list_catalog_entries(category, page).await?;
        let ids: Vec<CatalogEntryId> = entries.iter().map(|e| e.id).collect();

        let mut by_entry: HashMap<CatalogEntryId, Vec<PriceSnapshot>> = HashMap::new();
        for snapshot in self.storage.snapshots_for_entries(&ids).await? {
            by_entry.entry(snapshot.catalog_entry_id()).or_default().push(snapshot);
        }
        Ok(entries
            .into_iter()
            .map(|entry| CatalogListing { snapshots: by_entry.remove(&entry.id).unwrap_or_default(), entry })
            .collect())
    }
}
