//! Price Snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog_entry::CatalogEntry;
use crate::domain::value_objects::{CatalogEntryId, CategoryId, Money, MoneyError, SnapshotId, Slug, StoreId};

/// Immutable copy of a catalog entry's pricing and description.
///
/// Order lines are always priced from a snapshot, never from the live entry.
/// There are no setters and storage backends expose no update path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceSnapshot {
    id: SnapshotId,
    catalog_entry_id: CatalogEntryId,
    name: String,
    slug: Slug,
    reseller_price: String,
    consumer_price: String,
    description: String,
    category_id: CategoryId,
    store_id: StoreId,
    initial_stock: i32,
    created_at: DateTime<Utc>,
}

impl PriceSnapshot {
    pub fn capture(entry: &CatalogEntry, now: DateTime<Utc>) -> Self {
        Self {
            id: SnapshotId::new(),
            catalog_entry_id: entry.id,
            name: entry.name.clone(),
            slug: entry.slug.clone(),
            reseller_price: entry.reseller_price.clone(),
            consumer_price: entry.consumer_price.clone(),
            description: entry.description.clone(),
            category_id: entry.category_id,
            store_id: entry.store_id,
            initial_stock: entry.stock(),
            created_at: now,
        }
    }

    pub fn id(&self) -> SnapshotId { self.id }
    pub fn catalog_entry_id(&self) -> CatalogEntryId { self.catalog_entry_id }
    pub fn name(&self) -> &str { &self.name }
    pub fn slug(&self) -> &Slug { &self.slug }
    pub fn reseller_price(&self) -> &str { &self.reseller_price }
    pub fn consumer_price(&self) -> &str { &self.consumer_price }
    pub fn description(&self) -> &str { &self.description }
    pub fn category_id(&self) -> CategoryId { self.category_id }
    pub fn store_id(&self) -> StoreId { self.store_id }
    pub fn initial_stock(&self) -> i32 { self.initial_stock }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// Consumer price as money. Stored text that is not a whole number is an error.
    pub fn unit_price(&self) -> Result<Money, MoneyError> { Money::parse(&self.consumer_price) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::catalog_entry::{tests::draft, CatalogUpdate};

    #[test]
    fn test_capture_copies_entry() {
        let entry = CatalogEntry::create(draft("Sambal", "25000", 40), Utc::now()).unwrap();
        let snap = PriceSnapshot::capture(&entry, Utc::now());
        assert_eq!(snap.catalog_entry_id(), entry.id);
        assert_eq!(snap.slug(), &entry.slug);
        assert_eq!(snap.store_id(), entry.store_id);
        assert_eq!(snap.initial_stock(), 40);
        assert_eq!(snap.unit_price().unwrap(), Money::new(25000));
    }

    #[test]
    fn test_snapshot_survives_price_edit() {
        let mut entry = CatalogEntry::create(draft("Sambal", "25000", 40), Utc::now()).unwrap();
        let snap = PriceSnapshot::capture(&entry, Utc::now());
        let update = CatalogUpdate {
            name: entry.name.clone(), slug: None, reseller_price: "1".into(), consumer_price: "99999".into(),
            description: "new".into(), category_id: entry.category_id,
        };
        entry.apply(update, Utc::now()).unwrap();
        assert_eq!(snap.consumer_price(), "25000");
        assert_eq!(snap.description(), "Sambal description");
    }

    #[test]
    fn test_unit_price_rejects_malformed_text() {
        let mut entry = CatalogEntry::create(draft("Sambal", "25000", 1), Utc::now()).unwrap();
        entry.consumer_price = "25.000,00".into();
        let snap = PriceSnapshot::capture(&entry, Utc::now());
        assert_eq!(snap.unit_price(), Err(MoneyError::NotNumeric));
    }
}
