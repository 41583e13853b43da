//! Catalog Entry Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::value_objects::{CatalogEntryId, CategoryId, Money, Quantity, Slug, StoreId};
use crate::store::{StockOutcome, StoreError};

/// A sellable product listing with a live stock counter.
///
/// Prices are kept as the raw stored text; they are only interpreted when an order
/// line is priced from a snapshot. `stock` has no setter: it changes only through
/// the stock ledger operation of a storage backend.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct CatalogEntry {
    pub id: CatalogEntryId,
    pub name: String,
    pub slug: Slug,
    pub reseller_price: String,
    pub consumer_price: String,
    stock: i32,
    pub description: String,
    pub category_id: CategoryId,
    pub store_id: StoreId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new listing. `slug` is generated from the name when absent.
#[derive(Clone, Debug, Deserialize)]
pub struct NewCatalogEntry {
    pub name: String,
    pub slug: Option<String>,
    pub reseller_price: String,
    pub consumer_price: String,
    pub stock: i32,
    #[serde(default)]
    pub description: String,
    pub category_id: CategoryId,
    pub store_id: StoreId,
}

/// Editable catalog fields. Stock is not editable.
#[derive(Clone, Debug, Deserialize)]
pub struct CatalogUpdate {
    pub name: String,
    pub slug: Option<String>,
    pub reseller_price: String,
    pub consumer_price: String,
    #[serde(default)]
    pub description: String,
    pub category_id: CategoryId,
}

impl CatalogEntry {
    pub fn create(draft: NewCatalogEntry, now: DateTime<Utc>) -> Result<Self, CatalogError> {
        if draft.name.trim().is_empty() { return Err(CatalogError::InvalidInput("name is required".into())); }
        if draft.stock < 0 { return Err(CatalogError::InvalidInput(format!("stock must not be negative, got {}", draft.stock))); }
        check_price("reseller_price", &draft.reseller_price)?;
        check_price("consumer_price", &draft.consumer_price)?;
        let slug = resolve_slug(draft.slug.as_deref(), &draft.name, now)?;
        Ok(Self {
            id: CatalogEntryId::new(), name: draft.name.trim().to_string(), slug,
            reseller_price: draft.reseller_price.trim().to_string(), consumer_price: draft.consumer_price.trim().to_string(),
            stock: draft.stock, description: draft.description, category_id: draft.category_id, store_id: draft.store_id,
            created_at: now, updated_at: now,
        })
    }

    pub fn stock(&self) -> i32 { self.stock }
    pub fn is_in_stock(&self) -> bool { self.stock > 0 }

    /// Applies a catalog edit. Existing snapshots are separate rows and keep their prices.
    pub fn apply(&mut self, update: CatalogUpdate, now: DateTime<Utc>) -> Result<(), CatalogError> {
        if update.name.trim().is_empty() { return Err(CatalogError::InvalidInput("name is required".into())); }
        check_price("reseller_price", &update.reseller_price)?;
        check_price("consumer_price", &update.consumer_price)?;
        if let Some(raw) = update.slug.as_deref().filter(|s| !s.trim().is_empty()) {
            self.slug = Slug::new(raw).map_err(|e| CatalogError::InvalidInput(e.to_string()))?;
        }
        self.name = update.name.trim().to_string();
        self.reseller_price = update.reseller_price.trim().to_string();
        self.consumer_price = update.consumer_price.trim().to_string();
        self.description = update.description;
        self.category_id = update.category_id;
        self.updated_at = now;
        Ok(())
    }

    /// Conditional decrement used by in-process storage. Never lets stock go negative.
    pub(crate) fn take_stock(&mut self, qty: Quantity, now: DateTime<Utc>) -> StockOutcome {
        if self.stock < qty.value() {
            return StockOutcome::Insufficient { available: self.stock };
        }
        self.stock -= qty.value();
        self.updated_at = now;
        StockOutcome::Decremented { remaining: self.stock }
    }
}

fn check_price(field: &'static str, raw: &str) -> Result<(), CatalogError> {
    Money::parse(raw)
        .map(|_| ())
        .map_err(|e| CatalogError::InvalidPrice { field, value: raw.to_string(), reason: e.to_string() })
}

fn resolve_slug(requested: Option<&str>, name: &str, now: DateTime<Utc>) -> Result<Slug, CatalogError> {
    let slug = match requested.filter(|s| !s.trim().is_empty()) {
        Some(raw) => Slug::new(raw),
        None => Slug::from_name(name, now),
    };
    slug.map_err(|e| CatalogError::InvalidInput(format!("slug: {e}")))
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid {field} {value:?}: {reason}")]
    InvalidPrice { field: &'static str, value: String, reason: String },

    #[error("slug already taken ({0})")]
    SlugTaken(String),

    /// The caller does not run the store the entry belongs to.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("catalog entry not found")]
    NotFound,

    #[error(transparent)]
    Storage(StoreError),
}

impl From<StoreError> for CatalogError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(detail) => CatalogError::SlugTaken(detail),
            other => CatalogError::Storage(other),
        }
    }
}
