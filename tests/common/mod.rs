#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use storefront_orders::{
    AddressId, Catalog, CatalogEntry, CatalogService, CategoryId, EventSink, Fulfillment, MemoryStorage,
    NewCatalogEntry, OrderSettings, PriceSnapshot, StoreId, UserId,
};

pub struct Shop {
    pub storage: Arc<MemoryStorage>,
    pub orders: Arc<Fulfillment<MemoryStorage>>,
    pub catalog: Arc<Catalog<MemoryStorage>>,
    /// Runs `store`; every fixture listing is created by this seller.
    pub seller: UserId,
    pub store: StoreId,
}

pub fn settings() -> OrderSettings {
    OrderSettings { timeout: Duration::from_secs(5), verify_address_ownership: true }
}

pub async fn shop() -> Shop {
    shop_with(settings()).await
}

pub async fn shop_with(settings: OrderSettings) -> Shop {
    let storage = Arc::new(MemoryStorage::new());
    let (seller, store) = (UserId::new(), StoreId::new());
    storage.seed_store(seller, store).await;
    Shop {
        orders: Arc::new(Fulfillment::new(storage.clone(), settings, EventSink::disabled())),
        catalog: Arc::new(Catalog::new(storage.clone(), EventSink::disabled())),
        storage,
        seller,
        store,
    }
}

pub fn draft(store_id: StoreId, name: &str, consumer_price: &str, stock: i32) -> NewCatalogEntry {
    NewCatalogEntry {
        name: name.to_string(),
        slug: None,
        reseller_price: "1".to_string(),
        consumer_price: consumer_price.to_string(),
        stock,
        description: format!("{name}, fresh"),
        category_id: CategoryId::new(),
        store_id,
    }
}

impl Shop {
    pub fn draft(&self, name: &str, consumer_price: &str, stock: i32) -> NewCatalogEntry {
        draft(self.store, name, consumer_price, stock)
    }

    /// Lists an item through the catalog service; returns the entry and its snapshot.
    pub async fn list_item(&self, name: &str, price: &str, stock: i32) -> (CatalogEntry, PriceSnapshot) {
        let mut d = self.draft(name, price, stock);
        d.slug = Some(format!("{}-{}", name.to_lowercase().replace(' ', "-"), uuid::Uuid::new_v4().simple()));
        self.catalog.create_entry(self.seller, d).await.expect("catalog entry")
    }

    /// A user with one registered shipping address.
    pub async fn buyer(&self) -> (UserId, AddressId) {
        let user = UserId::new();
        let address = AddressId::new();
        self.storage.seed_address(user, address).await;
        (user, address)
    }

    pub async fn stock(&self, entry: &CatalogEntry) -> i32 {
        self.storage.stock_of(entry.id).await.expect("entry exists")
    }
}
