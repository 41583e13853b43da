//! HTTP surface (axum).

pub mod errors;
pub mod identity;

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Cart, CartLine, CatalogUpdate, NewCatalogEntry, Order};
use crate::domain::value_objects::{AddressId, CatalogEntryId, CategoryId, OrderId, SnapshotId, StoreId};
use crate::service::{CatalogListing, CatalogService, OrderService};
use crate::store::Page;
use errors::validation_error;
use identity::CurrentUser;

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderService>,
    pub catalog: Arc<dyn CatalogService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront-orders"})) }))
        .route("/api/v1/products", get(list_products).post(create_product))
        .route("/api/v1/products/:id", get(get_product).put(update_product))
        .route("/api/v1/snapshots/:id", get(get_snapshot))
        .route("/api/v1/orders", get(list_orders).post(create_order))
        .route("/api/v1/orders/:id", get(get_order))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 255))]
    pub slug: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub reseller_price: String,
    #[validate(length(min = 1, max = 255))]
    pub consumer_price: String,
    #[validate(range(min = 0))]
    pub stock: i32,
    #[serde(default)]
    pub description: String,
    pub category_id: Uuid,
    pub store_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 255))]
    pub slug: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub reseller_price: String,
    #[validate(length(min = 1, max = 255))]
    pub consumer_price: String,
    #[serde(default)]
    pub description: String,
    pub category_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ProductListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ProductPage { pub data: Vec<CatalogListing>, pub page: u32, pub per_page: u32 }

async fn list_products(State(s): State<AppState>, Query(p): Query<ProductListParams>) -> Response {
    let page = Page::new(p.page, p.per_page);
    match s.catalog.list_entries(p.category_id.map(CategoryId::from_uuid), page).await {
        Ok(data) => Json(ProductPage { data, page: page.page, per_page: page.per_page }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn create_product(State(s): State<AppState>, CurrentUser(seller): CurrentUser, Json(r): Json<CreateProductRequest>) -> Response {
    if let Err(e) = r.validate() { return validation_error(e); }
    let draft = NewCatalogEntry {
        name: r.name, slug: r.slug, reseller_price: r.reseller_price, consumer_price: r.consumer_price,
        stock: r.stock, description: r.description,
        category_id: CategoryId::from_uuid(r.category_id), store_id: StoreId::from_uuid(r.store_id),
    };
    match s.catalog.create_entry(seller, draft).await {
        Ok((entry, snapshot)) => (StatusCode::CREATED, Json(CatalogListing { entry, snapshots: vec![snapshot] })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let id = CatalogEntryId::from_uuid(id);
    let entry = match s.catalog.find_entry(id).await { Ok(e) => e, Err(e) => return e.into_response() };
    match s.catalog.snapshots_for(id).await {
        Ok(snapshots) => Json(CatalogListing { entry, snapshots }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn update_product(
    State(s): State<AppState>,
    CurrentUser(seller): CurrentUser,
    Path(id): Path<Uuid>,
    Json(r): Json<UpdateProductRequest>,
) -> Response {
    if let Err(e) = r.validate() { return validation_error(e); }
    let update = CatalogUpdate {
        name: r.name, slug: r.slug, reseller_price: r.reseller_price, consumer_price: r.consumer_price,
        description: r.description, category_id: CategoryId::from_uuid(r.category_id),
    };
    match s.catalog.update_entry(seller, CatalogEntryId::from_uuid(id), update).await {
        Ok(entry) => Json(entry).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_snapshot(State(s): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match s.catalog.find_snapshot(SnapshotId::from_uuid(id)).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OrderItemRequest {
    pub snapshot_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub shipping_address_id: Uuid,
    pub payment_method: String,
    #[validate(length(max = 100))]
    pub items: Vec<OrderItemRequest>,
}

impl From<CreateOrderRequest> for Cart {
    fn from(r: CreateOrderRequest) -> Self {
        Cart {
            shipping_address_id: AddressId::from_uuid(r.shipping_address_id),
            payment_method: r.payment_method,
            lines: r.items.into_iter().map(|i| CartLine { snapshot_id: SnapshotId::from_uuid(i.snapshot_id), quantity: i.quantity }).collect(),
        }
    }
}

async fn create_order(State(s): State<AppState>, CurrentUser(user_id): CurrentUser, Json(r): Json<CreateOrderRequest>) -> Response {
    if let Err(e) = r.validate() { return validation_error(e); }
    match s.orders.create_order(user_id, r.into()).await {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams { pub page: Option<u32>, pub per_page: Option<u32> }

#[derive(Debug, Serialize)]
pub struct OrderPage { pub data: Vec<Order>, pub page: u32, pub per_page: u32 }

async fn list_orders(State(s): State<AppState>, CurrentUser(user_id): CurrentUser, Query(p): Query<ListParams>) -> Response {
    let page = Page::new(p.page, p.per_page);
    match s.orders.list_orders(user_id, page).await {
        Ok(data) => Json(OrderPage { data, page: page.page, per_page: page.per_page }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_order(State(s): State<AppState>, CurrentUser(user_id): CurrentUser, Path(id): Path<Uuid>) -> Response {
    match s.orders.get_order(user_id, OrderId::from_uuid(id)).await {
        Ok(order) => Json(order).into_response(),
        Err(e) => e.into_response(),
    }
}
