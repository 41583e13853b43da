//! Domain events, published after commit
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::aggregates::{CatalogEntry, Order, PriceSnapshot};
use crate::domain::value_objects::{CatalogEntryId, InvoiceCode, Money, OrderId, SnapshotId, UserId};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    CatalogEntryCreated { catalog_entry_id: CatalogEntryId, snapshot_id: SnapshotId, stock: i32, at: DateTime<Utc> },
    OrderPlaced { order_id: OrderId, user_id: UserId, invoice_code: InvoiceCode, total: Money, lines: usize, at: DateTime<Utc> },
}

impl DomainEvent {
    pub fn catalog_entry_created(entry: &CatalogEntry, snapshot: &PriceSnapshot) -> Self {
        Self::CatalogEntryCreated {
            catalog_entry_id: entry.id, snapshot_id: snapshot.id(), stock: entry.stock(), at: snapshot.created_at(),
        }
    }

    pub fn order_placed(order: &Order) -> Self {
        Self::OrderPlaced {
            order_id: order.id(), user_id: order.user_id(), invoice_code: order.invoice_code().clone(),
            total: order.total(), lines: order.lines().len(), at: order.header().updated_at,
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Self::CatalogEntryCreated { .. } => "catalog.entry.created",
            Self::OrderPlaced { .. } => "orders.placed",
        }
    }
}

/// Best-effort NATS publisher. A missing client turns publishing into a no-op.
#[derive(Clone, Default)]
pub struct EventSink {
    nats: Option<async_nats::Client>,
}

impl EventSink {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }
    pub fn disabled() -> Self { Self { nats: None } }

    /// Never fails the caller: the state change is already committed.
    pub async fn publish(&self, event: DomainEvent) {
        let Some(client) = &self.nats else { return };
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(subject = event.subject(), error = %e, "failed to encode domain event");
                return;
            }
        };
        if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
            tracing::warn!(subject = event.subject(), error = %e, "failed to publish domain event");
        }
    }
}
