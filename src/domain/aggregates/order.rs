//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::snapshot::PriceSnapshot;
use crate::domain::value_objects::{
    AddressId, CatalogEntryId, InvoiceCode, Money, MoneyError, OrderId, OrderLineId, PaymentMethod,
    Quantity, SnapshotId, StoreId, UserId,
};
use crate::store::StoreError;

/// Order header row. `total_price` is zero until every line has been priced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderHeader {
    pub id: OrderId,
    pub user_id: UserId,
    pub shipping_address_id: AddressId,
    pub payment_method: PaymentMethod,
    pub invoice_code: InvoiceCode,
    pub total_price: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    /// Zero-based position in the requested cart.
    pub line_no: i32,
    pub snapshot_id: SnapshotId,
    pub store_id: StoreId,
    pub quantity: Quantity,
    pub subtotal: Money,
    pub created_at: DateTime<Utc>,
}

impl OrderHeader {
    pub fn open(user_id: UserId, shipping_address_id: AddressId, payment_method: PaymentMethod, now: DateTime<Utc>) -> Self {
        let id = OrderId::new();
        Self {
            id, user_id, shipping_address_id, payment_method,
            invoice_code: InvoiceCode::issue(&id, now),
            total_price: Money::ZERO, created_at: now, updated_at: now,
        }
    }
}

impl OrderLine {
    /// Prices `quantity` units of `snapshot`. The store is copied from the snapshot so
    /// a single cart can span stores.
    pub fn price(order_id: OrderId, line_no: i32, snapshot: &PriceSnapshot, quantity: Quantity, now: DateTime<Utc>) -> Result<Self, OrderError> {
        let unit = snapshot.unit_price().map_err(|_| OrderError::InvalidPrice {
            snapshot_id: snapshot.id(),
            value: snapshot.consumer_price().to_string(),
        })?;
        let subtotal = unit
            .checked_mul(quantity)
            .map_err(|_| OrderError::InvalidInput(format!("subtotal overflows for snapshot {}", snapshot.id())))?;
        Ok(Self { id: OrderLineId::new(), order_id, line_no, snapshot_id: snapshot.id(), store_id: snapshot.store_id(), quantity, subtotal, created_at: now })
    }
}

/// An order header together with its lines.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Order {
    #[serde(flatten)]
    header: OrderHeader,
    lines: Vec<OrderLine>,
}

impl Order {
    /// Starts building an order from a freshly inserted header.
    pub fn open(header: OrderHeader) -> Self { Self { header, lines: vec![] } }

    /// Reassembles a persisted order.
    pub fn from_parts(header: OrderHeader, lines: Vec<OrderLine>) -> Self { Self { header, lines } }

    pub fn id(&self) -> OrderId { self.header.id }
    pub fn user_id(&self) -> UserId { self.header.user_id }
    pub fn invoice_code(&self) -> &InvoiceCode { &self.header.invoice_code }
    pub fn total(&self) -> Money { self.header.total_price }
    pub fn header(&self) -> &OrderHeader { &self.header }
    pub fn lines(&self) -> &[OrderLine] { &self.lines }

    pub fn add_line(&mut self, line: OrderLine) -> Result<(), OrderError> {
        if line.order_id != self.header.id {
            return Err(OrderError::InvalidInput(format!("line {} belongs to order {}", line.id, line.order_id)));
        }
        self.lines.push(line);
        Ok(())
    }

    /// Sum of the line subtotals.
    pub fn lines_total(&self) -> Result<Money, OrderError> {
        self.lines
            .iter()
            .try_fold(Money::ZERO, |acc, l| acc.checked_add(l.subtotal))
            .map_err(|_: MoneyError| OrderError::InvalidInput("order total overflows".into()))
    }

    /// Installs the header carrying the persisted total, checking it against the lines.
    pub fn close(&mut self, header: OrderHeader) -> Result<(), OrderError> {
        let expected = self.lines_total()?;
        if header.id != self.header.id || header.total_price != expected {
            return Err(OrderError::TotalMismatch { expected, stored: header.total_price });
        }
        self.header = header;
        Ok(())
    }

    pub fn is_consistent(&self) -> bool {
        self.lines_total().map(|t| t == self.header.total_price).unwrap_or(false)
    }
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("snapshot {snapshot_id} has a non-numeric consumer price {value:?}")]
    InvalidPrice { snapshot_id: SnapshotId, value: String },

    #[error("line {line}: snapshot {snapshot_id} not found")]
    SnapshotNotFound { line: usize, snapshot_id: SnapshotId },

    #[error("line {line}: catalog entry {catalog_entry_id} out of stock (requested {requested}, available {available})")]
    OutOfStock { line: usize, catalog_entry_id: CatalogEntryId, requested: i32, available: i32 },

    #[error("order not found")]
    NotFound,

    #[error("stored total {stored} does not match line total {expected}")]
    TotalMismatch { expected: Money, stored: Money },

    #[error(transparent)]
    Storage(#[from] StoreError),
}
