//! Cart: the requested lines of an order before anything is persisted

use serde::Deserialize;

use super::order::OrderError;
use crate::domain::value_objects::{AddressId, PaymentMethod, Quantity, SnapshotId};

#[derive(Clone, Debug, Deserialize)]
pub struct CartLine {
    pub snapshot_id: SnapshotId,
    pub quantity: i32,
}

/// Unchecked order request as received from a caller.
#[derive(Clone, Debug, Deserialize)]
pub struct Cart {
    pub shipping_address_id: AddressId,
    pub payment_method: String,
    pub lines: Vec<CartLine>,
}

/// A cart that passed validation. Line order is preserved.
#[derive(Clone, Debug)]
pub struct Checkout {
    pub shipping_address_id: AddressId,
    pub payment_method: PaymentMethod,
    pub lines: Vec<(SnapshotId, Quantity)>,
}

impl Cart {
    pub fn new(shipping_address_id: AddressId, payment_method: impl Into<String>) -> Self {
        Self { shipping_address_id, payment_method: payment_method.into(), lines: vec![] }
    }

    /// Appends a line. The same snapshot may appear more than once; lines are not merged.
    pub fn with_line(mut self, snapshot_id: SnapshotId, quantity: i32) -> Self {
        self.lines.push(CartLine { snapshot_id, quantity });
        self
    }

    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    pub fn validate(self) -> Result<Checkout, OrderError> {
        if self.lines.is_empty() {
            return Err(OrderError::InvalidInput("cart has no items".into()));
        }
        let payment_method = PaymentMethod::new(self.payment_method)
            .map_err(|e| OrderError::InvalidInput(e.to_string()))?;
        let lines = self
            .lines
            .into_iter()
            .enumerate()
            .map(|(idx, l)| {
                Quantity::new(l.quantity)
                    .map(|q| (l.snapshot_id, q))
                    .map_err(|e| OrderError::InvalidInput(format!("line {idx}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Checkout { shipping_address_id: self.shipping_address_id, payment_method, lines })
    }
}
