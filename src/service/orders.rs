//! Order placement and the per-user order queries.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use tracing::{debug, info, instrument, warn};

use super::OrderService;
use crate::config::OrderSettings;
use crate::domain::aggregates::{Cart, Checkout, Order, OrderError, OrderHeader, OrderLine};
use crate::domain::events::{DomainEvent, EventSink};
use crate::domain::value_objects::{OrderId, UserId};
use crate::store::{settle, Page, StockOutcome, Storage, StoreError, UnitOfWork};

pub struct Fulfillment<S> {
    storage: Arc<S>,
    settings: OrderSettings,
    events: EventSink,
}

impl<S: Storage> Fulfillment<S> {
    pub fn new(storage: Arc<S>, settings: OrderSettings, events: EventSink) -> Self {
        Self { storage, settings, events }
    }

    /// Runs the whole order inside one unit of work.
    async fn place(&self, user_id: UserId, checkout: Checkout) -> Result<Order, OrderError> {
        let mut uow = self.storage.begin().await?;
        let result = build_order(uow.as_mut(), &self.settings, user_id, checkout).await;
        settle(uow, result).await
    }
}

/// Header, then every line in request order (price, persist, take stock), then the
/// total. Any error leaves the unit of work to be rolled back by the caller.
async fn build_order(uow: &mut dyn UnitOfWork, settings: &OrderSettings, user_id: UserId, checkout: Checkout) -> Result<Order, OrderError> {
    if settings.verify_address_ownership && !uow.address_belongs_to(user_id, checkout.shipping_address_id).await? {
        return Err(OrderError::InvalidInput(format!(
            "shipping address {} does not belong to the user",
            checkout.shipping_address_id
        )));
    }

    // microseconds: what Postgres keeps, so the returned order equals the stored one
    let now = Utc::now().trunc_subsecs(6);
    let header = OrderHeader::open(user_id, checkout.shipping_address_id, checkout.payment_method, now);
    uow.insert_order(&header).await?;
    let mut order = Order::open(header);

    for (line, (snapshot_id, quantity)) in checkout.lines.into_iter().enumerate() {
        let snapshot = uow
            .find_snapshot(snapshot_id)
            .await?
            .ok_or(OrderError::SnapshotNotFound { line, snapshot_id })?;

        let priced = OrderLine::price(order.id(), line_number(line)?, &snapshot, quantity, now)?;
        uow.insert_order_line(&priced).await?;

        match uow.decrement_stock(snapshot.catalog_entry_id(), quantity).await? {
            StockOutcome::Decremented { remaining } => {
                debug!(line, catalog_entry_id = %snapshot.catalog_entry_id(), remaining, "stock taken");
            }
            StockOutcome::Insufficient { available } => {
                return Err(OrderError::OutOfStock {
                    line,
                    catalog_entry_id: snapshot.catalog_entry_id(),
                    requested: quantity.value(),
                    available,
                });
            }
        }
        order.add_line(priced)?;
    }

    let total = order.lines_total()?;
    let header = uow.set_order_total(order.id(), total).await?;
    order.close(header)?;
    Ok(order)
}

fn line_number(line: usize) -> Result<i32, OrderError> {
    i32::try_from(line).map_err(|_| OrderError::InvalidInput(format!("line {line}: cart has too many lines")))
}

#[async_trait]
impl<S: Storage> OrderService for Fulfillment<S> {
    #[instrument(skip(self, cart), fields(user_id = %user_id, lines = cart.lines.len()))]
    async fn create_order(&self, user_id: UserId, cart: Cart) -> Result<Order, OrderError> {
        let checkout = cart.validate()?;

        // Dropping the unfinished future on timeout drops the unit of work, which
        // rolls it back.
        let order = match tokio::time::timeout(self.settings.timeout, self.place(user_id, checkout)).await {
            Ok(Ok(order)) => order,
            Ok(Err(e)) => {
                match &e {
                    OrderError::Storage(err) => tracing::error!(error = %err, "order failed in storage"),
                    other => info!(reason = %other, "order rejected"),
                }
                return Err(e);
            }
            Err(_) => {
                warn!(timeout = ?self.settings.timeout, "order timed out, rolled back");
                return Err(StoreError::Timeout(self.settings.timeout).into());
            }
        };

        info!(order_id = %order.id(), invoice_code = %order.invoice_code(), total = %order.total(), "order placed");
        self.events.publish(DomainEvent::order_placed(&order)).await;
        Ok(order)
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn list_orders(&self, user_id: UserId, page: Page) -> Result<Vec<Order>, OrderError> {
        Ok(self.storage.list_orders(user_id, page).await?)
    }

    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    async fn get_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order, OrderError> {
        self.storage.find_order(user_id, order_id).await?.ok_or(OrderError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_number_is_checked() {
        assert_eq!(line_number(0).unwrap(), 0);
        assert_eq!(line_number(i32::MAX as usize).unwrap(), i32::MAX);
        assert!(matches!(line_number(i32::MAX as usize + 1), Err(OrderError::InvalidInput(_))));
    }
}
