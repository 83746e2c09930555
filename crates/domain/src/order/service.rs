//! Order service: the entry point for placing, reading and updating orders.

use std::sync::Arc;

use common::{OrderId, ProductId};
use order_store::{Order, OrderStore, Product};

use crate::clock::{Clock, SystemClock};
use crate::config::PlacementConfig;
use crate::error::OrderError;
use crate::services::{AddressBook, NotificationSender, OrderSummary};

/// Service for managing orders.
///
/// Generic over the store; the address book, notifier and clock are shared
/// trait objects so one service value can be cloned into request handlers
/// behind an `Arc`.
pub struct OrderService<S: OrderStore> {
    pub(super) store: S,
    pub(super) addresses: Arc<dyn AddressBook>,
    pub(super) notifier: Arc<dyn NotificationSender>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: PlacementConfig,
}

impl<S: OrderStore> OrderService<S> {
    /// Creates a service using the wall clock.
    pub fn new(
        store: S,
        addresses: Arc<dyn AddressBook>,
        notifier: Arc<dyn NotificationSender>,
        config: PlacementConfig,
    ) -> Self {
        Self {
            store,
            addresses,
            notifier,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Loads an order with its lines.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| OrderError::not_found("Order", order_id))
    }

    /// Adds stock to a product. Takes the same row lock as placement.
    #[tracing::instrument(skip(self))]
    pub async fn restock(&self, product_id: ProductId, quantity: u32) -> Result<Product, OrderError> {
        if quantity == 0 {
            return Err(OrderError::Validation(
                "restock quantity must be greater than zero".to_string(),
            ));
        }

        let product = self.store.restock(product_id, quantity).await?;
        tracing::info!(%product_id, added = quantity, stock = product.stock, "product restocked");
        Ok(product)
    }

    /// Sends the placement notification on a detached task.
    pub(super) fn dispatch_notification(&self, order: &Order) {
        let notifier = Arc::clone(&self.notifier);
        let summary = OrderSummary::from_order(order);
        let recipient = order.customer_id;

        tokio::spawn(async move {
            if let Err(e) = notifier.send(&summary, recipient).await {
                metrics::counter!("order_notifications_failed_total").increment(1);
                tracing::warn!(order_code = %summary.code, error = %e, "order notification failed");
            }
        });
    }
}
