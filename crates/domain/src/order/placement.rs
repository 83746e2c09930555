//! Turning a cart into an order.
//!
//! Everything from the cart lock to the cart clear happens in one store
//! transaction. Any failure, or the timeout firing before commit, drops the
//! transaction and nothing is written.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{AddressId, CustomerId, Money, PaymentMethod, ProductId, ShipmentMethod};
use order_store::{
    LifecycleFields, NewOrder, NewOrderLine, Order, OrderStore, Product, StoreTransaction,
};
use serde::{Deserialize, Serialize};

use super::code::CodeInsertion;
use super::service::OrderService;
use super::shipping::{requires_address, shipping_cost};
use crate::error::{OrderError, StockShortage};
use crate::retry::RetryPolicy;

/// Longest accepted customer note, in characters.
pub const MAX_NOTE_LENGTH: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLineRequest {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Request to place an order from explicit lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub customer_id: CustomerId,
    pub lines: Vec<OrderLineRequest>,
    pub payment_method: PaymentMethod,
    pub shipment_method: ShipmentMethod,
    pub address_id: Option<AddressId>,
    pub note: Option<String>,
}

impl PlaceOrder {
    pub fn new(
        customer_id: CustomerId,
        lines: Vec<OrderLineRequest>,
        payment_method: PaymentMethod,
        shipment_method: ShipmentMethod,
    ) -> Self {
        Self {
            customer_id,
            lines,
            payment_method,
            shipment_method,
            address_id: None,
            note: None,
        }
    }

    pub fn with_address(mut self, address_id: AddressId) -> Self {
        self.address_id = Some(address_id);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Request to place an order from the customer's active cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutCart {
    pub customer_id: CustomerId,
    pub payment_method: PaymentMethod,
    pub shipment_method: ShipmentMethod,
    pub address_id: Option<AddressId>,
    pub note: Option<String>,
}

/// Merges duplicate products and rejects zero quantities.
///
/// The result is keyed by product id, which is also the lock order.
fn validate_lines(lines: &[OrderLineRequest]) -> Result<BTreeMap<ProductId, u32>, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyCart);
    }

    let mut merged = BTreeMap::new();
    for line in lines {
        if line.quantity == 0 {
            return Err(OrderError::Validation(format!(
                "quantity for product {} must be greater than zero",
                line.product_id
            )));
        }
        let quantity: &mut u32 = merged.entry(line.product_id).or_default();
        *quantity = quantity.checked_add(line.quantity).ok_or_else(|| {
            OrderError::Validation(format!("quantity for product {} is too large", line.product_id))
        })?;
    }
    Ok(merged)
}

/// Blank notes are dropped.
fn validate_note(note: Option<String>) -> Result<Option<String>, OrderError> {
    let Some(note) = note else {
        return Ok(None);
    };
    let trimmed = note.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_NOTE_LENGTH {
        return Err(OrderError::Validation(format!(
            "note must be at most {MAX_NOTE_LENGTH} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// Where the lines of a placement come from.
enum LineSource {
    /// Explicit lines, validated before the transaction opens.
    Requested(BTreeMap<ProductId, u32>),
    /// The customer's cart, read under its lock inside the transaction.
    Cart,
}

/// Validated input for the transactional part of a placement.
struct Draft {
    customer_id: CustomerId,
    lines: LineSource,
    payment_method: PaymentMethod,
    shipment_method: ShipmentMethod,
    address_id: Option<AddressId>,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

/// Request fields shared by both entry points.
struct Placement {
    customer_id: CustomerId,
    lines: Option<Vec<OrderLineRequest>>,
    payment_method: PaymentMethod,
    shipment_method: ShipmentMethod,
    address_id: Option<AddressId>,
    note: Option<String>,
}

fn amount_too_large(what: impl std::fmt::Display) -> OrderError {
    OrderError::Validation(format!("{what} exceeds the largest representable amount"))
}

impl<S: OrderStore> OrderService<S> {
    /// Places an order.
    ///
    /// Stock is reserved, the code assigned and the cart cleared atomically.
    /// The confirmation is sent after commit and its outcome never affects
    /// the result.
    #[tracing::instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<Order, OrderError> {
        self.place(Placement {
            customer_id: cmd.customer_id,
            lines: Some(cmd.lines),
            payment_method: cmd.payment_method,
            shipment_method: cmd.shipment_method,
            address_id: cmd.address_id,
            note: cmd.note,
        })
        .await
    }

    /// Places an order from the customer's active cart.
    ///
    /// The cart is read and cleared inside the placement transaction, so a
    /// cart converts into at most one order and items added meanwhile stay
    /// in the cart.
    #[tracing::instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn checkout_cart(&self, cmd: CheckoutCart) -> Result<Order, OrderError> {
        self.place(Placement {
            customer_id: cmd.customer_id,
            lines: None,
            payment_method: cmd.payment_method,
            shipment_method: cmd.shipment_method,
            address_id: cmd.address_id,
            note: cmd.note,
        })
        .await
    }

    async fn place(&self, placement: Placement) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.place_inner(placement).await;
        metrics::histogram!("order_placement_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_placed_total").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    order_code = %order.code,
                    total = %order.total,
                    lines = order.lines.len(),
                    "order placed"
                );
            }
            Err(e) => {
                metrics::counter!("order_placement_failures_total", "kind" => e.kind())
                    .increment(1);
                if matches!(e, OrderError::Fatal(_)) {
                    tracing::error!(error = %e, "order placement failed");
                } else {
                    tracing::debug!(kind = e.kind(), error = %e, "order placement rejected");
                }
            }
        }
        result
    }

    async fn place_inner(&self, placement: Placement) -> Result<Order, OrderError> {
        let lines = match &placement.lines {
            Some(lines) => LineSource::Requested(validate_lines(lines)?),
            None => {
                // The transaction reads the cart again under its lock.
                if self.store.cart_items(placement.customer_id).await?.is_empty() {
                    return Err(OrderError::EmptyCart);
                }
                LineSource::Cart
            }
        };
        let note = validate_note(placement.note)?;
        let address_id = self
            .resolve_address(
                placement.customer_id,
                placement.shipment_method,
                placement.address_id,
            )
            .await?;

        let draft = Draft {
            customer_id: placement.customer_id,
            lines,
            payment_method: placement.payment_method,
            shipment_method: placement.shipment_method,
            address_id,
            note,
            created_at: self.clock.now(),
        };

        // The bound covers lock waits and writes. Once COMMIT is sent its
        // outcome is awaited, never abandoned.
        let timeout = self.config.transaction_timeout;
        let (tx, order) = tokio::time::timeout(timeout, self.stage_order(&draft))
            .await
            .map_err(|_| {
                OrderError::Conflict(format!("order placement timed out after {timeout:?}"))
            })??;
        tx.commit().await?;

        self.dispatch_notification(&order);
        Ok(order)
    }

    async fn resolve_address(
        &self,
        customer_id: CustomerId,
        method: ShipmentMethod,
        requested: Option<AddressId>,
    ) -> Result<Option<AddressId>, OrderError> {
        let needs_address = requires_address(method);

        if let Some(address_id) = requested {
            let found = self.addresses.find_address(customer_id, address_id).await?;
            return match found {
                Some(address) => Ok(Some(address.id)),
                None if needs_address => Err(OrderError::not_found("Address", address_id)),
                None => Ok(None),
            };
        }

        if !needs_address {
            return Ok(None);
        }

        match self.addresses.default_address(customer_id).await? {
            Some(address) => Ok(Some(address.id)),
            None => Err(OrderError::InvalidAddress(format!(
                "{method} shipping needs an address and customer {customer_id} has no default"
            ))),
        }
    }

    /// Runs every write of a placement and hands back the uncommitted
    /// transaction with the order as it will be stored.
    async fn stage_order(&self, draft: &Draft) -> Result<(S::Transaction, Order), OrderError> {
        let mut tx = self.store.begin().await?;

        let cart = tx.lock_cart(draft.customer_id).await?;
        let lines = match &draft.lines {
            LineSource::Requested(lines) => lines.clone(),
            LineSource::Cart => {
                let requests: Vec<OrderLineRequest> = cart
                    .iter()
                    .map(|item| OrderLineRequest::new(item.product_id, item.quantity))
                    .collect();
                validate_lines(&requests)?
            }
        };

        let ids: Vec<ProductId> = lines.keys().copied().collect();
        let products: BTreeMap<ProductId, Product> = tx
            .lock_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        if let Some(missing) = ids.iter().find(|id| !products.contains_key(id)) {
            return Err(OrderError::not_found("Product", missing));
        }

        let shortages: Vec<StockShortage> = lines
            .iter()
            .filter_map(|(id, &requested)| {
                let product = &products[id];
                (product.stock < requested).then(|| StockShortage {
                    product_id: *id,
                    product_name: product.name.clone(),
                    requested,
                    available: product.stock,
                })
            })
            .collect();

        if !shortages.is_empty() {
            return Err(OrderError::InsufficientStock { shortages });
        }

        let mut subtotal = Money::zero();
        let mut order_lines = Vec::with_capacity(lines.len());
        for (id, &quantity) in &lines {
            let product = &products[id];
            subtotal = product
                .unit_price
                .checked_multiply(quantity)
                .and_then(|line_total| subtotal.checked_add(line_total))
                .ok_or_else(|| amount_too_large("order subtotal"))?;

            tx.decrement_stock(*id, quantity).await?;
            order_lines.push(NewOrderLine {
                product_id: *id,
                product_name: product.name.clone(),
                quantity,
                unit_price: product.unit_price,
            });
        }

        let shipping = shipping_cost(draft.shipment_method);
        let total = subtotal
            .checked_add(shipping)
            .ok_or_else(|| amount_too_large("order total"))?;
        let mut header = NewOrder {
            code: String::new(),
            customer_id: draft.customer_id,
            address_id: draft.address_id,
            payment_method: draft.payment_method,
            shipment_method: draft.shipment_method,
            lifecycle: LifecycleFields::default(),
            subtotal,
            shipping_cost: shipping,
            total,
            note: draft.note.clone(),
            created_at: draft.created_at,
        };

        let date = draft.created_at.date_naive();
        let mut insertion = CodeInsertion::new(&mut tx, &header, &self.config.code_prefix, date);
        let (order_id, code) = RetryPolicy::new(self.config.max_code_attempts)
            .run(&mut insertion)
            .await?;
        tracing::debug!(%order_id, order_code = %code, "order code assigned");

        header.code = code.to_string();
        let mut order = Order::from_new(order_id, &header);
        order.lines = tx.insert_lines(order_id, &order_lines).await?;
        tx.clear_cart(draft.customer_id).await?;

        Ok((tx, order))
    }
}
