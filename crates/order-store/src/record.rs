//! Rows held by the order store.

use chrono::{DateTime, Utc};
use common::{
    AddressId, CustomerId, Money, OrderId, OrderStatus, PaymentMethod, PaymentStatus, ProductId,
    ShipmentMethod, ShipmentStatus,
};
use serde::{Deserialize, Serialize};

/// Version of an order row, used for optimistic concurrency control.
///
/// A freshly inserted order is at version 1; every lifecycle update
/// increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a freshly inserted order.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version number.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A product row. Its `stock` column is the stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Live unit price. Orders copy it into their lines at placement time.
    pub unit_price: Money,
    /// Available quantity. Never negative.
    pub stock: u32,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, unit_price: Money, stock: u32) -> Self {
        Self {
            id,
            name: name.into(),
            unit_price,
            stock,
        }
    }
}

/// One line of a customer's active cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// The fields the lifecycle is allowed to change after placement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleFields {
    pub payment_status: PaymentStatus,
    pub shipment_status: ShipmentStatus,
    pub order_status: OrderStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

/// An order header ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub code: String,
    pub customer_id: CustomerId,
    pub address_id: Option<AddressId>,
    pub payment_method: PaymentMethod,
    pub shipment_method: ShipmentMethod,
    pub lifecycle: LifecycleFields,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub total: Money,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An order line ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// A persisted order line. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    /// Price frozen at purchase time.
    pub unit_price: Money,
}

impl OrderLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// A persisted order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub code: String,
    pub customer_id: CustomerId,
    pub address_id: Option<AddressId>,
    pub payment_method: PaymentMethod,
    pub shipment_method: ShipmentMethod,
    #[serde(flatten)]
    pub lifecycle: LifecycleFields,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub total: Money,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub version: Version,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Builds the stored form of a freshly inserted header.
    pub fn from_new(id: OrderId, new: &NewOrder) -> Self {
        Self {
            id,
            code: new.code.clone(),
            customer_id: new.customer_id,
            address_id: new.address_id,
            payment_method: new.payment_method,
            shipment_method: new.shipment_method,
            lifecycle: new.lifecycle.clone(),
            subtotal: new.subtotal,
            shipping_cost: new.shipping_cost,
            total: new.total,
            note: new.note.clone(),
            created_at: new.created_at,
            version: Version::first(),
            lines: Vec::new(),
        }
    }

    /// Sum of quantity × frozen unit price over all lines.
    pub fn lines_total(&self) -> Money {
        self.lines.iter().map(OrderLine::line_total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_sequence() {
        assert_eq!(Version::first().as_i64(), 1);
        assert_eq!(Version::first().next(), Version::new(2));
    }

    #[test]
    fn order_serializes_lifecycle_inline() {
        let new = NewOrder {
            code: "MOA-20250101-0001".to_string(),
            customer_id: CustomerId::new(1),
            address_id: None,
            payment_method: PaymentMethod::BankTransfer,
            shipment_method: ShipmentMethod::Pickup,
            lifecycle: LifecycleFields::default(),
            subtotal: Money::from_minor(1000),
            shipping_cost: Money::zero(),
            total: Money::from_minor(1000),
            note: None,
            created_at: Utc::now(),
        };
        let order = Order::from_new(OrderId::new(9), &new);
        let json = serde_json::to_value(&order).unwrap();

        assert_eq!(json["payment_status"], "pending");
        assert_eq!(json["shipment_status"], "preparing");
        assert_eq!(json["order_status"], "confirmed");
        assert_eq!(json["version"], 1);
    }
}
