//! Shared fixtures for the domain integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use common::{AddressId, CustomerId, Money, PaymentMethod, ProductId, ShipmentMethod};
use domain::{
    Address, FixedClock, InMemoryAddressBook, InMemoryNotificationSender, OrderLineRequest,
    OrderService, PlaceOrder, PlacementConfig,
};
use order_store::{InMemoryOrderStore, OrderStore, Product};

pub struct Harness {
    pub service: Arc<OrderService<InMemoryOrderStore>>,
    pub store: InMemoryOrderStore,
    pub addresses: InMemoryAddressBook,
    pub notifier: InMemoryNotificationSender,
    pub clock: Arc<FixedClock>,
}

pub fn jan_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
}

pub fn harness() -> Harness {
    harness_with(PlacementConfig::default())
}

pub fn harness_with(config: PlacementConfig) -> Harness {
    let store = InMemoryOrderStore::new();
    let addresses = InMemoryAddressBook::new();
    let notifier = InMemoryNotificationSender::new();
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 1, 1, 10, 30, 0).unwrap(),
    ));

    let service = OrderService::new(
        store.clone(),
        Arc::new(addresses.clone()),
        Arc::new(notifier.clone()),
        config,
    )
    .with_clock(clock.clone());

    Harness {
        service: Arc::new(service),
        store,
        addresses,
        notifier,
        clock,
    }
}

impl Harness {
    pub async fn product(&self, id: i64, name: &str, price: i64, stock: u32) {
        self.store
            .upsert_product(&Product::new(
                ProductId::new(id),
                name,
                Money::from_minor(price),
                stock,
            ))
            .await
            .unwrap();
    }

    pub async fn stock_of(&self, id: i64) -> u32 {
        self.store
            .get_product(ProductId::new(id))
            .await
            .unwrap()
            .unwrap()
            .stock
    }

    pub fn default_address(&self, id: i64, customer: i64) {
        self.addresses.insert(Address {
            id: AddressId::new(id),
            customer_id: CustomerId::new(customer),
            recipient: "Ana Lima".to_string(),
            line1: "12 Harbour Road".to_string(),
            city: "Porto".to_string(),
            postal_code: "4000-001".to_string(),
            is_default: true,
        });
    }
}

/// A pickup order, which needs no address.
pub fn pickup(customer: i64, lines: &[(i64, u32)]) -> PlaceOrder {
    PlaceOrder::new(
        CustomerId::new(customer),
        lines
            .iter()
            .map(|(id, qty)| OrderLineRequest::new(ProductId::new(*id), *qty))
            .collect(),
        PaymentMethod::BankTransfer,
        ShipmentMethod::Pickup,
    )
}
