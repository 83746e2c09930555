//! Domain layer for the order placement and fulfillment engine.
//!
//! This crate provides:
//! - Order placement from explicit lines or a customer's cart, with stock
//!   reservation and daily order codes in one transaction
//! - The payment/shipment lifecycle and customer cancellation
//! - Filtered, paginated order listings
//! - Collaborator traits for address lookup and notifications

pub mod clock;
pub mod config;
pub mod error;
pub mod order;
pub mod retry;
pub mod services;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::PlacementConfig;
pub use error::{OrderError, StockShortage};
pub use order::{
    CheckoutCart, DerivedStatus, OrderCode, OrderFilter, OrderLineRequest, OrderPage,
    OrderService, Pagination, PlaceOrder, StatusUpdate, derive_status,
};
pub use retry::{Attempt, RetryError, RetryPolicy};
pub use services::{
    Address, AddressBook, InMemoryAddressBook, InMemoryNotificationSender,
    LoggingNotificationSender, NotificationError, NotificationSender, OrderSummary,
};
