//! Transactional storage for orders, the stock ledger and customer carts.
//!
//! Two backends implement [`OrderStore`]: [`InMemoryOrderStore`] for tests and
//! single-process runs, and [`PostgresOrderStore`] for production. Both give
//! the same guarantees: exclusive stock row locks, transaction-scoped
//! sequence tokens, and all-or-nothing commits.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{FailPoint, InMemoryOrderStore, InMemoryTransaction};
pub use postgres::{PostgresOrderStore, PostgresTransaction};
pub use query::{OrderQuery, SortDirection, SortField};
pub use record::{
    CartItem, LifecycleFields, NewOrder, NewOrderLine, Order, OrderLine, Product, Version,
};
pub use store::{OrderStore, StoreTransaction};
