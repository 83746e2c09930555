use common::{CustomerId, OrderId, ProductId};
use thiserror::Error;

use crate::Version;
use crate::memory::FailPoint;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another order already carries this code.
    #[error("Order code already in use: {0}")]
    DuplicateOrderCode(String),

    /// The order was modified since it was read.
    #[error("Concurrency conflict for order {order_id}: expected version {expected}")]
    ConcurrencyConflict { order_id: OrderId, expected: Version },

    /// The order was not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The product was not found in the stock ledger.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A conditional decrement found less stock than requested.
    #[error("Insufficient stock for product {product_id}: requested {requested}")]
    InsufficientStock { product_id: ProductId, requested: u32 },

    /// A stock row was mutated without first being locked by the transaction.
    #[error("Product {0} is not locked by this transaction")]
    ProductNotLocked(ProductId),

    /// The cart was cleared without first being locked by the transaction.
    #[error("Cart of customer {0} is not locked by this transaction")]
    CartNotLocked(CustomerId),

    /// A stored value could not be mapped back into a record.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// A failure injected into the in-memory store.
    #[error("Injected failure at {0:?}")]
    Injected(FailPoint),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true for races a caller may resolve by retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::DuplicateOrderCode(_) | StoreError::ConcurrencyConflict { .. }
        )
    }
}

impl From<common::ParseStatusError> for StoreError {
    fn from(e: common::ParseStatusError) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
