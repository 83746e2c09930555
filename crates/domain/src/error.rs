//! Domain error types.

use common::ProductId;
use order_store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// One line of an order that cannot be covered by available stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockShortage {
    pub product_id: ProductId,
    pub product_name: String,
    pub requested: u32,
    pub available: u32,
}

/// Errors that can occur during order operations.
///
/// Every variant has a stable machine-readable [`kind`](OrderError::kind).
#[derive(Debug, Error)]
pub enum OrderError {
    /// Malformed input, rejected before any state is touched.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Cart is empty")]
    EmptyCart,

    /// The shipment method needs an address and none could be resolved.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// One entry per line that exceeds available stock.
    #[error("Insufficient stock for {} product(s)", .shortages.len())]
    InsufficientStock { shortages: Vec<StockShortage> },

    /// Lost a race. Safe to retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    Fatal(String),
}

impl OrderError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        OrderError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "validation_error",
            OrderError::NotFound { .. } => "not_found",
            OrderError::EmptyCart => "empty_cart",
            OrderError::InvalidAddress(_) => "invalid_address",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::Conflict(_) => "conflict",
            OrderError::InvalidTransition(_) => "invalid_transition",
            OrderError::Fatal(_) => "fatal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderError::Conflict(_))
    }
}

impl From<StoreError> for OrderError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateOrderCode(_) | StoreError::ConcurrencyConflict { .. } => {
                OrderError::Conflict(e.to_string())
            }
            StoreError::OrderNotFound(id) => OrderError::not_found("Order", id),
            StoreError::ProductNotFound(id) => OrderError::not_found("Product", id),
            other => OrderError::Fatal(other.to_string()),
        }
    }
}
