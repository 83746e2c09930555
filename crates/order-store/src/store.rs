use async_trait::async_trait;
use common::{CustomerId, OrderId, ProductId};

use crate::{
    CartItem, LifecycleFields, NewOrder, NewOrderLine, Order, OrderLine, OrderQuery, Product,
    Result, Version,
};

/// A unit of work against the order store.
///
/// Every mutation made through a transaction becomes visible atomically on
/// [`commit`](StoreTransaction::commit). Dropping a transaction without
/// committing rolls it back and releases every lock it holds, which is what
/// makes cancellation and timeouts safe.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Locks a customer's cart rows until the transaction ends and returns
    /// them, sorted by product id.
    ///
    /// Take the cart lock before any stock row lock, so two placements for
    /// the same customer lock in the same order.
    async fn lock_cart(&mut self, customer_id: CustomerId) -> Result<Vec<CartItem>>;

    /// Locks the stock rows of `ids` exclusively, in ascending product id
    /// order, and returns the rows that exist (sorted by id).
    ///
    /// Call at most once per transaction so the ordering holds across the
    /// whole unit of work.
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Decrements a locked stock row. Fails instead of going negative.
    ///
    /// Returns the remaining quantity.
    async fn decrement_stock(&mut self, product_id: ProductId, quantity: u32) -> Result<u32>;

    /// Acquires a mutual-exclusion token keyed by `key`, held until the
    /// transaction ends. Re-acquiring a held key is a no-op.
    async fn acquire_sequence_lock(&mut self, key: i32) -> Result<()>;

    /// Greatest numeric suffix among order codes that start with `prefix`.
    async fn max_code_sequence(&mut self, prefix: &str) -> Result<Option<u32>>;

    /// Inserts an order header.
    ///
    /// A code collision yields [`StoreError::DuplicateOrderCode`] and leaves
    /// the transaction usable.
    ///
    /// [`StoreError::DuplicateOrderCode`]: crate::StoreError::DuplicateOrderCode
    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderId>;

    /// Inserts the lines of an order inserted by this transaction and
    /// returns them as stored.
    async fn insert_lines(
        &mut self,
        order_id: OrderId,
        lines: &[NewOrderLine],
    ) -> Result<Vec<OrderLine>>;

    /// Deletes the cart rows returned by [`lock_cart`](StoreTransaction::lock_cart).
    /// Items added to the cart after that are left in place.
    ///
    /// Returns the number of removed items.
    async fn clear_cart(&mut self, customer_id: CustomerId) -> Result<u64>;

    /// Makes all changes durable and releases the locks.
    async fn commit(self) -> Result<()>;
}

/// Core trait for order store implementations.
///
/// All implementations must be thread-safe (Send + Sync) and may be shared
/// by any number of concurrent placements.
#[async_trait]
pub trait OrderStore: Send + Sync {
    type Transaction: StoreTransaction + 'static;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Transaction>;

    /// Loads an order with its lines.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads an order by its human-readable code.
    async fn find_order_by_code(&self, code: &str) -> Result<Option<Order>>;

    /// Retrieves orders matching a query, lines included.
    async fn query_orders(&self, query: &OrderQuery) -> Result<Vec<Order>>;

    /// Overwrites the lifecycle fields of an order if it is still at
    /// `expected`, bumping its version.
    ///
    /// Fails with `ConcurrencyConflict` when the version moved and with
    /// `OrderNotFound` when there is no such order.
    async fn update_lifecycle(
        &self,
        order_id: OrderId,
        expected: Version,
        fields: &LifecycleFields,
    ) -> Result<Order>;

    /// Reads a product row.
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Inserts or replaces a product row.
    async fn upsert_product(&self, product: &Product) -> Result<()>;

    /// Adds stock under the same row lock placements use.
    async fn restock(&self, product_id: ProductId, quantity: u32) -> Result<Product>;

    /// Reads a customer's active cart.
    async fn cart_items(&self, customer_id: CustomerId) -> Result<Vec<CartItem>>;

    /// Inserts or replaces one cart line.
    async fn put_cart_item(&self, item: &CartItem) -> Result<()>;
}
