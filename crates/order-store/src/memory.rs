use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{CustomerId, OrderId, ProductId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    CartItem, LifecycleFields, NewOrder, NewOrderLine, Order, OrderLine, OrderQuery, Product,
    Result, SortDirection, SortField, StoreError, Version,
    store::{OrderStore, StoreTransaction},
};

/// Places where the in-memory store can be told to fail, for exercising
/// rollback paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `insert_order` reports a code collision.
    DuplicateCode,
    InsertLines,
    ClearCart,
    Commit,
    /// `OrderStore::get_order` fails, as a read on a dropped connection would.
    GetOrder,
}

#[derive(Default)]
struct Tables {
    orders: BTreeMap<OrderId, Order>,
    carts: BTreeMap<CustomerId, BTreeMap<ProductId, u32>>,
}

#[derive(Default)]
struct Shared {
    /// One async mutex per stock row; holding the guard is the row lock.
    products: Mutex<BTreeMap<ProductId, Arc<Mutex<Product>>>>,
    sequence_locks: Mutex<HashMap<i32, Arc<Mutex<()>>>>,
    /// One mutex per customer cart, held by a transaction from `lock_cart`
    /// until it ends.
    cart_locks: Mutex<HashMap<CustomerId, Arc<Mutex<()>>>>,
    tables: RwLock<Tables>,
    next_order_id: AtomicI64,
    next_line_id: AtomicI64,
    failures: Mutex<HashMap<FailPoint, u32>>,
    commit_delay: Mutex<Option<Duration>>,
}

impl Shared {
    async fn product_row(&self, product_id: ProductId) -> Option<Arc<Mutex<Product>>> {
        self.products.lock().await.get(&product_id).cloned()
    }

    async fn cart_lock(&self, customer_id: CustomerId) -> Arc<Mutex<()>> {
        self.cart_locks
            .lock()
            .await
            .entry(customer_id)
            .or_default()
            .clone()
    }

    async fn take_failure(&self, point: FailPoint) -> bool {
        let mut failures = self.failures.lock().await;
        match failures.get_mut(&point) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

/// In-memory order store.
///
/// Provides the same locking semantics as the PostgreSQL implementation:
/// exclusive stock row locks, transaction-scoped sequence tokens, and
/// all-or-nothing commits. Uncommitted transactions are rolled back when
/// dropped.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    shared: Arc<Shared>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` visits to `point` fail.
    pub async fn inject_failure(&self, point: FailPoint, times: u32) {
        self.shared.failures.lock().await.insert(point, times);
    }

    /// Makes every commit wait `delay` before applying its writes, like a
    /// slow round trip to the database.
    pub async fn delay_commits(&self, delay: Duration) {
        *self.shared.commit_delay.lock().await = Some(delay);
    }

    /// Returns the total number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.shared.tables.read().await.orders.len()
    }
}

/// A customer's cart as read under its lock.
struct LockedCart {
    _guard: OwnedMutexGuard<()>,
    products: Vec<ProductId>,
}

/// Transaction over an [`InMemoryOrderStore`].
///
/// Writes are staged and applied on commit while the row locks are still
/// held.
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    locked: BTreeMap<ProductId, OwnedMutexGuard<Product>>,
    sequence_guards: HashMap<i32, OwnedMutexGuard<()>>,
    carts: BTreeMap<CustomerId, LockedCart>,
    stock: BTreeMap<ProductId, u32>,
    orders: Vec<Order>,
    cleared_carts: Vec<(CustomerId, Vec<ProductId>)>,
}

impl InMemoryTransaction {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            locked: BTreeMap::new(),
            sequence_guards: HashMap::new(),
            carts: BTreeMap::new(),
            stock: BTreeMap::new(),
            orders: Vec::new(),
            cleared_carts: Vec::new(),
        }
    }

    fn current_row(&self, product_id: ProductId) -> Option<Product> {
        self.locked.get(&product_id).map(|guard| {
            let mut product = (**guard).clone();
            if let Some(quantity) = self.stock.get(&product_id) {
                product.stock = *quantity;
            }
            product
        })
    }
}

fn cart_of(tables: &Tables, customer_id: CustomerId) -> Vec<CartItem> {
    tables
        .carts
        .get(&customer_id)
        .map(|cart| {
            cart.iter()
                .map(|(product_id, quantity)| CartItem {
                    customer_id,
                    product_id: *product_id,
                    quantity: *quantity,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn code_sequence(code: &str, prefix: &str) -> Option<u32> {
    let suffix = code.strip_prefix(prefix)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn lock_cart(&mut self, customer_id: CustomerId) -> Result<Vec<CartItem>> {
        if !self.carts.contains_key(&customer_id) {
            let lock = self.shared.cart_lock(customer_id).await;
            let guard = lock.lock_owned().await;
            self.carts.insert(
                customer_id,
                LockedCart {
                    _guard: guard,
                    products: Vec::new(),
                },
            );
        }

        let items = cart_of(&*self.shared.tables.read().await, customer_id);
        if let Some(cart) = self.carts.get_mut(&customer_id) {
            cart.products = items.iter().map(|item| item.product_id).collect();
        }
        Ok(items)
    }

    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();

        for id in &ids {
            if self.locked.contains_key(id) {
                continue;
            }
            let Some(row) = self.shared.product_row(*id).await else {
                continue;
            };
            let guard = row.lock_owned().await;
            self.locked.insert(*id, guard);
        }

        Ok(ids.iter().filter_map(|id| self.current_row(*id)).collect())
    }

    async fn decrement_stock(&mut self, product_id: ProductId, quantity: u32) -> Result<u32> {
        let available = self
            .current_row(product_id)
            .ok_or(StoreError::ProductNotLocked(product_id))?
            .stock;

        let remaining =
            available
                .checked_sub(quantity)
                .ok_or(StoreError::InsufficientStock {
                    product_id,
                    requested: quantity,
                })?;

        self.stock.insert(product_id, remaining);
        Ok(remaining)
    }

    async fn acquire_sequence_lock(&mut self, key: i32) -> Result<()> {
        if self.sequence_guards.contains_key(&key) {
            return Ok(());
        }

        let lock = {
            let mut locks = self.shared.sequence_locks.lock().await;
            locks.entry(key).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        self.sequence_guards.insert(key, guard);
        Ok(())
    }

    async fn max_code_sequence(&mut self, prefix: &str) -> Result<Option<u32>> {
        let tables = self.shared.tables.read().await;
        Ok(tables
            .orders
            .values()
            .chain(self.orders.iter())
            .filter_map(|o| code_sequence(&o.code, prefix))
            .max())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderId> {
        if self.shared.take_failure(FailPoint::DuplicateCode).await {
            return Err(StoreError::DuplicateOrderCode(order.code.clone()));
        }

        let taken = {
            let tables = self.shared.tables.read().await;
            tables.orders.values().any(|o| o.code == order.code)
        } || self.orders.iter().any(|o| o.code == order.code);

        if taken {
            return Err(StoreError::DuplicateOrderCode(order.code.clone()));
        }

        let id = OrderId::new(self.shared.next_order_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.orders.push(Order::from_new(id, order));
        Ok(id)
    }

    async fn insert_lines(
        &mut self,
        order_id: OrderId,
        lines: &[NewOrderLine],
    ) -> Result<Vec<OrderLine>> {
        if self.shared.take_failure(FailPoint::InsertLines).await {
            return Err(StoreError::Injected(FailPoint::InsertLines));
        }

        let shared = Arc::clone(&self.shared);
        let order = self
            .orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        let inserted: Vec<OrderLine> = lines
            .iter()
            .map(|line| OrderLine {
                id: shared.next_line_id.fetch_add(1, Ordering::SeqCst) + 1,
                order_id,
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();
        order.lines.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn clear_cart(&mut self, customer_id: CustomerId) -> Result<u64> {
        if self.shared.take_failure(FailPoint::ClearCart).await {
            return Err(StoreError::Injected(FailPoint::ClearCart));
        }

        let products = self
            .carts
            .get(&customer_id)
            .ok_or(StoreError::CartNotLocked(customer_id))?
            .products
            .clone();
        let removed = products.len() as u64;
        self.cleared_carts.push((customer_id, products));
        Ok(removed)
    }

    async fn commit(mut self) -> Result<()> {
        if self.shared.take_failure(FailPoint::Commit).await {
            return Err(StoreError::Injected(FailPoint::Commit));
        }

        let delay = *self.shared.commit_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut tables = self.shared.tables.write().await;
            for order in self.orders.drain(..) {
                tables.orders.insert(order.id, order);
            }
            for (customer_id, products) in &self.cleared_carts {
                if let Some(cart) = tables.carts.get_mut(customer_id) {
                    for product_id in products {
                        cart.remove(product_id);
                    }
                    if cart.is_empty() {
                        tables.carts.remove(customer_id);
                    }
                }
            }
        }

        for (product_id, quantity) in &self.stock {
            if let Some(guard) = self.locked.get_mut(product_id) {
                guard.stock = *quantity;
            }
        }

        // Guards drop here, releasing row, cart and sequence locks.
        Ok(())
    }
}

fn matches_query(order: &Order, query: &OrderQuery) -> bool {
    if let Some(customer_id) = query.customer_id
        && order.customer_id != customer_id
    {
        return false;
    }
    if let Some(ref statuses) = query.payment_statuses
        && !statuses.contains(&order.lifecycle.payment_status)
    {
        return false;
    }
    if let Some(ref statuses) = query.shipment_statuses
        && !statuses.contains(&order.lifecycle.shipment_status)
    {
        return false;
    }
    if let Some(ref statuses) = query.order_statuses
        && !statuses.contains(&order.lifecycle.order_status)
    {
        return false;
    }
    if let Some(from) = query.created_from
        && order.created_at < from
    {
        return false;
    }
    if let Some(to) = query.created_to
        && order.created_at > to
    {
        return false;
    }
    true
}

fn compare_orders(a: &Order, b: &Order, field: SortField) -> CmpOrdering {
    let by_field = match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::Total => a.total.cmp(&b.total),
        SortField::Code => a.code.cmp(&b.code),
    };
    by_field.then(a.id.cmp(&b.id))
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Transaction> {
        Ok(InMemoryTransaction::new(Arc::clone(&self.shared)))
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        if self.shared.take_failure(FailPoint::GetOrder).await {
            return Err(StoreError::Injected(FailPoint::GetOrder));
        }

        let tables = self.shared.tables.read().await;
        Ok(tables.orders.get(&order_id).cloned())
    }

    async fn find_order_by_code(&self, code: &str) -> Result<Option<Order>> {
        let tables = self.shared.tables.read().await;
        Ok(tables.orders.values().find(|o| o.code == code).cloned())
    }

    async fn query_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let tables = self.shared.tables.read().await;
        let mut orders: Vec<_> = tables
            .orders
            .values()
            .filter(|o| matches_query(o, query))
            .cloned()
            .collect();

        orders.sort_by(|a, b| {
            let ordering = compare_orders(a, b, query.sort_field);
            match query.sort_direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(orders.into_iter().skip(offset).take(limit).collect())
    }

    async fn update_lifecycle(
        &self,
        order_id: OrderId,
        expected: Version,
        fields: &LifecycleFields,
    ) -> Result<Order> {
        let mut tables = self.shared.tables.write().await;
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if order.version != expected {
            return Err(StoreError::ConcurrencyConflict { order_id, expected });
        }

        order.lifecycle = fields.clone();
        order.version = order.version.next();
        Ok(order.clone())
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        match self.shared.product_row(product_id).await {
            Some(row) => Ok(Some(row.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        let row = {
            let mut products = self.shared.products.lock().await;
            match products.get(&product.id) {
                Some(row) => Arc::clone(row),
                None => {
                    products.insert(product.id, Arc::new(Mutex::new(product.clone())));
                    return Ok(());
                }
            }
        };
        *row.lock().await = product.clone();
        Ok(())
    }

    async fn restock(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        let row = self
            .shared
            .product_row(product_id)
            .await
            .ok_or(StoreError::ProductNotFound(product_id))?;

        let mut product = row.lock().await;
        product.stock = product.stock.checked_add(quantity).ok_or_else(|| {
            StoreError::InvalidData(format!("stock overflow for product {product_id}"))
        })?;
        Ok(product.clone())
    }

    async fn cart_items(&self, customer_id: CustomerId) -> Result<Vec<CartItem>> {
        let tables = self.shared.tables.read().await;
        Ok(cart_of(&tables, customer_id))
    }

    /// Waits while a transaction holds the customer's cart lock.
    async fn put_cart_item(&self, item: &CartItem) -> Result<()> {
        let lock = self.shared.cart_lock(item.customer_id).await;
        let _cart = lock.lock().await;

        let mut tables = self.shared.tables.write().await;
        tables
            .carts
            .entry(item.customer_id)
            .or_default()
            .insert(item.product_id, item.quantity);
        Ok(())
    }
}
