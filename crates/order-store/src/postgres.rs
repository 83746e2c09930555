use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use common::{AddressId, CustomerId, Money, OrderId, ProductId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    CartItem, LifecycleFields, NewOrder, NewOrderLine, Order, OrderLine, OrderQuery, Product,
    Result, StoreError, Version,
    store::{OrderStore, StoreTransaction},
};

/// First key of the two-key advisory lock space reserved for order code
/// sequences ("ORDR").
const SEQUENCE_LOCK_CLASS: i32 = 0x4f52_4452;

const ORDER_COLUMNS: &str = "id, code, customer_id, address_id, payment_method, shipment_method, \
     payment_status, shipment_status, order_status, paid_at, shipped_at, delivered_at, \
     carrier, tracking_number, subtotal, shipping_cost, total, note, created_at, version";

fn to_i32(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::InvalidData(format!("quantity {value} too large")))
}

fn to_u32(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::InvalidData(format!("negative quantity {value}")))
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        unit_price: Money::from_minor(row.try_get("unit_price")?),
        stock: to_u32(row.try_get("stock")?)?,
    })
}

fn row_to_cart_item(row: &PgRow) -> Result<CartItem> {
    Ok(CartItem {
        customer_id: CustomerId::new(row.try_get("customer_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: to_u32(row.try_get("quantity")?)?,
    })
}

fn row_to_line(row: &PgRow) -> Result<OrderLine> {
    Ok(OrderLine {
        id: row.try_get("id")?,
        order_id: OrderId::new(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        product_name: row.try_get("product_name")?,
        quantity: to_u32(row.try_get("quantity")?)?,
        unit_price: Money::from_minor(row.try_get("unit_price")?),
    })
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let status = |column: &str| -> Result<String> { Ok(row.try_get(column)?) };

    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        code: row.try_get("code")?,
        customer_id: CustomerId::new(row.try_get("customer_id")?),
        address_id: row.try_get::<Option<i64>, _>("address_id")?.map(AddressId::new),
        payment_method: status("payment_method")?.parse()?,
        shipment_method: status("shipment_method")?.parse()?,
        lifecycle: LifecycleFields {
            payment_status: status("payment_status")?.parse()?,
            shipment_status: status("shipment_status")?.parse()?,
            order_status: status("order_status")?.parse()?,
            paid_at: row.try_get("paid_at")?,
            shipped_at: row.try_get("shipped_at")?,
            delivered_at: row.try_get("delivered_at")?,
            carrier: row.try_get("carrier")?,
            tracking_number: row.try_get("tracking_number")?,
        },
        subtotal: Money::from_minor(row.try_get("subtotal")?),
        shipping_cost: Money::from_minor(row.try_get("shipping_cost")?),
        total: Money::from_minor(row.try_get("total")?),
        note: row.try_get("note")?,
        created_at: row.try_get("created_at")?,
        version: Version::new(row.try_get("version")?),
        lines: Vec::new(),
    })
}

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Attaches lines to already loaded order headers.
    async fn load_lines<'e, E>(executor: E, orders: &mut [Order]) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        if orders.is_empty() {
            return Ok(());
        }

        let ids: Vec<i64> = orders.iter().map(|o| o.id.as_i64()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, product_name, quantity, unit_price
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(executor)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<OrderLine>> = HashMap::new();
        for row in &rows {
            let line = row_to_line(row)?;
            by_order.entry(line.order_id).or_default().push(line);
        }
        for order in orders.iter_mut() {
            order.lines = by_order.remove(&order.id).unwrap_or_default();
        }
        Ok(())
    }

    async fn fetch_order<'e, E>(executor: E, order_id: OrderId) -> Result<Option<Order>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_i64())
            .fetch_optional(executor)
            .await?;

        row.as_ref().map(row_to_order).transpose()
    }
}

/// Transaction over a [`PostgresOrderStore`].
///
/// Wraps a database transaction; dropping it rolls back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    locked: BTreeSet<ProductId>,
    carts: BTreeMap<CustomerId, Vec<i64>>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    #[tracing::instrument(skip(self))]
    async fn lock_cart(&mut self, customer_id: CustomerId) -> Result<Vec<CartItem>> {
        // Rows deleted by a transaction we waited on are skipped, so a
        // second checkout of the same cart reads it empty.
        let rows = sqlx::query(
            r#"
            SELECT customer_id, product_id, quantity
            FROM cart_items
            WHERE customer_id = $1
            ORDER BY product_id ASC
            FOR UPDATE
            "#,
        )
        .bind(customer_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;

        let items = rows
            .iter()
            .map(row_to_cart_item)
            .collect::<Result<Vec<_>>>()?;
        self.carts.insert(
            customer_id,
            items.iter().map(|item| item.product_id.as_i64()).collect(),
        );
        Ok(items)
    }

    #[tracing::instrument(skip(self))]
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<i64> = ids.iter().map(ProductId::as_i64).collect();

        // LockRows runs above the sort, so rows are locked in id order.
        let rows = sqlx::query(
            r#"
            SELECT id, name, unit_price, stock
            FROM products
            WHERE id = ANY($1)
            ORDER BY id ASC
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let products = rows
            .iter()
            .map(row_to_product)
            .collect::<Result<Vec<_>>>()?;
        self.locked.extend(products.iter().map(|p| p.id));
        Ok(products)
    }

    async fn decrement_stock(&mut self, product_id: ProductId, quantity: u32) -> Result<u32> {
        if !self.locked.contains(&product_id) {
            return Err(StoreError::ProductNotLocked(product_id));
        }

        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock - $2
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(product_id.as_i64())
        .bind(to_i32(quantity)?)
        .fetch_optional(&mut *self.tx)
        .await?;

        match remaining {
            Some(stock) => to_u32(stock),
            None => Err(StoreError::InsufficientStock {
                product_id,
                requested: quantity,
            }),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn acquire_sequence_lock(&mut self, key: i32) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(SEQUENCE_LOCK_CLASS)
            .bind(key)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn max_code_sequence(&mut self, prefix: &str) -> Result<Option<u32>> {
        let suffix_start = i32::try_from(prefix.chars().count() + 1)
            .map_err(|_| StoreError::InvalidData("code prefix too long".to_string()))?;

        let max: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(CAST(substr(code, $2) AS BIGINT))
            FROM orders
            WHERE left(code, length($1)) = $1
              AND substr(code, $2) ~ '^[0-9]{1,9}$'
            "#,
        )
        .bind(prefix)
        .bind(suffix_start)
        .fetch_one(&mut *self.tx)
        .await?;

        max.map(|n| {
            u32::try_from(n).map_err(|_| StoreError::InvalidData(format!("sequence {n}")))
        })
        .transpose()
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderId> {
        // DO NOTHING keeps the transaction usable after a collision.
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO orders (
                code, customer_id, address_id, payment_method, shipment_method,
                payment_status, shipment_status, order_status, paid_at, shipped_at,
                delivered_at, carrier, tracking_number, subtotal, shipping_cost, total,
                note, created_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, 1)
            ON CONFLICT ON CONSTRAINT unique_order_code DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&order.code)
        .bind(order.customer_id.as_i64())
        .bind(order.address_id.map(|a| a.as_i64()))
        .bind(order.payment_method.as_str())
        .bind(order.shipment_method.as_str())
        .bind(order.lifecycle.payment_status.as_str())
        .bind(order.lifecycle.shipment_status.as_str())
        .bind(order.lifecycle.order_status.as_str())
        .bind(order.lifecycle.paid_at)
        .bind(order.lifecycle.shipped_at)
        .bind(order.lifecycle.delivered_at)
        .bind(&order.lifecycle.carrier)
        .bind(&order.lifecycle.tracking_number)
        .bind(order.subtotal.minor_units())
        .bind(order.shipping_cost.minor_units())
        .bind(order.total.minor_units())
        .bind(&order.note)
        .bind(order.created_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        id.map(OrderId::new)
            .ok_or_else(|| StoreError::DuplicateOrderCode(order.code.clone()))
    }

    async fn insert_lines(
        &mut self,
        order_id: OrderId,
        lines: &[NewOrderLine],
    ) -> Result<Vec<OrderLine>> {
        let mut inserted = Vec::with_capacity(lines.len());
        for line in lines {
            let row = sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, product_id, product_name, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, order_id, product_id, product_name, quantity, unit_price
                "#,
            )
            .bind(order_id.as_i64())
            .bind(line.product_id.as_i64())
            .bind(&line.product_name)
            .bind(to_i32(line.quantity)?)
            .bind(line.unit_price.minor_units())
            .fetch_one(&mut *self.tx)
            .await?;
            inserted.push(row_to_line(&row)?);
        }
        Ok(inserted)
    }

    async fn clear_cart(&mut self, customer_id: CustomerId) -> Result<u64> {
        let products = self
            .carts
            .get(&customer_id)
            .ok_or(StoreError::CartNotLocked(customer_id))?;

        let result = sqlx::query(
            "DELETE FROM cart_items WHERE customer_id = $1 AND product_id = ANY($2)",
        )
        .bind(customer_id.as_i64())
        .bind(products)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Transaction> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
            locked: BTreeSet::new(),
            carts: BTreeMap::new(),
        })
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let Some(order) = Self::fetch_order(&self.pool, order_id).await? else {
            return Ok(None);
        };
        let mut orders = [order];
        Self::load_lines(&self.pool, &mut orders).await?;
        let [order] = orders;
        Ok(Some(order))
    }

    async fn find_order_by_code(&self, code: &str) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE code = $1"))
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut orders = [row_to_order(&row)?];
        Self::load_lines(&self.pool, &mut orders).await?;
        let [order] = orders;
        Ok(Some(order))
    }

    async fn query_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.customer_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND customer_id = ${param_count}"));
        }
        if query.payment_statuses.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND payment_status = ANY(${param_count})"));
        }
        if query.shipment_statuses.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND shipment_status = ANY(${param_count})"));
        }
        if query.order_statuses.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND order_status = ANY(${param_count})"));
        }
        if query.created_from.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at >= ${param_count}"));
        }
        if query.created_to.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at <= ${param_count}"));
        }

        let direction = query.sort_direction.keyword();
        sql.push_str(&format!(
            " ORDER BY {} {direction}, id {direction}",
            query.sort_field.column()
        ));

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(customer_id) = query.customer_id {
            sqlx_query = sqlx_query.bind(customer_id.as_i64());
        }
        if let Some(ref statuses) = query.payment_statuses {
            sqlx_query = sqlx_query.bind(statuses.iter().map(|s| s.as_str()).collect::<Vec<_>>());
        }
        if let Some(ref statuses) = query.shipment_statuses {
            sqlx_query = sqlx_query.bind(statuses.iter().map(|s| s.as_str()).collect::<Vec<_>>());
        }
        if let Some(ref statuses) = query.order_statuses {
            sqlx_query = sqlx_query.bind(statuses.iter().map(|s| s.as_str()).collect::<Vec<_>>());
        }
        if let Some(from) = query.created_from {
            sqlx_query = sqlx_query.bind(from);
        }
        if let Some(to) = query.created_to {
            sqlx_query = sqlx_query.bind(to);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let mut orders = rows.iter().map(row_to_order).collect::<Result<Vec<_>>>()?;
        Self::load_lines(&self.pool, &mut orders).await?;
        Ok(orders)
    }

    #[tracing::instrument(skip(self, fields))]
    async fn update_lifecycle(
        &self,
        order_id: OrderId,
        expected: Version,
        fields: &LifecycleFields,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET payment_status = $3,
                shipment_status = $4,
                order_status = $5,
                paid_at = $6,
                shipped_at = $7,
                delivered_at = $8,
                carrier = $9,
                tracking_number = $10,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING id
            "#,
        )
        .bind(order_id.as_i64())
        .bind(expected.as_i64())
        .bind(fields.payment_status.as_str())
        .bind(fields.shipment_status.as_str())
        .bind(fields.order_status.as_str())
        .bind(fields.paid_at)
        .bind(fields.shipped_at)
        .bind(fields.delivered_at)
        .bind(&fields.carrier)
        .bind(&fields.tracking_number)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
                    .bind(order_id.as_i64())
                    .fetch_one(&mut *tx)
                    .await?;

            return Err(if exists {
                StoreError::ConcurrencyConflict { order_id, expected }
            } else {
                StoreError::OrderNotFound(order_id)
            });
        }

        let order = Self::fetch_order(&mut *tx, order_id)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))?;
        let mut orders = [order];
        Self::load_lines(&mut *tx, &mut orders).await?;
        tx.commit().await?;

        let [order] = orders;
        Ok(order)
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT id, name, unit_price, stock FROM products WHERE id = $1")
            .bind(product_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, unit_price, stock)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                unit_price = EXCLUDED.unit_price,
                stock = EXCLUDED.stock
            "#,
        )
        .bind(product.id.as_i64())
        .bind(&product.name)
        .bind(product.unit_price.minor_units())
        .bind(to_i32(product.stock)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn restock(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        let row = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock + $2
            WHERE id = $1
            RETURNING id, name, unit_price, stock
            "#,
        )
        .bind(product_id.as_i64())
        .bind(to_i32(quantity)?)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_product(&row),
            None => Err(StoreError::ProductNotFound(product_id)),
        }
    }

    async fn cart_items(&self, customer_id: CustomerId) -> Result<Vec<CartItem>> {
        let rows = sqlx::query(
            r#"
            SELECT customer_id, product_id, quantity
            FROM cart_items
            WHERE customer_id = $1
            ORDER BY product_id ASC
            "#,
        )
        .bind(customer_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_cart_item).collect()
    }

    async fn put_cart_item(&self, item: &CartItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (customer_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (customer_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
            "#,
        )
        .bind(item.customer_id.as_i64())
        .bind(item.product_id.as_i64())
        .bind(to_i32(item.quantity)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
