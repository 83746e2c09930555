//! Order listings.
//!
//! Listing input is forgiving: out-of-range pages and sizes are clamped and
//! unknown sort fields fall back to newest first.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderStatus, PaymentStatus, ShipmentStatus};
use order_store::{Order, OrderQuery, OrderStore, SortDirection, SortField};
use serde::Serialize;

use super::service::OrderService;
use crate::error::OrderError;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    page: u32,
    per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Pagination {
    /// Clamps raw input: page to at least 1, per_page into 1..=100.
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        let page = page.unwrap_or(1).clamp(1, i64::from(u32::MAX)) as u32;
        let per_page = per_page
            .unwrap_or(i64::from(DEFAULT_PER_PAGE))
            .clamp(1, i64::from(MAX_PER_PAGE)) as u32;
        Self { page, per_page }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.per_page as usize
    }
}

/// Parses a sort field name, falling back to the default.
pub fn parse_sort_field(name: Option<&str>) -> SortField {
    match name {
        Some("total") => SortField::Total,
        Some("code") => SortField::Code,
        _ => SortField::CreatedAt,
    }
}

/// Parses a sort direction, falling back to descending.
pub fn parse_sort_direction(name: Option<&str>) -> SortDirection {
    match name.map(str::to_ascii_lowercase).as_deref() {
        Some("asc") => SortDirection::Asc,
        _ => SortDirection::Desc,
    }
}

/// Filters for order listings. Empty status sets do not filter.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub payment_statuses: Vec<PaymentStatus>,
    pub shipment_statuses: Vec<ShipmentStatus>,
    pub order_statuses: Vec<OrderStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
}

impl OrderFilter {
    fn to_query(&self, customer_id: Option<CustomerId>, pagination: Pagination) -> OrderQuery {
        let mut query = match customer_id {
            Some(customer_id) => OrderQuery::for_customer(customer_id),
            None => OrderQuery::new(),
        };

        if !self.payment_statuses.is_empty() {
            query = query.payment_statuses(self.payment_statuses.clone());
        }
        if !self.shipment_statuses.is_empty() {
            query = query.shipment_statuses(self.shipment_statuses.clone());
        }
        if !self.order_statuses.is_empty() {
            query = query.order_statuses(self.order_statuses.clone());
        }
        if let Some(from) = self.created_from {
            query = query.created_from(from);
        }
        if let Some(to) = self.created_to {
            query = query.created_to(to);
        }

        // One extra row tells whether another page exists.
        query
            .sort_by(self.sort_field, self.sort_direction)
            .offset(pagination.offset())
            .limit(pagination.per_page() as usize + 1)
    }
}

/// One page of orders.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub page: u32,
    pub per_page: u32,
    pub has_more: bool,
}

impl<S: OrderStore> OrderService<S> {
    /// Lists one customer's orders.
    #[tracing::instrument(skip(self, filter))]
    pub async fn list_orders_for_customer(
        &self,
        customer_id: CustomerId,
        filter: &OrderFilter,
        pagination: Pagination,
    ) -> Result<OrderPage, OrderError> {
        self.list(filter.to_query(Some(customer_id), pagination), pagination)
            .await
    }

    /// Lists orders across all customers.
    #[tracing::instrument(skip(self, filter))]
    pub async fn list_orders(
        &self,
        filter: &OrderFilter,
        pagination: Pagination,
    ) -> Result<OrderPage, OrderError> {
        self.list(filter.to_query(None, pagination), pagination).await
    }

    async fn list(&self, query: OrderQuery, pagination: Pagination) -> Result<OrderPage, OrderError> {
        let mut orders = self.store.query_orders(&query).await?;
        let per_page = pagination.per_page() as usize;
        let has_more = orders.len() > per_page;
        orders.truncate(per_page);

        Ok(OrderPage {
            orders,
            page: pagination.page(),
            per_page: pagination.per_page(),
            has_more,
        })
    }
}
