use chrono::{DateTime, Utc};
use common::{CustomerId, OrderStatus, PaymentStatus, ShipmentStatus};

/// Column an order listing is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    Total,
    Code,
}

impl SortField {
    /// Column name in the `orders` table.
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::Total => "total",
            SortField::Code => "code",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Builder for filtered, sorted, paginated order listings.
///
/// Status filters match any of the listed values. Ties in the sort column
/// are broken by order id in the same direction.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by owning customer.
    pub customer_id: Option<CustomerId>,

    pub payment_statuses: Option<Vec<PaymentStatus>>,
    pub shipment_statuses: Option<Vec<ShipmentStatus>>,
    pub order_statuses: Option<Vec<OrderStatus>>,

    /// Orders created at or after this instant.
    pub created_from: Option<DateTime<Utc>>,

    /// Orders created at or before this instant.
    pub created_to: Option<DateTime<Utc>>,

    pub sort_field: SortField,
    pub sort_direction: SortDirection,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    /// Creates a new unfiltered query, newest first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one customer's orders.
    pub fn for_customer(customer_id: CustomerId) -> Self {
        Self {
            customer_id: Some(customer_id),
            ..Default::default()
        }
    }

    pub fn payment_statuses(mut self, statuses: Vec<PaymentStatus>) -> Self {
        self.payment_statuses = Some(statuses);
        self
    }

    pub fn shipment_statuses(mut self, statuses: Vec<ShipmentStatus>) -> Self {
        self.shipment_statuses = Some(statuses);
        self
    }

    pub fn order_statuses(mut self, statuses: Vec<OrderStatus>) -> Self {
        self.order_statuses = Some(statuses);
        self
    }

    pub fn created_from(mut self, timestamp: DateTime<Utc>) -> Self {
        self.created_from = Some(timestamp);
        self
    }

    pub fn created_to(mut self, timestamp: DateTime<Utc>) -> Self {
        self.created_to = Some(timestamp);
        self
    }

    pub fn sort_by(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort_field = field;
        self.sort_direction = direction;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}
