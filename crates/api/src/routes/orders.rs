//! Order placement, lookup, listing and lifecycle endpoints.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{AddressId, CustomerId, OrderId, PaymentMethod, ShipmentMethod};
use domain::order::{parse_sort_direction, parse_sort_field};
use domain::{
    CheckoutCart, DerivedStatus, OrderFilter, OrderPage, OrderService, Pagination, PlaceOrder,
    StatusUpdate, derive_status,
};
use order_store::{Order, OrderStore};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore> {
    pub order_service: OrderService<S>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
    pub shipment_method: ShipmentMethod,
    #[serde(default)]
    pub address_id: Option<AddressId>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrackingRequest {
    pub carrier: String,
    pub tracking_number: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub customer_id: CustomerId,
}

/// Query string for listings. Status filters are comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub payment_status: Option<String>,
    pub shipment_status: Option<String>,
    pub order_status: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl ListParams {
    fn into_parts(self) -> Result<(OrderFilter, Pagination), ApiError> {
        let filter = OrderFilter {
            payment_statuses: parse_list(self.payment_status.as_deref())?,
            shipment_statuses: parse_list(self.shipment_status.as_deref())?,
            order_statuses: parse_list(self.order_status.as_deref())?,
            created_from: self.created_from,
            created_to: self.created_to,
            sort_field: parse_sort_field(self.sort.as_deref()),
            sort_direction: parse_sort_direction(self.direction.as_deref()),
        };
        Ok((filter, Pagination::new(self.page, self.per_page)))
    }
}

fn parse_list<T>(raw: Option<&str>) -> Result<Vec<T>, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().map_err(|e: T::Err| ApiError::BadRequest(e.to_string())))
        .collect()
}

// -- Response types --

/// An order with its derived customer-facing status.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub status: DerivedStatus,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let status = derive_status(
            order.lifecycle.payment_status,
            order.lifecycle.shipment_status,
        );
        Self { order, status }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderPageResponse {
    pub orders: Vec<OrderResponse>,
    pub page: u32,
    pub per_page: u32,
    pub has_more: bool,
}

impl From<OrderPage> for OrderPageResponse {
    fn from(page: OrderPage) -> Self {
        Self {
            orders: page.orders.into_iter().map(OrderResponse::from).collect(),
            page: page.page,
            per_page: page.per_page,
            has_more: page.has_more,
        }
    }
}

// -- Handlers --

/// POST /orders: place an order from explicit lines.
#[tracing::instrument(skip(state, body))]
pub async fn place<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<PlaceOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Json(cmd) = body?;
    let order = state.order_service.place_order(cmd).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// POST /customers/{id}/checkout: place an order from the customer's cart.
#[tracing::instrument(skip(state, body))]
pub async fn checkout<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Path(customer_id) = path?;
    let Json(req) = body?;

    let order = state
        .order_service
        .checkout_cart(CheckoutCart {
            customer_id: CustomerId::new(customer_id),
            payment_method: req.payment_method,
            shipment_method: req.shipment_method,
            address_id: req.address_id,
            note: req.note,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/{id}: load one order with its lines.
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Path(id) = path?;
    let order = state.order_service.get_order(OrderId::new(id)).await?;
    Ok(Json(order.into()))
}

/// GET /orders: list orders across customers.
#[tracing::instrument(skip(state))]
pub async fn list<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<OrderPageResponse>, ApiError> {
    let Query(params) = params?;
    let (filter, pagination) = params.into_parts()?;
    let page = state.order_service.list_orders(&filter, pagination).await?;
    Ok(Json(page.into()))
}

/// GET /customers/{id}/orders: list one customer's orders.
#[tracing::instrument(skip(state))]
pub async fn list_for_customer<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    path: Result<Path<i64>, PathRejection>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<OrderPageResponse>, ApiError> {
    let Path(customer_id) = path?;
    let Query(params) = params?;
    let (filter, pagination) = params.into_parts()?;
    let page = state
        .order_service
        .list_orders_for_customer(CustomerId::new(customer_id), &filter, pagination)
        .await?;
    Ok(Json(page.into()))
}

/// PATCH /orders/{id}/status: partial payment/shipment/order status update.
#[tracing::instrument(skip(state, body))]
pub async fn update_status<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Path(id) = path?;
    let Json(update) = body?;
    let order = state
        .order_service
        .update_order_status(OrderId::new(id), update)
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/tracking: attach carrier and tracking number.
#[tracing::instrument(skip(state, body))]
pub async fn attach_tracking<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<TrackingRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let order = state
        .order_service
        .attach_tracking(OrderId::new(id), &req.carrier, &req.tracking_number)
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/cancel: customer cancellation.
#[tracing::instrument(skip(state, body))]
pub async fn cancel<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let order = state
        .order_service
        .cancel_order(OrderId::new(id), req.customer_id)
        .await?;
    Ok(Json(order.into()))
}
