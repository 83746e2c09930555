//! Stock ledger maintenance.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use common::ProductId;
use order_store::{OrderStore, Product};
use serde::Deserialize;

use super::orders::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

/// POST /products/{id}/restock: add units to a product's stock.
#[tracing::instrument(skip(state, body))]
pub async fn restock<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<RestockRequest>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let product = state
        .order_service
        .restock(ProductId::new(id), req.quantity)
        .await?;
    Ok(Json(product))
}
