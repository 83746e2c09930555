//! API error types with HTTP response mapping.
//!
//! Every error body has the shape
//! `{ "error": { "kind": ..., "message": ..., "details": ... } }`, where
//! `details` is present only for insufficient stock.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OrderError;
use serde::Serialize;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The request could not be decoded.
    BadRequest(String),
    /// Domain error.
    Order(OrderError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

fn status_for(err: &OrderError) -> StatusCode {
    match err {
        OrderError::Validation(_) | OrderError::EmptyCart => StatusCode::BAD_REQUEST,
        OrderError::NotFound { .. } => StatusCode::NOT_FOUND,
        OrderError::InvalidAddress(_) => StatusCode::UNPROCESSABLE_ENTITY,
        OrderError::InsufficientStock { .. }
        | OrderError::Conflict(_)
        | OrderError::InvalidTransition(_) => StatusCode::CONFLICT,
        OrderError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    kind: "validation_error",
                    message,
                    details: None,
                },
            ),
            ApiError::Order(err) => {
                let status = status_for(&err);
                let details = match &err {
                    OrderError::InsufficientStock { shortages } => {
                        serde_json::to_value(shortages).ok()
                    }
                    _ => None,
                };
                let message = match &err {
                    OrderError::Fatal(_) => {
                        tracing::error!(error = %err, "internal server error");
                        "Internal server error".to_string()
                    }
                    _ => err.to_string(),
                };
                (
                    status,
                    ErrorDetail {
                        kind: err.kind(),
                        message,
                        details,
                    },
                )
            }
        };

        (status, axum::Json(ErrorBody { error: detail })).into_response()
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
