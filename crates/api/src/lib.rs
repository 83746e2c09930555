//! HTTP API server with observability for the order engine.
//!
//! Provides REST endpoints for order placement, lookup, listings and the
//! post-placement lifecycle, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use domain::{AddressBook, NotificationSender, OrderService, PlacementConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::place::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/{id}/status",
            patch(routes::orders::update_status::<S>),
        )
        .route(
            "/orders/{id}/tracking",
            post(routes::orders::attach_tracking::<S>),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route(
            "/customers/{id}/checkout",
            post(routes::orders::checkout::<S>),
        )
        .route(
            "/customers/{id}/orders",
            get(routes::orders::list_for_customer::<S>),
        )
        .route(
            "/products/{id}/restock",
            post(routes::products::restock::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around a store and its collaborators.
pub fn create_state<S: OrderStore + 'static>(
    store: S,
    addresses: Arc<dyn AddressBook>,
    notifier: Arc<dyn NotificationSender>,
    config: PlacementConfig,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        order_service: OrderService::new(store, addresses, notifier, config),
    })
}
