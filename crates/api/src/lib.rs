//! HTTP API server with observability for the bookstore cart and checkout.
//!
//! Provides REST endpoints for cart management, checkout, and order lookup,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{AddressBook, CartStore, InventoryLedger, OrderStore, UserDirectory};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Everything the HTTP layer needs from a storage backend.
pub trait Backend:
    CartStore + InventoryLedger + OrderStore + UserDirectory + AddressBook + Clone + 'static
{
}

impl<T> Backend for T where
    T: CartStore + InventoryLedger + OrderStore + UserDirectory + AddressBook + Clone + 'static
{
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Backend>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/v1/carts",
            post(routes::carts::create::<S>).delete(routes::carts::delete::<S>),
        )
        .route("/v1/carts/quantity", put(routes::carts::update_quantity::<S>))
        .route("/v1/users/{id}/cart", get(routes::carts::list::<S>))
        .route("/v1/checkout", post(routes::checkout::create::<S>))
        .route("/v1/orders/{id}", get(routes::orders::get::<S>))
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

/// Creates the application state over a single backend.
pub fn create_state<S: Backend>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState::new(store))
}
