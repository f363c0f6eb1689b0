//! HTTP API server with observability for stall reservations.
//!
//! Provides REST endpoints for booking and managing stalls, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod directory;
pub mod error;
pub mod extract;
pub mod identity;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use booking_store::BookingStore;
use domain::UserDirectory;
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::Notifier;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: BookingStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/reservations",
            post(routes::reservations::create::<S>).get(routes::reservations::list::<S>),
        )
        .route("/reservations/mine", get(routes::reservations::mine::<S>))
        .route(
            "/reservations/statistics",
            get(routes::reservations::statistics::<S>),
        )
        .route("/reservations/{id}", get(routes::reservations::get::<S>))
        .route(
            "/reservations/{id}/cancel",
            put(routes::reservations::cancel::<S>),
        )
        .route(
            "/reservations/{id}/send-confirmation",
            post(routes::reservations::send_confirmation::<S>),
        )
        .route(
            "/stalls",
            get(routes::stalls::list::<S>).post(routes::stalls::create::<S>),
        )
        .route(
            "/genres",
            get(routes::genres::list::<S>).post(routes::genres::create::<S>),
        )
        .route(
            "/genres/{id}",
            get(routes::genres::get::<S>)
                .put(routes::genres::update::<S>)
                .delete(routes::genres::delete::<S>),
        )
        .route("/stalls/available", get(routes::stalls::available::<S>))
        .route("/stalls/statistics", get(routes::stalls::statistics::<S>))
        .route(
            "/stalls/{id}",
            get(routes::stalls::get::<S>)
                .put(routes::stalls::update::<S>)
                .delete(routes::stalls::delete::<S>),
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

/// Creates the application state from configuration, starting the
/// confirmation worker.
///
/// The worker runs until every handle to the state is dropped, then
/// finishes the confirmations still queued and exits.
pub fn create_default_state<S: BookingStore + Clone + 'static>(
    store: S,
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    config: &Config,
) -> (Arc<AppState<S>>, JoinHandle<()>) {
    let (state, worker) = AppState::new(
        store,
        directory,
        notifier,
        config.allocation_policy(),
        config.retry_policy(),
        config.notify_queue_capacity,
    );
    (Arc::new(state), worker)
}
