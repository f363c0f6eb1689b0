//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use booking_store::{BookingStore, InMemoryBookingStore, PostgresBookingStore};
use domain::UserDirectory;
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::{LogNotifier, Notifier};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use api::config::Config;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// How long queued confirmations may take to drain after shutdown.
const CONFIRMATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

async fn serve<S: BookingStore + Clone + 'static>(
    store: S,
    directory: Arc<dyn UserDirectory>,
    config: &Config,
    metrics_handle: PrometheusHandle,
) {
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let (state, worker) = api::create_default_state(store, directory, notifier, config);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // The router and its state are gone, so the worker sees a closed queue
    match tokio::time::timeout(CONFIRMATION_DRAIN_TIMEOUT, worker).await {
        Ok(Ok(())) => tracing::info!("pending confirmations delivered"),
        Ok(Err(e)) => tracing::error!(error = %e, "confirmation worker failed"),
        Err(_) => tracing::warn!("gave up waiting for pending confirmations"),
    }

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("invalid configuration");

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.warn_on_overrides();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the store and serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresBookingStore::new(pool.clone());
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            let directory = api::directory::directory_from_config(&config, Some(pool))
                .await
                .expect("failed to prepare user directory");
            tracing::info!("using PostgreSQL booking store");
            serve(store, directory, &config, metrics_handle).await;
        }
        None => {
            let directory = api::directory::directory_from_config(&config, None)
                .await
                .expect("failed to prepare user directory");
            tracing::info!("DATABASE_URL not set, using in-memory booking store");
            serve(InMemoryBookingStore::new(), directory, &config, metrics_handle).await;
        }
    }
}
