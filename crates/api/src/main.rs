//! API server entry point.

use std::error::Error;

use api::config::{Config, LogFormat};
use fulfillment::FulfillmentWorker;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{
    CartRepository, FulfillmentJobRepository, InMemoryStore, OrderRepository, PaymentRepository,
    PostgresStore, ProductRepository, SellerOrderRepository,
};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

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

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Runs the HTTP server and the fulfillment worker until shutdown.
async fn serve<S>(
    store: S,
    backend: &'static str,
    config: &Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), Box<dyn Error>>
where
    S: CartRepository
        + ProductRepository
        + OrderRepository
        + SellerOrderRepository
        + PaymentRepository
        + FulfillmentJobRepository
        + Clone
        + 'static,
{
    let state = api::create_default_state(store, config, backend);
    if !state.payments.config().is_configured() {
        tracing::warn!("payment gateway credentials missing; POST /payments will fail");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = FulfillmentWorker::new(
        state.services.runner.clone(),
        config.fulfillment_poll_interval,
    );
    let worker = tokio::spawn(worker.run(shutdown_rx));

    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, store = backend, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "fulfillment worker panicked");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Pick the store and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await?;
            let store = PostgresStore::new(pool);
            store.run_migrations().await?;
            serve(store, "postgres", &config, metrics_handle).await?;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            serve(InMemoryStore::new(), "memory", &config, metrics_handle).await?;
        }
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
