use anyhow::Context;
use axum::{routing::get, Router};
use digital_twin::anomaly::IsolationForest;
use digital_twin::config::Config;
use digital_twin::twin::DigitalTwin;
use digital_twin::{db, metrics, rest};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,digital_twin=debug")),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    info!("Starting {}", rest::SERVICE_TITLE);
    info!("HTTP server: {}", config.http_addr);
    info!("Database: {}", config.redacted_database_url());
    metrics::init_metrics().context("failed to register metrics")?;

    let pool = db::make_pool(&config.database_url, config.db_max_connections)
        .await
        .context("failed to open database")?;

    // Live history is memory-only; rows already in the database are not replayed.
    let detector = IsolationForest::new(config.forest.clone())?;
    let forest = detector.config();
    info!(
        "Anomaly model: {} trees, max_samples={}, contamination={}, seed={:?}",
        forest.n_trees, forest.max_samples, forest.contamination, forest.seed
    );
    let twin = DigitalTwin::new(detector).into_shared();

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(twin, pool.clone()))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.http_addr))?;

    info!("HTTP server listening on {}", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    pool.close().await;
    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
