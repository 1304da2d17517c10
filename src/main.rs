// Main entry point - Dependency injection and server setup
use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    routing::{get, post, put},
};
use chrono::Utc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use dispatch_reports::application::data_source::DataSource;
use dispatch_reports::infrastructure::config::load_reports_config;
use dispatch_reports::infrastructure::realtime_client::StreamingPushTransport;
use dispatch_reports::infrastructure::rest_client::RestPullClient;
use dispatch_reports::presentation::app_state::AppState;
use dispatch_reports::presentation::handlers::{
    get_report, health_check, refresh_report, stream_report, update_params,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = load_reports_config()?;

    // Create channels (infrastructure layer)
    let pull = Arc::new(RestPullClient::new(
        config.api.base_url.clone(),
        config.api.token.clone(),
    ));
    let push = Arc::new(StreamingPushTransport::new(
        config.realtime.base_url.clone(),
        config.api.token.clone(),
        config.realtime.compress_frames,
        config.realtime.handshake_timeout(),
    ));

    // Start the data source (application layer)
    let (source, worker) = DataSource::spawn(
        push,
        pull,
        config.timing.to_settings(),
        config.query.to_params(Utc::now()),
    );

    let state = Arc::new(AppState {
        source: source.clone(),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/reports", get(get_report))
        .route("/reports/stream", get(stream_report))
        .route("/reports/refresh", post(refresh_report))
        .route("/reports/params", put(update_params))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!("Starting dispatch-reports service on {}", addr);

    // Stopping the source first ends open report streams so the server can drain
    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            let _ = source.shutdown().await;
        })
        .await?;

    worker.await?;

    Ok(())
}
