// Main entry point - Dependency injection and server setup
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use archive_viewport::application::controller::{ChartController, ControllerSettings};
use archive_viewport::application::runtime::spawn_controller;
use archive_viewport::application::worker::FetchPool;
use archive_viewport::domain::viewport::Viewport;
use archive_viewport::infrastructure::config::load_settings;
use archive_viewport::infrastructure::influx_archive::InfluxArchive;
use archive_viewport::presentation::app_state::AppState;
use archive_viewport::presentation::handlers::router;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

const EVENT_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings()?;
    let controller_settings = ControllerSettings::from(&settings);

    // Create archive backend (infrastructure layer)
    let archive = Arc::new(
        InfluxArchive::new(
            settings.influx.host.clone(),
            settings.influx.token.clone(),
            settings.influx.retention_policy.clone(),
            controller_settings.request_timeout,
        )
        .context("could not build archive client")?,
    );

    // Start the controller (application layer), viewing the last hour
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let (pool, completions) = FetchPool::new(
        archive,
        controller_settings.workers,
        controller_settings.fallback_lookback_secs,
        controller_settings.request_timeout,
    );
    let now_ms = chrono::Utc::now().timestamp_millis();
    let viewport = Viewport::ending_at(now_ms, 3_600.0).context("could not build initial viewport")?;
    let statistics_interval = controller_settings.statistics_interval;
    let controller = ChartController::new(controller_settings, viewport, Arc::new(events.clone()));
    let (handle, task) = spawn_controller(controller, pool, completions, statistics_interval);

    let state = Arc::new(AppState {
        controller: handle.clone(),
        events,
        default_buffer_size: settings.buffer.default_size,
    });

    // Chunks and JSON bodies are compressed by our own response builders
    let app = router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = settings
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", settings.server.bind))?;
    tracing::info!("Starting archive-viewport service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    handle.shutdown().await.ok();
    task.await?;
    Ok(())
}
