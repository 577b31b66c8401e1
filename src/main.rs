use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

mod error;
mod handlers;
mod models;
mod services;
mod utils;

use handlers::create_app;
use models::config::AppConfig;
use services::pipeline::PipelineService;
use services::snapshot::SnapshotStore;
use services::source::{HttpTelemetrySource, TelemetrySource};
use utils::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let _log_guard = init_logging()?;

    info!("Starting CellGuard battery fleet monitor");

    // Load configuration
    let config = AppConfig::load().unwrap_or_default();
    info!(devices = config.source.devices.len(), "Configuration loaded");

    // Wire up the pipeline and its collaborators
    let source: Arc<dyn TelemetrySource> = Arc::new(HttpTelemetrySource::new(&config.source)?);
    let store = Arc::new(SnapshotStore::open(&config.pipeline.output_dir));
    let pipeline = Arc::new(PipelineService::new(&config, source, Arc::clone(&store)));

    // Start the periodic full refresh, if configured
    if config.pipeline.refresh_interval_secs > 0 {
        let pipeline_clone = Arc::clone(&pipeline);
        let interval_secs = config.pipeline.refresh_interval_secs;
        tokio::spawn(async move {
            background_refresh_loop(pipeline_clone, interval_secs).await;
        });
    }

    // Create and run the web server
    let app = create_app(pipeline, store);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn background_refresh_loop(pipeline: Arc<PipelineService>, interval_secs: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match pipeline.run_full().await {
            Ok(summary) => {
                info!(
                    records = summary.records,
                    devices = summary.verdicts.len(),
                    "Scheduled pipeline refresh complete"
                );
            }
            Err(e) => warn!("Scheduled pipeline refresh failed: {}", e),
        }
    }
}
