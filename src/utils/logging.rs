use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize stdout plus JSON file logging. The returned guard must be held
/// for the lifetime of the process so the file writer flushes.
pub fn init_logging() -> Result<WorkerGuard> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::never("logs", "cellguard.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Build the subscriber
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=warn,hyper=warn")),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .json(),
        )
        .init();

    info!("Logging initialized");
    Ok(guard)
}
