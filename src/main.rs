use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pagespeed_lab::config::{CliArgs, LabConfig};
use pagespeed_lab::log_capture::{LogLevel, LogSource};
use pagespeed_lab::server;
use pagespeed_lab::settings::load_settings;
use pagespeed_lab::state::LabState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // Initialize tracing; the guard flushes the file writer on exit.
    let (file_layer, _log_guard) = match &args.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Log file path has no file name: {:?}", path))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagespeed_lab=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    info!("Starting pagespeed-lab v{}", env!("CARGO_PKG_VERSION"));

    let mut config = LabConfig::from_args(args);
    load_settings(&config.settings_path).apply(&mut config);
    info!(
        "Backend: {}, polling: initial {:?}, every {:?}, max {} polls",
        config.backend_kind(),
        config.poll.initial_delay,
        config.poll.poll_interval,
        config.poll.max_polls
    );

    let port = config.port;
    let state = Arc::new(LabState::new(config)?);

    state
        .logs
        .emit(
            LogSource::Lab,
            LogLevel::Info,
            format!("Lab starting on port {}", port),
        )
        .await;

    let router = server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Lab listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Lab shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
