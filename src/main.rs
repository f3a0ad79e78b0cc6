//! # Link Shortener - runtime host
//!
//! Runs the background side of the core until the process is told to stop:
//! the click ingestion workers and the availability monitor.
//!
//! Shutdown order: stop the monitor, close the click queue and give the
//! workers the configured grace period, then close the database.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use link_shortener::{
    config::{Config, LogFormat},
    database::Database,
    monitor::HttpProber,
    services::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // a missing .env file is fine
    dotenvy::dotenv().ok();

    let config = Config::load().context("failed to load configuration")?;
    init_tracing(config.log_format);

    info!(environment = ?config.environment, "Starting link shortener");

    let database = Database::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to {}", config.database_url))?;
    database
        .migrate()
        .await
        .context("failed to apply database migrations")?;
    info!("Database ready");

    let prober = HttpProber::new().context("failed to build the HTTP prober")?;
    let worker_count = config.analytics.worker_count;
    let interval = config.monitor_interval();

    let state = AppState::new(database.clone(), config, Arc::new(prober))
        .context("invalid configuration")?;

    state
        .start_ingestion_workers(worker_count)
        .context("failed to start click workers")?;
    let monitor = state
        .start_monitor(interval)
        .context("failed to start the URL monitor")?;

    shutdown_signal().await;
    info!("Shutdown signal received");

    let report = state.shutdown(Some(monitor)).await;
    if report.abandoned > 0 {
        warn!(abandoned = report.abandoned, "Click events lost on shutdown");
    }

    database.close().await;
    info!("Stopped");

    Ok(())
}

/// Registry + env filter + pretty or JSON formatter.
fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("link_shortener=debug"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .pretty(),
            )
            .init(),
    }
}

/// Completes on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
