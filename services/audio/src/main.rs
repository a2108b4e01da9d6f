use anyhow::{Context, Result};
use audio_service::api::{start_api_server, AppState};
use audio_service::audio_store::PgAudioStore;
use audio_service::config::{Config, ServiceConfig};
use metrics::{describe_counter, Unit};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service);

    info!(
        service = %config.service.name,
        "Starting Audio Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    let store = PgAudioStore::new(&config.database)
        .await
        .context("Failed to initialize audio store")?;

    // Run migrations if enabled
    if config.database.run_migrations {
        store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let state = AppState::new(Arc::new(store));

    start_api_server(state, &config.api, shutdown_signal()).await?;

    info!("Audio service stopped");

    Ok(())
}

/// JSON logs; `RUST_LOG` wins over `service.log_level`
fn init_tracing(service: &ServiceConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&service.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_current_span(false))
        .init();
}

/// Prometheus exporter plus descriptions for the audio counters
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    describe_counter!("audio.uploads", "Audio files stored");
    describe_counter!("audio.upload_bytes", Unit::Bytes, "Bytes of audio stored");
    describe_counter!("audio.downloads", "Audio files streamed back");
    describe_counter!("audio.not_found", "Downloads for unknown audio IDs");
    describe_counter!("audio.errors", "Upload or download requests that failed");

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Resolves on SIGINT or SIGTERM; the API server then drains in-flight requests
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    };

    info!(signal = received, "Shutdown requested, draining in-flight audio requests");
}
