//! Ticker Stream Binary
//!
//! Streams live tickers from one venue and logs each update.
//!
//! # Usage
//!
//! ```bash
//! TICKER_INSTRUMENTS=BTC-USDT-SWAP,ETH-USDT-SWAP cargo run --bin ticker-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TICKER_INSTRUMENTS`: Comma-separated instrument ids
//!
//! ## Optional
//! - `TICKER_VENUE`: okx | binance (default: okx)
//! - `TICKER_ENDPOINT`: WebSocket endpoint override
//! - `TICKER_PROXY_HOST` / `TICKER_PROXY_PORT`: HTTP CONNECT proxy
//! - `TICKER_RECEIVE_TIMEOUT_SECS`: Silence before a heartbeat (default: 5)
//! - `TICKER_DEAD_LINK_SECS`: Silence before reconnecting (default: 30)
//! - `TICKER_RECONNECT_DELAY_SECS`: Delay between reconnects (default: 5)
//! - `TICKER_HISTORY_CAPACITY`: Points kept per instrument (default: 100)
//! - `TICKER_METRICS_PORT`: Prometheus port, 0 to disable (default: 9091)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `RUST_LOG`: Log level (default: `ticker_stream=info`)

use std::time::Duration;

use anyhow::Context;
use ticker_stream::{
    Callbacks, DisplayUpdate, MonitorConfig, TrafficReadout, init_metrics, init_telemetry,
    start_session,
};
use tokio::signal;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    // Keep the guard alive so spans are flushed on exit.
    let _telemetry_guard = init_telemetry().context("failed to initialize telemetry")?;

    tracing::info!("Starting Ticker Stream");

    let config = MonitorConfig::from_env().context("invalid configuration")?;
    init_metrics(config.metrics_port).context("failed to initialize metrics")?;
    log_config(&config);

    let listener = Callbacks::new(
        |update: DisplayUpdate| {
            tracing::info!(
                venue = %update.venue,
                instrument = %update.instrument,
                classification = ?update.classification,
                high_24h = %update.high_24h,
                low_24h = %update.low_24h,
                "{}",
                update.headline()
            );
        },
        |total_bytes| tracing::debug!(traffic = %TrafficReadout::from(total_bytes), "Traffic"),
    );

    let handle = start_session(config.venue, config.instruments, listener, config.session)?;

    await_shutdown().await?;

    handle.stop();
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle.join()).await {
        Ok(Ok(())) => tracing::info!("Ticker stream stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Session ended abnormally"),
        Err(_) => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Session did not stop in time"
        ),
    }

    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &MonitorConfig) {
    tracing::info!(
        venue = %config.venue,
        instruments = config.instruments.len(),
        metrics_port = config.metrics_port,
        proxy = config.session.proxy.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        endpoint = config.session.endpoint.as_deref().unwrap_or("default"),
        receive_timeout_ms = config.session.receive_timeout.as_millis(),
        dead_link_ms = config.session.dead_link_threshold.as_millis(),
        history_capacity = config.session.history_capacity,
        "Session settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn await_shutdown() -> std::io::Result<()> {
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate.recv() => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
    Ok(())
}

/// Wait for Ctrl+C.
#[cfg(not(unix))]
async fn await_shutdown() -> std::io::Result<()> {
    signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C, initiating shutdown");
    Ok(())
}
