// =============================================================================
// Meter Engine — Main Entry Point
// =============================================================================
//
// Loads configuration, starts the refresh loop and the read-only JSON export
// API, then waits for Ctrl+C.
// =============================================================================

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use meter_engine::api;
use meter_engine::app_state::AppState;
use meter_engine::refresh::run_refresh_loop;
use meter_engine::runtime_config::EngineConfig;
use meter_engine::signals::SignalPreset;

const DEFAULT_CONFIG_PATH: &str = "meter_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        NIFTY / BANKNIFTY Meter Engine — Starting Up      ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path = std::env::var("METER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());

    let mut config = if Path::new(&config_path).exists() {
        EngineConfig::load(&config_path)?
    } else {
        warn!(path = %config_path, "Config file not found, using defaults and writing a template");
        let config = EngineConfig::default();
        if let Err(e) = config.save(&config_path) {
            warn!(error = %e, "Failed to write config template");
        }
        config
    };

    // Environment overrides.
    if let Ok(path) = std::env::var("METER_FEED_PATH") {
        config.feed_path = path;
    }
    if let Ok(addr) = std::env::var("METER_BIND_ADDR") {
        config.bind_addr = addr;
    }
    if let Ok(preset) = std::env::var("METER_SIGNAL_PRESET") {
        let preset: SignalPreset = preset.parse()?;
        info!(%preset, "Applying signal preset from environment");
        config.signals = preset.params();
    }
    config.validate().context("invalid configuration after environment overrides")?;

    info!(
        instruments = ?config.instruments.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
        feed_path = %config.feed_path,
        refresh_interval_secs = config.refresh_interval_secs,
        mode = ?config.pipeline.mode,
        slope_method = %config.pipeline.slope_method,
        "Engine configured"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config));

    // ── 3. Refresh loop ──────────────────────────────────────────────────
    tokio::spawn(run_refresh_loop(Arc::clone(&state)));

    // ── 4. Start the API server ──────────────────────────────────────────
    let app = api::router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping");

    info!(
        cycles = state.health().cycles_completed,
        "Meter engine shut down complete."
    );
    Ok(())
}
