//! Driver Drowsiness Monitor - Main Entry Point
//!
//! Usage: `drowsiness-monitor [config.toml]`

use anyhow::Context;
use api::{init_logging, run_server, Settings};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref()).context("loading settings")?;

    init_logging(&settings.logging);

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Thresholds: ear<{} mar>{} |yaw|>{} (window {})",
        settings.detection.eye_ar_thresh,
        settings.detection.mouth_ar_thresh,
        settings.detection.turn_threshold,
        settings.detection.smoothing_window
    );
    info!("Alert snapshots in {}", settings.alerts.snapshot_dir.display());

    run_server(settings).await.context("server failed")?;
    Ok(())
}
