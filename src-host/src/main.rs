//! Perf Probe - drives the telemetry engine against a simulated render loop.
//!
//! Usage: `perf-probe [CONFIG_JSON] [REPORT_PATH]`
//!
//! Without a report path the Markdown report is printed to stdout. Set
//! `RUST_LOG=telemetry=debug` to watch ticks and snapshots.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{
    FrameTicker, PerformanceToolkit, ProcMemoryProvider, ReportFormat, ToolkitConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Frames rendered by the simulation (about three seconds at 60 FPS).
const SIMULATED_FRAMES: u32 = 180;
/// Every n-th frame takes three frame budgets.
const SLOW_FRAME_EVERY: u32 = 20;
const LIST_ITEMS: u32 = 12;

async fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ToolkitConfig> {
    let Some(path) = path else {
        return Ok(ToolkitConfig::default());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = ToolkitConfig::from_json(&text).with_context(|| format!("parsing config {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// Render frames at roughly 60 FPS with a periodic slow frame, rebuilding
/// list items as a scrolling list would.
async fn simulate(toolkit: &PerformanceToolkit, ticker: &FrameTicker) -> anyhow::Result<()> {
    let monitor = toolkit.monitor()?;
    let frame_budget = Duration::from_micros(16_667);

    for frame in 0..SIMULATED_FRAMES {
        let work = if frame % SLOW_FRAME_EVERY == 0 {
            frame_budget * 3
        } else {
            frame_budget
        };
        tokio::time::sleep(work).await;
        ticker.frame();

        let item = format!("item-{}", frame % LIST_ITEMS);
        monitor.track_rebuild("ListItem", Some(&item), Some("list_view.rs:42"), Some(work / 4))?;
        if frame % 60 == 0 {
            monitor.track_rebuild("Toolbar", None, None, None)?;
        }
    }

    monitor.report_custom_metric("api_response_time", 850.0, Some("ms"))?;
    monitor.report_custom_metric("cache_hit_ratio", 0.92, None)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args_os().skip(1).map(PathBuf::from);
    let config_path = args.next();
    let report_path = args.next();

    let config = load_config(config_path.as_ref()).await?;
    let ticker = FrameTicker::new();
    let mut toolkit = PerformanceToolkit::new(config).with_frame_ticker(ticker.clone());
    if cfg!(target_os = "linux") {
        toolkit = toolkit.with_memory_provider(Arc::new(ProcMemoryProvider::new()));
    }

    toolkit.initialize(None, true, true)?;
    let reporter = toolkit.reporter()?;
    reporter.take_snapshot(Some("start"))?;

    simulate(&toolkit, &ticker).await?;
    reporter.take_snapshot(Some("after scroll"))?;

    let health = toolkit.check_health()?;
    tracing::info!(status = %health.status, reasons = ?health.reasons, "health check");

    match report_path {
        Some(path) => {
            let format = match path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => ReportFormat::Json,
                _ => ReportFormat::Markdown,
            };
            reporter
                .save_report_to_file(&path, format)
                .await
                .with_context(|| format!("writing report {}", path.display()))?;
            tracing::info!(path = %path.display(), "report written");
        }
        None => {
            let report = toolkit.generate_report(None, true).await?;
            println!("{}", report);
        }
    }

    toolkit.dispose();
    Ok(())
}
