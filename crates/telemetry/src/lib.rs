//! Runtime Performance Telemetry
//!
//! This crate collects, aggregates, and analyzes runtime performance data for
//! an interactive UI process. It supports:
//!
//! - Frame cadence sampling with average, p95, and FPS over a sliding window
//! - Per-entity rebuild tracking with rate and severity classification
//! - Memory sampling through a pluggable provider with an estimate fallback
//! - Threshold and custom-metric warnings recomputed on every tick
//! - Labeled snapshots, comparisons, trend analysis, and scoring
//! - Timed benchmarks and real-time alerts
//! - JSON and Markdown export
//!
//! # Example
//!
//! ```rust,no_run
//! use telemetry::{PerformanceToolkit, ToolkitConfig, FrameTicker};
//!
//! # async fn run() -> telemetry::TelemetryResult<()> {
//! let ticker = FrameTicker::new();
//! let toolkit = PerformanceToolkit::new(ToolkitConfig::default())
//!     .with_frame_ticker(ticker.clone());
//! toolkit.initialize(None, true, true)?;
//!
//! // From the render loop, once per presented frame.
//! ticker.frame();
//!
//! // From entity render paths.
//! toolkit.monitor()?.track_rebuild("ListItem", Some("item-7"), None, None)?;
//!
//! let report = toolkit.generate_report(None, true).await?;
//! println!("{}", report.to_markdown());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`rebuild`] - Per-entity rebuild tracking
//! - [`monitor`] - Frame sampling, memory sampling, warnings, and history
//! - [`report`] - Monitor reports, issues, and recommendations
//! - [`analysis`] - Snapshot comparison, trends, and scoring
//! - [`reporter`] - Snapshots, benchmarks, alerts, and export
//! - [`toolkit`] - Single entry point and health check
//! - [`memory`] - Memory providers and the fallback estimator

mod alert;
pub mod analysis;
mod benchmark;
mod config;
mod duration_serde;
mod enhanced;
mod error;
mod frame;
pub mod memory;
pub mod monitor;
pub mod rebuild;
pub mod report;
pub mod reporter;
pub mod toolkit;

pub use alert::{alerts_for, PerformanceAlert};
pub use analysis::{compare_snapshots, performance_score, Comparison, Snapshot, TrendAnalysis};
pub use benchmark::{Benchmark, BenchmarkResult};
pub use config::{detect_platform, MonitorConfig, ReporterConfig, ToolkitConfig};
pub use enhanced::{EnhancedReport, PerformanceStatistics};
pub use error::{TelemetryError, TelemetryResult};
pub use frame::FrameTicker;
pub use memory::{FallbackEstimator, MemoryProvider, ProcMemoryProvider, StaticMemoryProvider};
pub use monitor::{MonitorBuilder, PerformanceMonitor};
pub use rebuild::{RebuildEvent, RebuildInfo, RebuildTracker};
pub use report::{ImpactLevel, PerformanceIssue, PerformanceReport, Recommendation, RecommendationPriority};
pub use reporter::{PerformanceReporter, ReportFormat};
pub use toolkit::{HealthCheck, HealthStatus, PerformanceToolkit};

/// Re-export of the metric primitives
pub use perf;
