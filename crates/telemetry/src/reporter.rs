//! Snapshots, benchmarks, alerts, and exports on top of a monitor.
//!
//! The [`PerformanceReporter`] owns a bounded list of labeled snapshots and a
//! benchmark registry. It only reads the monitor: through `current_metrics`
//! when it takes a snapshot, and through the metrics channel when alerting.
//!
//! While reporting, two background tasks run: a timer that takes a labeled
//! snapshot every interval, and an alert task that evaluates every metrics
//! event against the alert rules. [`stop_reporting`](PerformanceReporter::stop_reporting)
//! cancels the alert task only.

use chrono::{DateTime, Utc};
use perf::{BoundedWindow, MetricsSnapshot};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::alert::{alerts_for, PerformanceAlert};
use crate::analysis::{compare_snapshots, performance_score, window_start, Comparison, Snapshot, TrendAnalysis};
use crate::benchmark::{Benchmark, BenchmarkResult};
use crate::config::ReporterConfig;
use crate::enhanced::{EnhancedReport, PerformanceStatistics};
use crate::error::{TelemetryError, TelemetryResult};
use crate::monitor::PerformanceMonitor;

/// Snapshots compared pairwise in an enhanced report.
pub const COMPARISON_WINDOW: usize = 6;
/// Snapshots analyzed for the enhanced report trend.
pub const TREND_WINDOW: usize = 10;

const ALERT_CHANNEL_CAPACITY: usize = 64;
const COMPONENT: &str = "PerformanceReporter";

/// Output format for [`PerformanceReporter::save_report_to_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// The JSON export with snapshots and benchmarks
    Json,
    /// The enhanced report rendered as Markdown
    Markdown,
}

// =============================================================================
// Export Schema
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedMetrics<'a> {
    #[serde(flatten)]
    metrics: &'a MetricsSnapshot,
    fps: f64,
    is_healthy: bool,
}

#[derive(Serialize)]
struct ExportedSnapshot<'a> {
    label: &'a str,
    timestamp: DateTime<Utc>,
    metrics: &'a MetricsSnapshot,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonExport<'a> {
    current_metrics: ExportedMetrics<'a>,
    exported_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshots: Option<Vec<ExportedSnapshot<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    benchmarks: Option<&'a [Benchmark]>,
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug)]
struct ReporterState {
    disposed: bool,
    snapshots: BoundedWindow<Snapshot>,
    snapshot_counter: u64,
    benchmarks: Vec<Benchmark>,
    alert_tx: Option<broadcast::Sender<PerformanceAlert>>,
    snapshot_task: Option<JoinHandle<()>>,
    alert_task: Option<JoinHandle<()>>,
}

impl ReporterState {
    fn abort_tasks(&mut self) {
        if let Some(task) = self.snapshot_task.take() {
            task.abort();
        }
        if let Some(task) = self.alert_task.take() {
            task.abort();
        }
    }
}

#[derive(Debug)]
struct ReporterInner {
    monitor: PerformanceMonitor,
    config: ReporterConfig,
    state: Mutex<ReporterState>,
}

impl Drop for ReporterInner {
    fn drop(&mut self) {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_tasks();
    }
}

impl ReporterInner {
    fn lock(&self) -> MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live(&self) -> TelemetryResult<MutexGuard<'_, ReporterState>> {
        let state = self.lock();
        if state.disposed {
            return Err(TelemetryError::Disposed(COMPONENT));
        }
        Ok(state)
    }

    fn take_snapshot(&self, label: Option<&str>) -> TelemetryResult<Snapshot> {
        drop(self.live()?);
        let metrics = self.monitor.current_metrics()?;

        let mut state = self.live()?;
        state.snapshot_counter += 1;
        let label = match label {
            Some(label) => label.to_string(),
            None => format!("Snapshot {}", state.snapshot_counter),
        };
        let snapshot = Snapshot::new(label, metrics);
        if let Some(evicted) = state.snapshots.push(snapshot.clone()) {
            tracing::trace!(target: "telemetry::reporter", label = %evicted.label, "snapshot evicted");
        }

        tracing::debug!(
            target: "telemetry::reporter",
            label = %snapshot.label,
            fps = snapshot.metrics.fps(),
            memory_mb = snapshot.metrics.memory_mb(),
            "snapshot taken"
        );
        Ok(snapshot)
    }

    fn raise(&self, alert: PerformanceAlert) {
        tracing::warn!(
            target: "telemetry::reporter",
            kind = %alert.kind,
            severity = %alert.severity,
            value = alert.value,
            threshold = alert.threshold,
            "{}",
            alert.message
        );
        if let Some(tx) = &self.lock().alert_tx {
            // No subscribers is fine.
            let _ = tx.send(alert);
        }
    }
}

fn spawn_snapshot_timer(inner: &Arc<ReporterInner>, period: Duration, handle: &Handle) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    handle.spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            if let Err(err) = inner.take_snapshot(None) {
                tracing::debug!(target: "telemetry::reporter", error = %err, "snapshot timer stopping");
                break;
            }
        }
    })
}

fn spawn_alert_task(
    inner: &Arc<ReporterInner>,
    mut metrics: broadcast::Receiver<MetricsSnapshot>,
    handle: &Handle,
) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    handle.spawn(async move {
        loop {
            match metrics.recv().await {
                Ok(snapshot) => {
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    for alert in alerts_for(&snapshot) {
                        inner.raise(alert);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        target: "telemetry::reporter",
                        skipped = skipped,
                        "alert task lagged behind the metrics channel"
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// =============================================================================
// Public Handle
// =============================================================================

/// Builds snapshots, comparisons, benchmarks, alerts, and exports.
///
/// Cloning produces another handle to the same reporter.
#[derive(Debug, Clone)]
pub struct PerformanceReporter {
    inner: Arc<ReporterInner>,
}

impl PerformanceReporter {
    /// Reporter over `monitor` with default configuration.
    pub fn new(monitor: PerformanceMonitor) -> Self {
        Self::with_config(monitor, ReporterConfig::default())
    }

    /// Reporter over `monitor` with `config`.
    pub fn with_config(monitor: PerformanceMonitor, config: ReporterConfig) -> Self {
        let (alert_tx, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        let state = ReporterState {
            disposed: false,
            snapshots: BoundedWindow::new(config.snapshot_capacity),
            snapshot_counter: 0,
            benchmarks: Vec::new(),
            alert_tx: Some(alert_tx),
            snapshot_task: None,
            alert_task: None,
        };
        Self {
            inner: Arc::new(ReporterInner {
                monitor,
                config,
                state: Mutex::new(state),
            }),
        }
    }

    /// The monitor this reporter reads.
    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.inner.monitor
    }

    /// Active configuration.
    pub fn config(&self) -> &ReporterConfig {
        &self.inner.config
    }

    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    /// Capture the monitor's current metrics under a label.
    ///
    /// Without a label the snapshot is named after a running counter. The
    /// oldest snapshot is evicted once the list is full.
    pub fn take_snapshot(&self, label: Option<&str>) -> TelemetryResult<Snapshot> {
        self.inner.take_snapshot(label)
    }

    /// Retained snapshots, oldest first.
    pub fn snapshots(&self) -> TelemetryResult<Vec<Snapshot>> {
        Ok(self.inner.live()?.snapshots.to_vec())
    }

    /// Drop every retained snapshot.
    pub fn clear_snapshots(&self) -> TelemetryResult<()> {
        self.inner.live()?.snapshots.clear();
        Ok(())
    }

    /// Compare two snapshots.
    pub fn compare_snapshots(&self, before: &Snapshot, after: &Snapshot) -> Comparison {
        compare_snapshots(before, after)
    }

    // -------------------------------------------------------------------------
    // Benchmarks
    // -------------------------------------------------------------------------

    /// Add a benchmark to the registry, replacing one with the same name.
    pub fn register_benchmark(&self, benchmark: Benchmark) -> TelemetryResult<()> {
        let mut state = self.inner.live()?;
        match state.benchmarks.iter_mut().find(|b| b.name == benchmark.name) {
            Some(existing) => *existing = benchmark,
            None => state.benchmarks.push(benchmark),
        }
        Ok(())
    }

    /// Registered benchmarks in registration order.
    pub fn benchmarks(&self) -> TelemetryResult<Vec<Benchmark>> {
        Ok(self.inner.live()?.benchmarks.clone())
    }

    /// Run one benchmark.
    ///
    /// Takes a snapshot, waits for the benchmark's duration while monitoring
    /// continues, takes another snapshot, and scores the second one.
    pub async fn run_benchmark(&self, benchmark: &Benchmark) -> TelemetryResult<BenchmarkResult> {
        tracing::info!(
            target: "telemetry::reporter",
            name = %benchmark.name,
            duration_ms = benchmark.duration.as_millis() as u64,
            "benchmark started"
        );

        let before = self.take_snapshot(Some(&format!("{} (before)", benchmark.name)))?;
        let started = tokio::time::Instant::now();
        tokio::time::sleep(benchmark.duration).await;
        let elapsed = started.elapsed();
        let after = self.take_snapshot(Some(&format!("{} (after)", benchmark.name)))?;

        let result = BenchmarkResult::evaluate(benchmark.clone(), before.metrics, after.metrics, elapsed);
        tracing::info!(
            target: "telemetry::reporter",
            name = %benchmark.name,
            passed = result.passed,
            score = result.score,
            "benchmark finished"
        );
        Ok(result)
    }

    /// Run every registered benchmark in registration order.
    pub async fn run_all_benchmarks(&self) -> TelemetryResult<Vec<BenchmarkResult>> {
        let benchmarks = self.benchmarks()?;
        let mut results = Vec::with_capacity(benchmarks.len());
        for benchmark in &benchmarks {
            results.push(self.run_benchmark(benchmark).await?);
        }
        Ok(results)
    }

    // -------------------------------------------------------------------------
    // Reports
    // -------------------------------------------------------------------------

    /// Aggregate the snapshots taken within a trailing window.
    ///
    /// Returns zeroed statistics when none qualify.
    pub fn get_statistics(&self, time_range: Option<Duration>) -> TelemetryResult<PerformanceStatistics> {
        let state = self.inner.live()?;
        let start = window_start(time_range);
        Ok(PerformanceStatistics::from_metrics(
            state
                .snapshots
                .iter()
                .filter(|s| start.map_or(true, |start| s.timestamp >= start))
                .map(|s| &s.metrics),
        ))
    }

    /// The monitor's report extended with comparisons, a trend, a score, and
    /// snapshot statistics.
    pub async fn generate_enhanced_report(
        &self,
        time_range: Option<Duration>,
        include_recommendations: bool,
    ) -> TelemetryResult<EnhancedReport> {
        let base = self
            .inner
            .monitor
            .generate_report(time_range, include_recommendations)
            .await?;
        let snapshots = self.snapshots()?;

        let recent: Vec<&Snapshot> = snapshots
            .iter()
            .skip(snapshots.len().saturating_sub(COMPARISON_WINDOW))
            .collect();
        let comparisons = recent
            .windows(2)
            .map(|pair| compare_snapshots(pair[0], pair[1]))
            .collect();

        let trend_analysis = (snapshots.len() >= 2).then(|| {
            TrendAnalysis::from_metrics(
                snapshots
                    .iter()
                    .skip(snapshots.len().saturating_sub(TREND_WINDOW))
                    .map(|s| &s.metrics),
            )
        });

        let performance_score = performance_score(&base.metrics);
        let statistics = self.get_statistics(time_range)?;

        Ok(EnhancedReport {
            base,
            comparisons,
            trend_analysis,
            performance_score,
            statistics,
        })
    }

    // -------------------------------------------------------------------------
    // Reporting
    // -------------------------------------------------------------------------

    /// Start periodic snapshots and, optionally, alerting.
    ///
    /// Calling this again replaces both tasks.
    pub fn start_reporting(&self, snapshot_interval: Duration, enable_alerting: bool) -> TelemetryResult<()> {
        let handle = Handle::try_current().map_err(|_| TelemetryError::NoRuntime(COMPONENT))?;
        drop(self.inner.live()?);
        let period = snapshot_interval.max(Duration::from_millis(1));
        let metrics = if enable_alerting {
            Some(self.inner.monitor.subscribe()?)
        } else {
            None
        };

        let mut state = self.inner.live()?;
        state.abort_tasks();
        state.snapshot_task = Some(spawn_snapshot_timer(&self.inner, period, &handle));
        state.alert_task = metrics.map(|rx| spawn_alert_task(&self.inner, rx, &handle));

        tracing::info!(
            target: "telemetry::reporter",
            interval_ms = period.as_millis() as u64,
            alerting = enable_alerting,
            "reporting started"
        );
        Ok(())
    }

    /// Start reporting with the configured interval and alerting flag.
    pub fn start_reporting_with_config(&self) -> TelemetryResult<()> {
        self.start_reporting(self.inner.config.snapshot_interval, self.inner.config.alerting)
    }

    /// Stop evaluating alerts. Snapshots already taken are kept.
    pub fn stop_reporting(&self) {
        let mut state = self.inner.lock();
        if let Some(task) = state.alert_task.take() {
            task.abort();
            tracing::info!(target: "telemetry::reporter", "reporting stopped");
        }
    }

    /// Check if alerts are being evaluated.
    pub fn is_alerting(&self) -> bool {
        self.inner.lock().alert_task.is_some()
    }

    /// Receive alerts raised while reporting.
    pub fn alerts(&self) -> TelemetryResult<broadcast::Receiver<PerformanceAlert>> {
        let state = self.inner.live()?;
        state
            .alert_tx
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(TelemetryError::Disposed(COMPONENT))
    }

    // -------------------------------------------------------------------------
    // Export
    // -------------------------------------------------------------------------

    /// Serialize the current metrics, optionally with snapshots and the
    /// benchmark registry, as pretty-printed JSON.
    pub fn export_to_json(&self, include_snapshots: bool, include_benchmarks: bool) -> TelemetryResult<String> {
        let metrics = self.inner.monitor.current_metrics()?;
        let state = self.inner.live()?;

        let export = JsonExport {
            current_metrics: ExportedMetrics {
                metrics: &metrics,
                fps: metrics.fps(),
                is_healthy: metrics.is_healthy(),
            },
            exported_at: Utc::now(),
            snapshots: include_snapshots.then(|| {
                state
                    .snapshots
                    .iter()
                    .map(|s| ExportedSnapshot {
                        label: &s.label,
                        timestamp: s.timestamp,
                        metrics: &s.metrics,
                    })
                    .collect()
            }),
            benchmarks: include_benchmarks.then_some(state.benchmarks.as_slice()),
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Write a report to `path`.
    pub async fn save_report_to_file(&self, path: impl AsRef<Path>, format: ReportFormat) -> TelemetryResult<()> {
        let contents = match format {
            ReportFormat::Json => self.export_to_json(true, true)?,
            ReportFormat::Markdown => self.generate_enhanced_report(None, true).await?.to_markdown(),
        };
        let path = path.as_ref();
        tokio::fs::write(path, contents).await?;
        tracing::info!(target: "telemetry::reporter", path = %path.display(), format = ?format, "report saved");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Stop all tasks, close the alert channel, and drop every snapshot and
    /// benchmark. Later calls fail with [`TelemetryError::Disposed`].
    ///
    /// The monitor is not disposed.
    pub fn dispose(&self) {
        let mut state = self.inner.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.abort_tasks();
        state.alert_tx = None;
        state.snapshots.clear();
        state.benchmarks.clear();
        tracing::info!(target: "telemetry::reporter", "reporter disposed");
    }

    /// Check if [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }
}
