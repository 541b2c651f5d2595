//! Single entry point wiring one tracker, monitor, and reporter.
//!
//! The toolkit is the composition root for hosts that do not want to wire the
//! components themselves. It builds them on [`initialize`](PerformanceToolkit::initialize)
//! and tears them down on [`dispose`](PerformanceToolkit::dispose), after which it
//! can be initialized again.

use perf::{Clock, MetricsSnapshot, MonotonicClock, Thresholds, MIB};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::ToolkitConfig;
use crate::enhanced::EnhancedReport;
use crate::error::{TelemetryError, TelemetryResult};
use crate::frame::FrameTicker;
use crate::memory::MemoryProvider;
use crate::monitor::PerformanceMonitor;
use crate::rebuild::RebuildTracker;
use crate::reporter::PerformanceReporter;

/// FPS below which health is critical.
pub const HEALTH_CRITICAL_FPS: f64 = 30.0;
/// FPS below which health is degraded.
pub const HEALTH_WARNING_FPS: f64 = 50.0;
/// Memory above which health is degraded.
pub const HEALTH_WARNING_MEMORY: u64 = 400 * MIB;

/// Overall health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Good,
    Warning,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Good => "good",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Result of [`PerformanceToolkit::check_health`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    /// Classification
    pub status: HealthStatus,
    /// One entry per rule that fired
    pub reasons: Vec<String>,
    /// The metrics that were classified
    pub metrics: MetricsSnapshot,
}

impl HealthCheck {
    /// Classify a snapshot.
    pub fn classify(metrics: MetricsSnapshot) -> Self {
        let mut status = HealthStatus::Good;
        let mut reasons = Vec::new();

        let fps = metrics.fps();
        if fps < HEALTH_CRITICAL_FPS {
            status = HealthStatus::Critical;
            reasons.push(format!("Critical frame rate: {:.1} FPS", fps));
        } else if fps < HEALTH_WARNING_FPS {
            status = HealthStatus::Warning;
            reasons.push(format!("Low frame rate: {:.1} FPS", fps));
        }

        if metrics.memory_usage > HEALTH_WARNING_MEMORY {
            status = status.max(HealthStatus::Warning);
            reasons.push(format!("High memory usage: {:.1}MB", metrics.memory_mb()));
        }

        if !metrics.warnings.is_empty() {
            status = status.max(HealthStatus::Warning);
            reasons.push(format!("{} active warning(s)", metrics.warnings.len()));
        }

        Self {
            status,
            reasons,
            metrics,
        }
    }

    /// Check if nothing fired.
    pub fn is_good(&self) -> bool {
        self.status == HealthStatus::Good
    }
}

#[derive(Debug, Clone)]
struct Components {
    tracker: Arc<RebuildTracker>,
    monitor: PerformanceMonitor,
    reporter: PerformanceReporter,
}

/// Facade owning one tracker, monitor, and reporter.
///
/// # Example
///
/// ```rust,no_run
/// use telemetry::{PerformanceToolkit, ToolkitConfig};
///
/// # async fn run() -> telemetry::TelemetryResult<()> {
/// let toolkit = PerformanceToolkit::new(ToolkitConfig::default());
/// toolkit.initialize(None, true, true)?;
///
/// let health = toolkit.check_health()?;
/// println!("{}: {:?}", health.status, health.reasons);
///
/// let report = toolkit.generate_report(None, true).await?;
/// println!("{}", report);
/// toolkit.dispose();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PerformanceToolkit {
    config: ToolkitConfig,
    clock: Arc<dyn Clock>,
    memory: Option<Arc<dyn MemoryProvider>>,
    frames: Option<FrameTicker>,
    components: Mutex<Option<Components>>,
}

impl Default for PerformanceToolkit {
    fn default() -> Self {
        Self::new(ToolkitConfig::default())
    }
}

impl PerformanceToolkit {
    /// Toolkit with `config`. Nothing is built until `initialize`.
    pub fn new(config: ToolkitConfig) -> Self {
        Self {
            config,
            clock: Arc::new(MonotonicClock::new()),
            memory: None,
            frames: None,
            components: Mutex::new(None),
        }
    }

    /// Use `provider` for memory readings.
    pub fn with_memory_provider(mut self, provider: Arc<dyn MemoryProvider>) -> Self {
        self.memory = Some(provider);
        self
    }

    /// Feed the monitor from `ticker`.
    pub fn with_frame_ticker(mut self, ticker: FrameTicker) -> Self {
        self.frames = Some(ticker);
        self
    }

    /// Timestamp rebuilds with `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Toolkit configuration.
    pub fn config(&self) -> &ToolkitConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Option<Components>> {
        self.components.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn components(&self) -> TelemetryResult<Components> {
        self.lock().clone().ok_or(TelemetryError::NotInitialized)
    }

    fn build(&self) -> Components {
        let tracker = Arc::new(RebuildTracker::with_clock(self.clock.clone()));
        let mut builder = PerformanceMonitor::builder()
            .config(self.config.monitor.clone())
            .thresholds(self.config.thresholds.clone())
            .rules(self.config.rules.clone())
            .tracker(tracker.clone());
        if let Some(provider) = &self.memory {
            builder = builder.memory_provider(provider.clone());
        }
        if let Some(ticker) = &self.frames {
            builder = builder.frame_ticker(ticker.clone());
        }
        let monitor = builder.build();
        let reporter = PerformanceReporter::with_config(monitor.clone(), self.config.reporter.clone());

        Components {
            tracker,
            monitor,
            reporter,
        }
    }

    /// Build the components if needed, apply `thresholds`, and optionally
    /// start monitoring and reporting.
    ///
    /// Starting either needs a Tokio runtime. Calling this again reuses the
    /// existing components.
    pub fn initialize(
        &self,
        thresholds: Option<Thresholds>,
        auto_start_monitoring: bool,
        enable_reporting: bool,
    ) -> TelemetryResult<()> {
        let components = {
            let mut slot = self.lock();
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let built = self.build();
                    *slot = Some(built.clone());
                    tracing::info!(
                        target: "telemetry::toolkit",
                        platform = %self.config.monitor.platform,
                        "toolkit initialized"
                    );
                    built
                }
            }
        };

        if let Some(thresholds) = thresholds {
            components.monitor.set_thresholds(thresholds)?;
        }
        if auto_start_monitoring {
            components.monitor.start_monitoring()?;
        }
        if enable_reporting {
            components.reporter.start_reporting(
                self.config.reporter.snapshot_interval,
                self.config.reporter.alerting,
            )?;
        }
        Ok(())
    }

    /// Check if the components exist.
    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    /// The shared rebuild tracker.
    pub fn tracker(&self) -> TelemetryResult<Arc<RebuildTracker>> {
        Ok(self.components()?.tracker)
    }

    /// The monitor.
    pub fn monitor(&self) -> TelemetryResult<PerformanceMonitor> {
        Ok(self.components()?.monitor)
    }

    /// The reporter.
    pub fn reporter(&self) -> TelemetryResult<PerformanceReporter> {
        Ok(self.components()?.reporter)
    }

    /// Classify the monitor's current metrics.
    pub fn check_health(&self) -> TelemetryResult<HealthCheck> {
        let metrics = self.components()?.monitor.current_metrics()?;
        Ok(HealthCheck::classify(metrics))
    }

    /// The reporter's enhanced report.
    pub async fn generate_report(
        &self,
        time_range: Option<Duration>,
        include_recommendations: bool,
    ) -> TelemetryResult<EnhancedReport> {
        let reporter = self.components()?.reporter;
        reporter
            .generate_enhanced_report(time_range, include_recommendations)
            .await
    }

    /// Dispose every component and forget them.
    pub fn dispose(&self) {
        let Some(components) = self.lock().take() else {
            return;
        };
        components.reporter.dispose();
        components.monitor.dispose();
        components.tracker.dispose();
        tracing::info!(target: "telemetry::toolkit", "toolkit disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MonitorConfig, ReporterConfig};
    use crate::memory::StaticMemoryProvider;
    use perf::{Severity, Warning, WarningKind};

    fn metrics(avg_frame: f64, memory_mb: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            average_frame_time: avg_frame,
            ..MetricsSnapshot::new().with_memory(memory_mb * MIB, memory_mb * MIB)
        }
    }

    #[test]
    fn test_health_classification() {
        let good = HealthCheck::classify(metrics(16.0, 100));
        assert_eq!(good.status, HealthStatus::Good);
        assert!(good.reasons.is_empty());

        let slow = HealthCheck::classify(metrics(25.0, 100));
        assert_eq!(slow.status, HealthStatus::Warning);
        assert_eq!(slow.reasons, vec!["Low frame rate: 40.0 FPS"]);

        let heavy = HealthCheck::classify(metrics(16.0, 450));
        assert_eq!(heavy.status, HealthStatus::Warning);
        assert_eq!(heavy.reasons, vec!["High memory usage: 450.0MB"]);

        let warned = HealthCheck::classify(
            metrics(16.0, 100).with_warnings(vec![Warning::new(WarningKind::LargeTree, Severity::Low, "deep")]),
        );
        assert_eq!(warned.status, HealthStatus::Warning);

        let broken = HealthCheck::classify(metrics(50.0, 450));
        assert_eq!(broken.status, HealthStatus::Critical);
        assert_eq!(broken.reasons.len(), 2);
    }

    #[test]
    fn test_accessors_require_initialize() {
        let toolkit = PerformanceToolkit::default();
        assert!(!toolkit.is_initialized());
        assert!(matches!(toolkit.monitor(), Err(TelemetryError::NotInitialized)));
        assert!(matches!(toolkit.check_health(), Err(TelemetryError::NotInitialized)));
    }

    #[test]
    fn test_initialize_without_starting() {
        let toolkit = PerformanceToolkit::default();
        toolkit.initialize(Some(Thresholds::strict()), false, false).unwrap();

        assert!(toolkit.is_initialized());
        assert_eq!(toolkit.monitor().unwrap().thresholds(), Thresholds::strict());
        assert!(!toolkit.monitor().unwrap().is_monitoring());
        assert!(toolkit.check_health().unwrap().is_good());
    }

    #[test]
    fn test_initialize_reuses_components() {
        let toolkit = PerformanceToolkit::default();
        toolkit.initialize(None, false, false).unwrap();
        let tracker = toolkit.tracker().unwrap();

        toolkit.initialize(Some(Thresholds::relaxed()), false, false).unwrap();

        assert!(Arc::ptr_eq(&tracker, &toolkit.tracker().unwrap()));
        assert!(Arc::ptr_eq(&tracker, toolkit.monitor().unwrap().tracker()));
        assert_eq!(toolkit.monitor().unwrap().thresholds(), Thresholds::relaxed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_starts_everything() {
        let config = ToolkitConfig::default()
            .with_reporter(ReporterConfig::default().with_snapshot_interval(Duration::from_secs(2)));
        let toolkit = PerformanceToolkit::new(config)
            .with_memory_provider(Arc::new(StaticMemoryProvider::new(420 * MIB)));
        toolkit.initialize(None, true, true).unwrap();

        let monitor = toolkit.monitor().unwrap();
        let reporter = toolkit.reporter().unwrap();
        assert!(monitor.is_monitoring());
        assert!(toolkit.tracker().unwrap().is_tracking());
        assert!(reporter.is_alerting());

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(reporter.snapshots().unwrap().len(), 2);
        assert_eq!(monitor.history().unwrap().len(), 4);

        // The provider reading lands on the ticks.
        let health = toolkit.check_health().unwrap();
        assert_eq!(health.status, HealthStatus::Warning);
        assert_eq!(health.metrics.memory_usage, 420 * MIB);

        let report = toolkit.generate_report(None, true).await.unwrap();
        assert_eq!(report.statistics.sample_count, 2);
        toolkit.dispose();
    }

    #[tokio::test]
    async fn test_dispose_allows_reinitialize() {
        let config = ToolkitConfig::default().with_monitor(MonitorConfig::default().with_platform("android"));
        let toolkit = PerformanceToolkit::new(config);
        toolkit.initialize(None, true, false).unwrap();
        let old_monitor = toolkit.monitor().unwrap();
        let old_tracker = toolkit.tracker().unwrap();

        toolkit.dispose();

        assert!(!toolkit.is_initialized());
        assert!(old_monitor.is_disposed());
        assert!(old_tracker.is_disposed());
        assert!(matches!(toolkit.reporter(), Err(TelemetryError::NotInitialized)));

        toolkit.initialize(None, false, false).unwrap();
        let monitor = toolkit.monitor().unwrap();
        assert!(!monitor.is_disposed());
        assert!(monitor.config().is_mobile());
        toolkit.dispose();
    }

    #[test]
    fn test_start_needs_runtime() {
        let toolkit = PerformanceToolkit::default();
        assert!(matches!(
            toolkit.initialize(None, true, false),
            Err(TelemetryError::NoRuntime(_))
        ));
        // The components were still built.
        assert!(toolkit.is_initialized());
    }
}
