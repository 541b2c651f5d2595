//! Configuration for the monitor, reporter, and toolkit.

use perf::{RuleRegistry, Thresholds, FRAME_BUDGET_MS, FRAME_WINDOW_CAPACITY, HISTORY_CAPACITY, SNAPSHOT_CAPACITY};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::TelemetryResult;
use crate::memory::FallbackEstimator;

/// Configuration for a [`PerformanceMonitor`](crate::PerformanceMonitor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    /// Time between ticks
    #[serde(with = "crate::duration_serde")]
    pub sample_interval: Duration,
    /// Frame intervals retained for statistics
    pub frame_window_capacity: usize,
    /// Snapshots retained in history
    pub history_capacity: usize,
    /// Intervals longer than this count as dropped frames
    pub frame_budget_ms: f64,
    /// Memory estimate used when no provider reading is available
    pub estimator: FallbackEstimator,
    /// Platform name used for platform-specific recommendations
    pub platform: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            frame_window_capacity: FRAME_WINDOW_CAPACITY,
            history_capacity: HISTORY_CAPACITY,
            frame_budget_ms: FRAME_BUDGET_MS,
            estimator: FallbackEstimator::default(),
            platform: detect_platform(),
        }
    }
}

impl MonitorConfig {
    /// Create a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick interval.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the frame window capacity.
    pub fn with_frame_window(mut self, capacity: usize) -> Self {
        self.frame_window_capacity = capacity;
        self
    }

    /// Set the history capacity.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the memory estimator.
    pub fn with_estimator(mut self, estimator: FallbackEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Override the detected platform.
    pub fn with_platform(mut self, platform: &str) -> Self {
        self.platform = platform.to_string();
        self
    }

    /// Check if the configured platform is a phone or tablet OS.
    pub fn is_mobile(&self) -> bool {
        matches!(self.platform.as_str(), "ios" | "android")
    }
}

/// Configuration for a [`PerformanceReporter`](crate::PerformanceReporter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReporterConfig {
    /// Labeled snapshots retained
    pub snapshot_capacity: usize,
    /// Interval between periodic snapshots while reporting
    #[serde(with = "crate::duration_serde")]
    pub snapshot_interval: Duration,
    /// Whether reporting evaluates alert rules
    pub alerting: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            snapshot_capacity: SNAPSHOT_CAPACITY,
            snapshot_interval: Duration::from_secs(30),
            alerting: true,
        }
    }
}

impl ReporterConfig {
    /// Set the snapshot capacity.
    pub fn with_snapshot_capacity(mut self, capacity: usize) -> Self {
        self.snapshot_capacity = capacity;
        self
    }

    /// Set the periodic snapshot interval.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Enable or disable alerting.
    pub fn with_alerting(mut self, enabled: bool) -> Self {
        self.alerting = enabled;
        self
    }
}

/// Everything a [`PerformanceToolkit`](crate::PerformanceToolkit) needs to
/// build its components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolkitConfig {
    /// Warning thresholds
    pub thresholds: Thresholds,
    /// Custom-metric rules
    pub rules: RuleRegistry,
    /// Monitor settings
    pub monitor: MonitorConfig,
    /// Reporter settings
    pub reporter: ReporterConfig,
}

impl ToolkitConfig {
    /// Parse a configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> TelemetryResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the configuration.
    pub fn to_json(&self) -> TelemetryResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set the thresholds.
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Set the custom-metric rules.
    pub fn with_rules(mut self, rules: RuleRegistry) -> Self {
        self.rules = rules;
        self
    }

    /// Set the monitor configuration.
    pub fn with_monitor(mut self, monitor: MonitorConfig) -> Self {
        self.monitor = monitor;
        self
    }

    /// Set the reporter configuration.
    pub fn with_reporter(mut self, reporter: ReporterConfig) -> Self {
        self.reporter = reporter;
        self
    }
}

/// Detect the current platform.
pub fn detect_platform() -> String {
    #[cfg(target_os = "ios")]
    {
        "ios".to_string()
    }
    #[cfg(target_os = "android")]
    {
        "android".to_string()
    }
    #[cfg(target_os = "macos")]
    {
        "macos".to_string()
    }
    #[cfg(target_os = "windows")]
    {
        "windows".to_string()
    }
    #[cfg(target_os = "linux")]
    {
        "linux".to_string()
    }
    #[cfg(not(any(
        target_os = "ios",
        target_os = "android",
        target_os = "macos",
        target_os = "windows",
        target_os = "linux"
    )))]
    {
        "unknown".to_string()
    }
}
