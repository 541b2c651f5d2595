//! Per-tick metrics snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::stats::{fps_from_interval, FrameStats, FRAME_BUDGET_MS};
use crate::thresholds::MIB;
use crate::warning::{Severity, Warning};

/// Lowest FPS a snapshot may report and still be healthy.
pub const HEALTHY_MIN_FPS: f64 = 55.0;

/// An immutable capture of the monitor's state, produced once per tick.
///
/// `fps` and `is_healthy` are derived on read from the stored fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Frames over budget during the tick
    pub frame_drops: u32,
    /// Latest memory reading in bytes
    pub memory_usage: u64,
    /// Highest memory reading over the monitor's lifetime
    pub peak_memory_usage: u64,
    /// Rebuild totals keyed by entity
    pub widget_rebuilds: BTreeMap<String, u64>,
    /// Mean frame interval in milliseconds
    pub average_frame_time: f64,
    /// 95th percentile frame interval in milliseconds
    pub p95_frame_time: f64,
    /// Active warnings, most severe first
    pub warnings: Vec<Warning>,
    /// Latest value of every reported custom metric
    pub custom_metrics: BTreeMap<String, f64>,
    /// Capture time
    pub timestamp: DateTime<Utc>,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            frame_drops: 0,
            memory_usage: 0,
            peak_memory_usage: 0,
            widget_rebuilds: BTreeMap::new(),
            average_frame_time: 0.0,
            p95_frame_time: 0.0,
            warnings: Vec::new(),
            custom_metrics: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }
}

impl MetricsSnapshot {
    /// Create an empty snapshot captured now.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to fill the frame fields from window statistics.
    pub fn with_frame_stats(mut self, stats: &FrameStats) -> Self {
        self.average_frame_time = stats.average_ms;
        self.p95_frame_time = stats.p95_ms;
        self
    }

    /// Builder method to set the frame-drop count.
    pub fn with_frame_drops(mut self, drops: u32) -> Self {
        self.frame_drops = drops;
        self
    }

    /// Builder method to set the memory readings.
    pub fn with_memory(mut self, current: u64, peak: u64) -> Self {
        self.memory_usage = current;
        self.peak_memory_usage = peak.max(current);
        self
    }

    /// Builder method to set the rebuild totals.
    pub fn with_rebuilds(mut self, rebuilds: BTreeMap<String, u64>) -> Self {
        self.widget_rebuilds = rebuilds;
        self
    }

    /// Builder method to set the warnings.
    pub fn with_warnings(mut self, warnings: Vec<Warning>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Builder method to set the custom metrics.
    pub fn with_custom_metrics(mut self, metrics: BTreeMap<String, f64>) -> Self {
        self.custom_metrics = metrics;
        self
    }

    /// Builder method to set the capture time.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Frames per second derived from the mean interval.
    ///
    /// Falls back to 60 when no interval has been observed.
    pub fn fps(&self) -> f64 {
        fps_from_interval(self.average_frame_time)
    }

    /// No drops, FPS at least 55, mean interval within budget, no warnings.
    pub fn is_healthy(&self) -> bool {
        self.frame_drops == 0
            && self.fps() >= HEALTHY_MIN_FPS
            && self.average_frame_time <= FRAME_BUDGET_MS
            && self.warnings.is_empty()
    }

    /// Sum of rebuild counts over all entities.
    pub fn total_rebuilds(&self) -> u64 {
        self.widget_rebuilds.values().sum()
    }

    /// Current memory in mebibytes.
    pub fn memory_mb(&self) -> f64 {
        self.memory_usage as f64 / MIB as f64
    }

    /// Most severe active warning level.
    pub fn worst_severity(&self) -> Option<Severity> {
        self.warnings.iter().map(|w| w.severity).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warning::WarningKind;
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn test_snapshot_defaults_healthy() {
        let snapshot = MetricsSnapshot::new();
        assert_eq!(snapshot.fps(), 60.0);
        assert!(snapshot.is_healthy());
        assert_eq!(snapshot.total_rebuilds(), 0);
        assert_eq!(snapshot.worst_severity(), None);
    }

    #[test]
    fn test_snapshot_from_stats() {
        let intervals = vec![Duration::from_millis(40); 10];
        let stats = FrameStats::from_intervals(&intervals);
        let snapshot = MetricsSnapshot::new().with_frame_stats(&stats);

        assert_eq!(snapshot.average_frame_time, 40.0);
        assert_eq!(snapshot.fps(), 25.0);
        assert!(!snapshot.is_healthy());
    }

    #[test]
    fn test_snapshot_memory_peak() {
        let snapshot = MetricsSnapshot::new().with_memory(300 * MIB, 100 * MIB);
        assert_eq!(snapshot.peak_memory_usage, 300 * MIB);
        assert_eq!(snapshot.memory_mb(), 300.0);
    }

    #[test]
    fn test_snapshot_total_rebuilds() {
        let mut rebuilds = BTreeMap::new();
        rebuilds.insert("ListItem".to_string(), 40);
        rebuilds.insert("Header".to_string(), 2);
        let snapshot = MetricsSnapshot::new().with_rebuilds(rebuilds);
        assert_eq!(snapshot.total_rebuilds(), 42);
    }

    #[test]
    fn test_snapshot_warning_makes_unhealthy() {
        let snapshot = MetricsSnapshot::new().with_warnings(vec![Warning::new(
            WarningKind::LargeTree,
            Severity::Low,
            "deep",
        )]);
        assert!(!snapshot.is_healthy());
        assert_eq!(snapshot.worst_severity(), Some(Severity::Low));
    }

    #[test]
    fn test_snapshot_json_fields() {
        let json = serde_json::to_value(MetricsSnapshot::new()).unwrap();
        assert!(json.get("frameDrops").is_some());
        assert!(json.get("peakMemoryUsage").is_some());
        assert!(json.get("widgetRebuilds").is_some());
        assert!(json.get("p95FrameTime").is_some());
    }

    proptest! {
        #[test]
        fn prop_is_healthy_biconditional(
            drops in 0u32..4,
            avg_us in 0u64..40_000,
            warning_count in 0usize..3,
        ) {
            let warnings = (0..warning_count)
                .map(|i| Warning::new(WarningKind::FrameDrops, Severity::Medium, format!("w{i}")))
                .collect();
            let snapshot = MetricsSnapshot::new()
                .with_frame_drops(drops)
                .with_warnings(warnings);
            let snapshot = MetricsSnapshot {
                average_frame_time: avg_us as f64 / 1000.0,
                ..snapshot
            };

            let expected = drops == 0
                && snapshot.fps() >= 55.0
                && snapshot.average_frame_time <= 16.67
                && warning_count == 0;
            prop_assert_eq!(snapshot.is_healthy(), expected);
        }
    }
}
