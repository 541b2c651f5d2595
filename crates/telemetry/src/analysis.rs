//! Snapshot comparison, trend analysis, and scoring.
//!
//! Everything here is a pure function of snapshot values; the reporter and the
//! monitor call into it with copies of their state.

use chrono::{DateTime, Utc};
use perf::{classify_trend, mean, MetricsSnapshot, TrendDirection, MIB};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// FPS change that counts as significant.
pub const FPS_CHANGE_THRESHOLD: f64 = 1.0;
/// Memory change in bytes that counts as significant.
pub const MEMORY_CHANGE_THRESHOLD: i64 = 5 * MIB as i64;
/// Frame interval change in milliseconds that counts as significant.
pub const FRAME_TIME_CHANGE_THRESHOLD: f64 = 1.0;
/// Rebuild count change that counts as significant.
pub const REBUILD_CHANGE_THRESHOLD: i64 = 10;

/// Summary used when no metric moved significantly.
pub const NO_SIGNIFICANT_CHANGE: &str = "No significant change";

// =============================================================================
// Snapshots
// =============================================================================

/// A labeled capture of the monitor's metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Unique identifier
    pub id: Uuid,
    /// Caller-supplied or generated label
    pub label: String,
    /// Captured metrics
    pub metrics: MetricsSnapshot,
    /// Capture time
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    /// Label a metrics capture, timestamped now.
    pub fn new(label: impl Into<String>, metrics: MetricsSnapshot) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            metrics,
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Comparison
// =============================================================================

/// Difference between two snapshots, `after - before`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    /// Label of the earlier snapshot
    pub before_label: String,
    /// Label of the later snapshot
    pub after_label: String,
    /// Change in frames per second
    pub fps_delta: f64,
    /// Change in memory usage in bytes
    pub memory_delta: i64,
    /// Change in mean frame interval in milliseconds
    pub frame_time_delta: f64,
    /// Change in total rebuilds across all entities
    pub rebuild_delta: i64,
    /// One phrase per significant change
    pub changes: Vec<String>,
    /// Changes joined into one sentence
    pub summary: String,
    /// FPS rose while memory and frame time both fell
    pub is_improvement: bool,
    /// Any of FPS, memory, or frame time moved the wrong way
    pub is_regression: bool,
}

impl Comparison {
    /// Memory change in mebibytes.
    pub fn memory_delta_mb(&self) -> f64 {
        self.memory_delta as f64 / MIB as f64
    }
}

/// Compare two snapshots.
///
/// An improvement requires every metric to get better at once, while a single
/// metric getting worse is enough for a regression.
pub fn compare_snapshots(before: &Snapshot, after: &Snapshot) -> Comparison {
    let fps_delta = after.metrics.fps() - before.metrics.fps();
    let memory_delta = after.metrics.memory_usage as i64 - before.metrics.memory_usage as i64;
    let frame_time_delta = after.metrics.average_frame_time - before.metrics.average_frame_time;
    let rebuild_delta = after.metrics.total_rebuilds() as i64 - before.metrics.total_rebuilds() as i64;

    let mut changes = Vec::new();

    if fps_delta > FPS_CHANGE_THRESHOLD {
        changes.push(format!("FPS improved by {:.1}", fps_delta));
    } else if fps_delta < -FPS_CHANGE_THRESHOLD {
        changes.push(format!("FPS dropped by {:.1}", -fps_delta));
    }

    let memory_mb = memory_delta as f64 / MIB as f64;
    if memory_delta > MEMORY_CHANGE_THRESHOLD {
        changes.push(format!("Memory usage regressed by {:.1}MB", memory_mb));
    } else if memory_delta < -MEMORY_CHANGE_THRESHOLD {
        changes.push(format!("Memory usage improved by {:.1}MB", -memory_mb));
    }

    if frame_time_delta > FRAME_TIME_CHANGE_THRESHOLD {
        changes.push(format!("Frame time regressed by {:.2}ms", frame_time_delta));
    } else if frame_time_delta < -FRAME_TIME_CHANGE_THRESHOLD {
        changes.push(format!("Frame time improved by {:.2}ms", -frame_time_delta));
    }

    if rebuild_delta > REBUILD_CHANGE_THRESHOLD {
        changes.push(format!("{} more rebuilds", rebuild_delta));
    } else if rebuild_delta < -REBUILD_CHANGE_THRESHOLD {
        changes.push(format!("{} fewer rebuilds", -rebuild_delta));
    }

    let summary = if changes.is_empty() {
        NO_SIGNIFICANT_CHANGE.to_string()
    } else {
        changes.join("; ")
    };

    Comparison {
        before_label: before.label.clone(),
        after_label: after.label.clone(),
        fps_delta,
        memory_delta,
        frame_time_delta,
        rebuild_delta,
        changes,
        summary,
        is_improvement: fps_delta > 0.0 && memory_delta < 0 && frame_time_delta < 0.0,
        is_regression: fps_delta < 0.0 || memory_delta > 0 || frame_time_delta > 0.0,
    }
}

// =============================================================================
// Trends
// =============================================================================

/// Direction of the main metrics over a series of snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    /// Snapshots analyzed
    pub sample_count: usize,
    /// Higher FPS is better
    pub fps: TrendDirection,
    /// Lower memory is better
    pub memory: TrendDirection,
    /// Lower frame time is better
    pub frame_time: TrendDirection,
    /// Majority vote across the three
    pub overall: TrendDirection,
    /// Mean FPS over the series
    pub average_fps: f64,
    /// Mean memory over the series in bytes
    pub average_memory: f64,
    /// Mean frame interval over the series in milliseconds
    pub average_frame_time: f64,
}

impl TrendAnalysis {
    /// Classify each metric by comparing the first half of the series to the second.
    pub fn from_metrics<'a>(series: impl IntoIterator<Item = &'a MetricsSnapshot>) -> Self {
        let mut fps = Vec::new();
        let mut memory = Vec::new();
        let mut frame_time = Vec::new();
        for metrics in series {
            fps.push(metrics.fps());
            memory.push(metrics.memory_usage as f64);
            frame_time.push(metrics.average_frame_time);
        }

        let fps_trend = classify_trend(&fps, true);
        let memory_trend = classify_trend(&memory, false);
        let frame_trend = classify_trend(&frame_time, false);

        Self {
            sample_count: fps.len(),
            fps: fps_trend,
            memory: memory_trend,
            frame_time: frame_trend,
            overall: TrendDirection::majority(&[fps_trend, memory_trend, frame_trend]),
            average_fps: mean(&fps),
            average_memory: mean(&memory),
            average_frame_time: mean(&frame_time),
        }
    }
}

/// Start of a trailing window ending now, or `None` for an unbounded window.
pub(crate) fn window_start(range: Option<std::time::Duration>) -> Option<DateTime<Utc>> {
    let range = chrono::Duration::from_std(range?).ok()?;
    Utc::now().checked_sub_signed(range)
}

// =============================================================================
// Scoring
// =============================================================================

/// FPS at which the FPS component is maxed out.
pub const SCORE_TARGET_FPS: f64 = 60.0;
/// Memory in megabytes at which the memory component reaches zero.
pub const SCORE_MEMORY_CEILING_MB: f64 = 500.0;
/// Frame interval in milliseconds at which the frame component reaches zero.
pub const SCORE_FRAME_TIME_CEILING_MS: f64 = 33.33;
/// Points each active warning costs.
pub const SCORE_WARNING_PENALTY: f64 = 2.0;
/// Points reserved for a warning-free snapshot; also the penalty cap.
pub const SCORE_WARNING_BUDGET: f64 = 10.0;

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Overall 0-100 health score for a snapshot.
///
/// FPS contributes up to 40 points, memory 30, and frame interval 20. The last
/// 10 points are a warnings budget: each active warning spends 2 of them.
/// Rebuild activity only counts through the warnings it raises.
pub fn performance_score(metrics: &MetricsSnapshot) -> f64 {
    let fps = 40.0 * unit(metrics.fps() / SCORE_TARGET_FPS);
    let memory = 30.0 * unit(1.0 - metrics.memory_mb() / SCORE_MEMORY_CEILING_MB);
    let frame = 20.0 * unit(1.0 - metrics.average_frame_time / SCORE_FRAME_TIME_CEILING_MS);
    let penalty = (SCORE_WARNING_PENALTY * metrics.warnings.len() as f64).min(SCORE_WARNING_BUDGET);
    let warnings = SCORE_WARNING_BUDGET - penalty;

    (fps + memory + frame + warnings).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use perf::{Severity, Warning, WarningKind};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn metrics(avg_frame: f64, memory_mb: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            average_frame_time: avg_frame,
            ..MetricsSnapshot::new().with_memory(memory_mb * MIB, memory_mb * MIB)
        }
    }

    #[test]
    fn test_compare_with_itself() {
        let snapshot = Snapshot::new("a", metrics(20.0, 100));
        let comparison = compare_snapshots(&snapshot, &snapshot);

        assert_eq!(comparison.fps_delta, 0.0);
        assert_eq!(comparison.memory_delta, 0);
        assert_eq!(comparison.frame_time_delta, 0.0);
        assert_eq!(comparison.rebuild_delta, 0);
        assert_eq!(comparison.summary, NO_SIGNIFICANT_CHANGE);
        assert!(!comparison.is_improvement);
        assert!(!comparison.is_regression);
    }

    #[test]
    fn test_compare_improvement() {
        let before = Snapshot::new("before", metrics(25.0, 200));
        let after = Snapshot::new("after", metrics(16.0, 150));
        let comparison = compare_snapshots(&before, &after);

        assert!(comparison.fps_delta > 1.0);
        assert_eq!(comparison.memory_delta_mb(), -50.0);
        assert!(comparison.is_improvement);
        assert!(!comparison.is_regression);
        assert!(comparison.summary.contains("FPS improved"));
        assert!(comparison.summary.contains("Memory usage improved by 50.0MB"));
    }

    #[test]
    fn test_compare_mixed_is_regression_only() {
        // Faster frames but more memory
        let before = Snapshot::new("before", metrics(25.0, 100));
        let after = Snapshot::new("after", metrics(16.0, 120));
        let comparison = compare_snapshots(&before, &after);

        assert!(!comparison.is_improvement);
        assert!(comparison.is_regression);
        assert!(comparison.summary.contains("Memory usage regressed by 20.0MB"));
    }

    #[test]
    fn test_compare_small_changes_not_significant() {
        let before = Snapshot::new("before", metrics(16.0, 100));
        let after = Snapshot::new("after", metrics(16.2, 102));
        let comparison = compare_snapshots(&before, &after);

        assert_eq!(comparison.summary, NO_SIGNIFICANT_CHANGE);
        assert!(comparison.is_regression);
    }

    #[test]
    fn test_compare_rebuild_delta() {
        let mut rebuilds = BTreeMap::new();
        rebuilds.insert("Row".to_string(), 50);
        let before = Snapshot::new("before", MetricsSnapshot::new());
        let after = Snapshot::new("after", MetricsSnapshot::new().with_rebuilds(rebuilds));

        let comparison = compare_snapshots(&before, &after);
        assert_eq!(comparison.rebuild_delta, 50);
        assert!(comparison.summary.contains("50 more rebuilds"));
    }

    #[test]
    fn test_trend_analysis() {
        let series: Vec<MetricsSnapshot> = [16.0, 16.0, 16.0, 25.0, 25.0, 25.0]
            .iter()
            .map(|avg| metrics(*avg, 100))
            .collect();
        let trend = TrendAnalysis::from_metrics(&series);

        assert_eq!(trend.sample_count, 6);
        assert_eq!(trend.fps, TrendDirection::Declining);
        assert_eq!(trend.frame_time, TrendDirection::Declining);
        assert_eq!(trend.memory, TrendDirection::Stable);
        assert_eq!(trend.overall, TrendDirection::Declining);
    }

    #[test]
    fn test_trend_memory_growth() {
        let series: Vec<MetricsSnapshot> = [100, 100, 200, 200].iter().map(|mb| metrics(16.0, *mb)).collect();
        let trend = TrendAnalysis::from_metrics(&series);
        assert_eq!(trend.memory, TrendDirection::Declining);
        assert_eq!(trend.overall, TrendDirection::Stable);
    }

    #[test]
    fn test_score_perfect() {
        let score = performance_score(&MetricsSnapshot::new());
        assert_eq!(score, 100.0);
    }

    #[test]
    fn test_score_components() {
        // 30fps, 250MB, 33.33ms
        let m = metrics(33.33, 250);
        let score = performance_score(&m);
        let expected = 40.0 * (m.fps() / 60.0) + 15.0 + 0.0 + 10.0;
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_score_ignores_rebuild_counts() {
        let quiet = MetricsSnapshot::new();
        let mut counts = BTreeMap::new();
        counts.insert("Row".to_string(), 2000);
        let busy = MetricsSnapshot::new().with_rebuilds(counts);

        assert_eq!(performance_score(&quiet), 100.0);
        assert_eq!(performance_score(&busy), 100.0);
    }

    #[test]
    fn test_score_warning_budget() {
        let warnings: Vec<Warning> = (0..3)
            .map(|i| Warning::new(WarningKind::FrameDrops, Severity::Medium, format!("{i}")))
            .collect();
        let score = performance_score(&MetricsSnapshot::new().with_warnings(warnings));
        assert_eq!(score, 94.0);
    }

    #[test]
    fn test_score_warning_penalty_capped() {
        let warnings: Vec<Warning> = (0..8)
            .map(|i| Warning::new(WarningKind::FrameDrops, Severity::Medium, format!("{i}")))
            .collect();
        let score = performance_score(&MetricsSnapshot::new().with_warnings(warnings));
        assert_eq!(score, 90.0);
    }

    proptest! {
        #[test]
        fn prop_score_bounded(
            avg in 0.0f64..500.0,
            memory in 0u64..(4 * 1024 * MIB),
            warnings in 0usize..20,
        ) {
            let list = (0..warnings)
                .map(|i| Warning::new(WarningKind::FrameDrops, Severity::Low, format!("{i}")))
                .collect();
            let m = MetricsSnapshot {
                average_frame_time: avg,
                ..MetricsSnapshot::new().with_memory(memory, memory).with_warnings(list)
            };
            let score = performance_score(&m);
            prop_assert!((0.0..=100.0).contains(&score));
        }
    }
}
