//! Reporter-level reports: statistics over snapshots and the enhanced report.

use perf::{MetricsSnapshot, MIB};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analysis::{Comparison, TrendAnalysis};
use crate::report::PerformanceReport;

/// Aggregates over the reporter's snapshots.
///
/// All fields are zero when no snapshot qualified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStatistics {
    /// Snapshots aggregated
    pub sample_count: usize,
    pub min_fps: f64,
    pub max_fps: f64,
    pub average_fps: f64,
    /// Mean memory in bytes
    pub average_memory: f64,
    /// Highest peak memory in bytes
    pub peak_memory: u64,
    /// Mean frame interval in milliseconds
    pub average_frame_time: f64,
}

impl PerformanceStatistics {
    /// Aggregate a series of metrics.
    pub fn from_metrics<'a>(series: impl IntoIterator<Item = &'a MetricsSnapshot>) -> Self {
        let mut stats = Self::default();
        let mut fps_sum = 0.0;
        let mut memory_sum = 0.0;
        let mut frame_sum = 0.0;

        for metrics in series {
            let fps = metrics.fps();
            if stats.sample_count == 0 {
                stats.min_fps = fps;
                stats.max_fps = fps;
            } else {
                stats.min_fps = stats.min_fps.min(fps);
                stats.max_fps = stats.max_fps.max(fps);
            }
            stats.peak_memory = stats
                .peak_memory
                .max(metrics.peak_memory_usage.max(metrics.memory_usage));
            fps_sum += fps;
            memory_sum += metrics.memory_usage as f64;
            frame_sum += metrics.average_frame_time;
            stats.sample_count += 1;
        }

        if stats.sample_count > 0 {
            let n = stats.sample_count as f64;
            stats.average_fps = fps_sum / n;
            stats.average_memory = memory_sum / n;
            stats.average_frame_time = frame_sum / n;
        }
        stats
    }

    /// Check if no snapshot was aggregated.
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

/// A monitor report extended with snapshot analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedReport {
    /// The monitor's report
    pub base: PerformanceReport,
    /// Consecutive comparisons between the most recent snapshots
    pub comparisons: Vec<Comparison>,
    /// Trend over the most recent snapshots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend_analysis: Option<TrendAnalysis>,
    /// 0-100 health score of the current metrics
    pub performance_score: f64,
    /// Aggregates over the snapshots in range
    pub statistics: PerformanceStatistics,
}

impl EnhancedReport {
    /// Render as a Markdown document.
    pub fn to_markdown(&self) -> String {
        self.to_string()
    }
}

fn mb(bytes: f64) -> f64 {
    bytes / MIB as f64
}

impl fmt::Display for EnhancedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = &self.base;
        let metrics = &base.metrics;

        writeln!(f, "# Performance Report")?;
        writeln!(f)?;
        writeln!(f, "- Generated: {}", base.generated_at.to_rfc3339())?;
        writeln!(f, "- Platform: {}", base.platform)?;
        writeln!(f, "- Score: {:.0}/100", self.performance_score)?;
        writeln!(f)?;
        writeln!(f, "{}", base.summary)?;
        writeln!(f)?;

        writeln!(f, "## Metrics")?;
        writeln!(f)?;
        writeln!(f, "| Metric | Value |")?;
        writeln!(f, "|---|---|")?;
        writeln!(f, "| FPS | {:.1} |", metrics.fps())?;
        writeln!(f, "| Average frame time | {:.2}ms |", metrics.average_frame_time)?;
        writeln!(f, "| P95 frame time | {:.2}ms |", metrics.p95_frame_time)?;
        writeln!(f, "| Frame drops | {} |", metrics.frame_drops)?;
        writeln!(
            f,
            "| Memory | {:.1}MB (peak {:.1}MB) |",
            metrics.memory_mb(),
            mb(metrics.peak_memory_usage as f64)
        )?;
        writeln!(f, "| Rebuilds | {} |", metrics.total_rebuilds())?;
        for (name, value) in &metrics.custom_metrics {
            writeln!(f, "| {} | {} |", name, value)?;
        }
        writeln!(f)?;

        if !base.issues.is_empty() {
            writeln!(f, "## Issues")?;
            writeln!(f)?;
            for issue in &base.issues {
                write!(f, "- **{}** {}: {}", issue.impact, issue.kind, issue.description)?;
                if let Some(location) = &issue.location {
                    write!(f, " (at {})", location)?;
                }
                writeln!(f)?;
                if let Some(suggestion) = &issue.suggestion {
                    writeln!(f, "  - {}", suggestion)?;
                }
            }
            writeln!(f)?;
        }

        if !base.recommendations.is_empty() {
            writeln!(f, "## Recommendations")?;
            writeln!(f)?;
            for rec in &base.recommendations {
                writeln!(f, "### {} [{}]", rec.title, rec.priority)?;
                writeln!(f)?;
                writeln!(f, "{}", rec.description)?;
                writeln!(f)?;
                for action in &rec.actions {
                    writeln!(f, "- {}", action)?;
                }
                writeln!(f)?;
            }
        }

        if let Some(trend) = &self.trend_analysis {
            writeln!(f, "## Trend")?;
            writeln!(f)?;
            writeln!(f, "Over the last {} snapshots:", trend.sample_count)?;
            writeln!(f)?;
            writeln!(f, "- FPS: {} (avg {:.1})", trend.fps, trend.average_fps)?;
            writeln!(f, "- Memory: {} (avg {:.1}MB)", trend.memory, mb(trend.average_memory))?;
            writeln!(
                f,
                "- Frame time: {} (avg {:.2}ms)",
                trend.frame_time, trend.average_frame_time
            )?;
            writeln!(f, "- Overall: {}", trend.overall)?;
            writeln!(f)?;
        }

        if !self.comparisons.is_empty() {
            writeln!(f, "## Comparisons")?;
            writeln!(f)?;
            for comparison in &self.comparisons {
                let marker = if comparison.is_improvement {
                    " (improvement)"
                } else if comparison.is_regression {
                    " (regression)"
                } else {
                    ""
                };
                writeln!(
                    f,
                    "- {} -> {}: {}{}",
                    comparison.before_label, comparison.after_label, comparison.summary, marker
                )?;
            }
            writeln!(f)?;
        }

        let stats = &self.statistics;
        if !stats.is_empty() {
            writeln!(f, "## Statistics")?;
            writeln!(f)?;
            writeln!(f, "- Snapshots: {}", stats.sample_count)?;
            writeln!(
                f,
                "- FPS: min {:.1}, max {:.1}, avg {:.1}",
                stats.min_fps, stats.max_fps, stats.average_fps
            )?;
            writeln!(
                f,
                "- Memory: avg {:.1}MB, peak {:.1}MB",
                mb(stats.average_memory),
                mb(stats.peak_memory as f64)
            )?;
            writeln!(f, "- Average frame time: {:.2}ms", stats.average_frame_time)?;
        }

        Ok(())
    }
}
