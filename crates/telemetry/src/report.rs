//! Performance reports built from monitor state.
//!
//! A [`PerformanceReport`] turns the current warnings into issues, derives
//! ranked recommendations from the latest metrics, and attaches a trend when
//! enough history is available.

use chrono::{DateTime, Utc};
use perf::{MetricsSnapshot, Severity, WarningKind, WarningLocation, MIB};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::analysis::TrendAnalysis;

/// History entries required before a report carries a trend.
pub const MIN_TREND_HISTORY: usize = 10;

// =============================================================================
// Issues
// =============================================================================

/// User-facing impact of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    /// Not noticeable
    Minimal,
    /// Noticeable under load
    Minor,
    /// Regularly noticeable
    Moderate,
    /// Degrades the experience
    Severe,
}

impl From<Severity> for ImpactLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => ImpactLevel::Minimal,
            Severity::Medium => ImpactLevel::Minor,
            Severity::High => ImpactLevel::Moderate,
            Severity::Critical => ImpactLevel::Severe,
        }
    }
}

impl std::fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImpactLevel::Minimal => "minimal",
            ImpactLevel::Minor => "minor",
            ImpactLevel::Moderate => "moderate",
            ImpactLevel::Severe => "severe",
        };
        f.write_str(s)
    }
}

/// A report entry derived from one active warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceIssue {
    /// Warning kind
    pub kind: WarningKind,
    /// Impact level
    pub impact: ImpactLevel,
    /// Description of the problem
    pub description: String,
    /// Suggested fix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Originating entity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<WarningLocation>,
}

// =============================================================================
// Recommendations
// =============================================================================

/// Ranking of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationPriority {
    /// Nice to have
    Low,
    /// Worth scheduling
    Medium,
    /// Address first
    High,
}

impl std::fmt::Display for RecommendationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecommendationPriority::Low => "low",
            RecommendationPriority::Medium => "medium",
            RecommendationPriority::High => "high",
        };
        f.write_str(s)
    }
}

/// An actionable suggestion derived from the metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Ranking
    pub priority: RecommendationPriority,
    /// Short title
    pub title: String,
    /// What was observed
    pub description: String,
    /// What to do about it
    pub actions: Vec<String>,
}

impl Recommendation {
    fn new(priority: RecommendationPriority, title: &str, description: String, actions: &[&str]) -> Self {
        Self {
            priority,
            title: title.to_string(),
            description,
            actions: actions.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// FPS below which a frame-rate recommendation is made.
pub const RECOMMEND_MIN_FPS: f64 = 55.0;
/// Memory above which a memory recommendation is made.
pub const RECOMMEND_MAX_MEMORY: u64 = 200 * MIB;
/// Memory above which mobile platforms get an extra recommendation.
pub const RECOMMEND_MAX_MOBILE_MEMORY: u64 = 150 * MIB;
/// Per-entity rebuilds above which a rebuild recommendation is made.
pub const RECOMMEND_MAX_ENTITY_REBUILDS: u64 = 50;
/// Mean frame interval above which a frame-time recommendation is made.
pub const RECOMMEND_MAX_FRAME_TIME_MS: f64 = 20.0;

/// Derive recommendations from a snapshot, highest priority first.
pub fn recommendations_for(metrics: &MetricsSnapshot, mobile: bool) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    let fps = metrics.fps();
    if fps < RECOMMEND_MIN_FPS {
        recommendations.push(Recommendation::new(
            RecommendationPriority::High,
            "Improve frame rate",
            format!("Rendering at {:.1} FPS, below the {:.0} FPS target", fps, RECOMMEND_MIN_FPS),
            &[
                "Move expensive work out of the render path",
                "Cache layout results that do not change between frames",
                "Split large lists into lazily built items",
            ],
        ));
    }

    if metrics.memory_usage > RECOMMEND_MAX_MEMORY {
        recommendations.push(Recommendation::new(
            RecommendationPriority::Medium,
            "Reduce memory usage",
            format!("Using {:.1}MB of memory", metrics.memory_mb()),
            &[
                "Release caches for content that is off screen",
                "Downsample large images before display",
                "Check for listeners or timers that are never disposed",
            ],
        ));
    }

    let mut hot: Vec<(&String, &u64)> = metrics
        .widget_rebuilds
        .iter()
        .filter(|(_, count)| **count > RECOMMEND_MAX_ENTITY_REBUILDS)
        .collect();
    if !hot.is_empty() {
        hot.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let listed: Vec<String> = hot
            .iter()
            .take(5)
            .map(|(entity, count)| format!("{} ({})", entity, count))
            .collect();
        recommendations.push(Recommendation::new(
            RecommendationPriority::High,
            "Reduce unnecessary rebuilds",
            format!("Frequently rebuilt: {}", listed.join(", ")),
            &[
                "Mark subtrees that never change as constant",
                "Narrow state subscriptions to the data each entity reads",
                "Give list items stable keys",
            ],
        ));
    }

    if metrics.average_frame_time > RECOMMEND_MAX_FRAME_TIME_MS {
        recommendations.push(Recommendation::new(
            RecommendationPriority::High,
            "Shorten frame work",
            format!("Average frame takes {:.2}ms", metrics.average_frame_time),
            &[
                "Profile the slowest frames for synchronous work",
                "Defer non-visual updates to idle time",
            ],
        ));
    }

    if mobile && metrics.memory_usage > RECOMMEND_MAX_MOBILE_MEMORY {
        recommendations.push(Recommendation::new(
            RecommendationPriority::Medium,
            "Mind mobile memory limits",
            format!(
                "{:.1}MB is high for a mobile device and risks the app being killed in the background",
                metrics.memory_mb()
            ),
            &["Trim caches when the app moves to the background"],
        ));
    }

    // Stable: keeps rule order within a priority.
    recommendations.sort_by(|a, b| b.priority.cmp(&a.priority));
    recommendations
}

// =============================================================================
// Report
// =============================================================================

/// A point-in-time performance report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    /// When the report was generated
    pub generated_at: DateTime<Utc>,
    /// Platform the metrics were collected on
    pub platform: String,
    /// Span of history considered, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range_ms: Option<u64>,
    /// Metrics at generation time
    pub metrics: MetricsSnapshot,
    /// Issues derived from active warnings
    pub issues: Vec<PerformanceIssue>,
    /// Ranked recommendations
    pub recommendations: Vec<Recommendation>,
    /// Trend over the considered history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendAnalysis>,
    /// History entries considered
    pub history_size: usize,
    /// One-line summary
    pub summary: String,
}

impl PerformanceReport {
    /// Assemble a report.
    ///
    /// `history` must already be limited to the requested time range.
    pub fn build(
        metrics: MetricsSnapshot,
        history: &[MetricsSnapshot],
        platform: &str,
        mobile: bool,
        time_range: Option<Duration>,
        include_recommendations: bool,
    ) -> Self {
        let issues: Vec<PerformanceIssue> = metrics
            .warnings
            .iter()
            .map(|warning| PerformanceIssue {
                kind: warning.kind,
                impact: warning.severity.into(),
                description: warning.message.clone(),
                suggestion: warning.suggestion.clone(),
                location: warning.location.clone(),
            })
            .collect();

        let recommendations = if include_recommendations {
            recommendations_for(&metrics, mobile)
        } else {
            Vec::new()
        };

        let trend = (history.len() > MIN_TREND_HISTORY).then(|| TrendAnalysis::from_metrics(history));
        let summary = summarize(&issues);

        Self {
            generated_at: Utc::now(),
            platform: platform.to_string(),
            time_range_ms: time_range.map(|r| r.as_millis() as u64),
            metrics,
            issues,
            recommendations,
            trend,
            history_size: history.len(),
            summary,
        }
    }

    /// Most severe impact among the issues.
    pub fn worst_impact(&self) -> Option<ImpactLevel> {
        self.issues.iter().map(|i| i.impact).max()
    }
}

/// One-line summary chosen by the most severe issue.
pub fn summarize(issues: &[PerformanceIssue]) -> String {
    let count = issues.len();
    match issues.iter().map(|i| i.impact).max() {
        None => "Performance is healthy. No issues detected.".to_string(),
        Some(ImpactLevel::Severe) => format!(
            "Critical performance problems detected: {} issue(s), at least one severe. Immediate attention required.",
            count
        ),
        Some(ImpactLevel::Moderate) => format!(
            "Performance is degraded: {} issue(s) with moderate user-visible impact.",
            count
        ),
        Some(ImpactLevel::Minor) => format!("Minor performance issues detected: {} issue(s).", count),
        Some(ImpactLevel::Minimal) => format!(
            "Performance is good with {} minor observation(s).",
            count
        ),
    }
}
