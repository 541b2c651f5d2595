//! Real-time alerts raised while a reporter is active.

use chrono::{DateTime, Utc};
use perf::{MetricsSnapshot, Severity, WarningKind, MIB};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// FPS below which a critical alert is raised.
pub const ALERT_MIN_FPS: f64 = 30.0;
/// Memory above which a high alert is raised.
pub const ALERT_MAX_MEMORY: u64 = 500 * MIB;
/// Rebuilds across all entities above which a medium alert is raised.
pub const ALERT_MAX_TOTAL_REBUILDS: u64 = 1000;

/// A notification that one metrics event crossed an alert rule.
///
/// Unlike a [`Warning`](perf::Warning), an alert is not part of any snapshot;
/// it is only delivered to alert channel subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAlert {
    /// Unique identifier
    pub id: Uuid,
    /// What crossed the rule
    pub kind: WarningKind,
    /// Severity fixed by the rule
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// Observed value
    pub value: f64,
    /// Rule limit
    pub threshold: f64,
    /// When the alert was raised
    pub timestamp: DateTime<Utc>,
}

impl PerformanceAlert {
    fn new(kind: WarningKind, severity: Severity, message: String, value: f64, threshold: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            message,
            value,
            threshold,
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Display for PerformanceAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

/// Evaluate the alert rules against one metrics event.
pub fn alerts_for(metrics: &MetricsSnapshot) -> Vec<PerformanceAlert> {
    let mut alerts = Vec::new();

    let fps = metrics.fps();
    if fps < ALERT_MIN_FPS {
        alerts.push(PerformanceAlert::new(
            WarningKind::FrameDrops,
            Severity::Critical,
            format!("Frame rate dropped to {:.1} FPS", fps),
            fps,
            ALERT_MIN_FPS,
        ));
    }

    if metrics.memory_usage > ALERT_MAX_MEMORY {
        alerts.push(PerformanceAlert::new(
            WarningKind::MemoryPressure,
            Severity::High,
            format!("Memory usage reached {:.1}MB", metrics.memory_mb()),
            metrics.memory_usage as f64,
            ALERT_MAX_MEMORY as f64,
        ));
    }

    let rebuilds = metrics.total_rebuilds();
    if rebuilds > ALERT_MAX_TOTAL_REBUILDS {
        alerts.push(PerformanceAlert::new(
            WarningKind::ExcessiveRebuilds,
            Severity::Medium,
            format!("{} rebuilds across all entities", rebuilds),
            rebuilds as f64,
            ALERT_MAX_TOTAL_REBUILDS as f64,
        ));
    }

    alerts
}
