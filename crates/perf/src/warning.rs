//! Threshold-violation warnings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity level of a warning or alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth knowing, no visible impact
    Low,
    /// Noticeable under load
    Medium,
    /// Visible to users
    High,
    /// Needs immediate attention
    Critical,
}

impl Severity {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of problem a warning describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// An entity re-renders more often than allowed
    ExcessiveRebuilds,
    /// Memory usage is above its ceiling or growing from rebuild churn
    MemoryPressure,
    /// Frames are missing their budget
    FrameDrops,
    /// An entity rebuilds at a high rate
    InefficientEntity,
    /// The rendered tree is too large
    LargeTree,
    /// Long frames or reported work blocking the render thread
    BlockingOperation,
    /// A registered custom-metric rule was violated
    CustomThreshold,
}

impl WarningKind {
    /// Kebab-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::ExcessiveRebuilds => "excessive-rebuilds",
            WarningKind::MemoryPressure => "memory-pressure",
            WarningKind::FrameDrops => "frame-drops",
            WarningKind::InefficientEntity => "inefficient-entity",
            WarningKind::LargeTree => "large-tree",
            WarningKind::BlockingOperation => "blocking-operation",
            WarningKind::CustomThreshold => "custom-threshold",
        }
    }
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the composition tree a warning originates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningLocation {
    /// Entity type name
    pub entity_type: String,
    /// Path segments leading to the entity (source location, key, ...)
    pub path: Vec<String>,
}

impl WarningLocation {
    /// Location naming only an entity type.
    pub fn entity(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            path: Vec::new(),
        }
    }

    /// Append a path segment.
    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.path.push(segment.into());
        self
    }
}

impl std::fmt::Display for WarningLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.entity_type)
        } else {
            write!(f, "{} ({})", self.entity_type, self.path.join(" > "))
        }
    }
}

/// A currently violated threshold.
///
/// Warnings live inside a single [`MetricsSnapshot`](crate::MetricsSnapshot):
/// the monitor rebuilds the full list on every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    /// Kind of problem
    pub kind: WarningKind,
    /// Human-readable description
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
    /// Originating entity, if any
    pub location: Option<WarningLocation>,
    /// How bad it is
    pub severity: Severity,
    /// When the violation was observed
    pub timestamp: DateTime<Utc>,
}

impl Warning {
    /// Create a warning observed now.
    pub fn new(kind: WarningKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggestion: None,
            location: None,
            severity,
            timestamp: Utc::now(),
        }
    }

    /// Attach a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach a location.
    pub fn with_location(mut self, location: WarningLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Override the observation time.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Identity used to de-duplicate warnings: same kind about the same subject.
    pub fn subject(&self) -> (WarningKind, Option<&WarningLocation>) {
        (self.kind, self.location.as_ref())
    }

    /// Check if this is at least high severity.
    pub fn is_high_or_worse(&self) -> bool {
        self.severity >= Severity::High
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.kind, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " at {}", location)?;
        }
        Ok(())
    }
}

/// Order warnings most severe first, keeping insertion order within a level.
pub fn sort_by_severity(warnings: &mut [Warning]) {
    warnings.sort_by(|a, b| b.severity.cmp(&a.severity));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_warning_kind_serialization() {
        let json = serde_json::to_string(&WarningKind::ExcessiveRebuilds).unwrap();
        assert_eq!(json, "\"excessive-rebuilds\"");
        let kind: WarningKind = serde_json::from_str("\"custom-threshold\"").unwrap();
        assert_eq!(kind, WarningKind::CustomThreshold);
    }

    #[test]
    fn test_warning_display() {
        let warning = Warning::new(WarningKind::ExcessiveRebuilds, Severity::High, "ListItem rebuilt 500 times")
            .with_location(WarningLocation::entity("ListItem").with_segment("lib/list.rs:42"));

        let display = warning.to_string();
        assert!(display.contains("[high]"));
        assert!(display.contains("excessive-rebuilds"));
        assert!(display.contains("ListItem (lib/list.rs:42)"));
    }

    #[test]
    fn test_warning_subject() {
        let a = Warning::new(WarningKind::MemoryPressure, Severity::High, "a")
            .with_location(WarningLocation::entity("Row"));
        let b = Warning::new(WarningKind::MemoryPressure, Severity::Critical, "b")
            .with_location(WarningLocation::entity("Row"));
        let c = Warning::new(WarningKind::MemoryPressure, Severity::Critical, "c");

        assert_eq!(a.subject(), b.subject());
        assert_ne!(a.subject(), c.subject());
    }

    #[test]
    fn test_sort_by_severity() {
        let mut warnings = vec![
            Warning::new(WarningKind::FrameDrops, Severity::Medium, "1"),
            Warning::new(WarningKind::FrameDrops, Severity::Critical, "2"),
            Warning::new(WarningKind::FrameDrops, Severity::Medium, "3"),
        ];
        sort_by_severity(&mut warnings);
        let order: Vec<_> = warnings.iter().map(|w| w.message.as_str()).collect();
        assert_eq!(order, vec!["2", "1", "3"]);
    }
}
