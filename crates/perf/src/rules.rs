//! Named threshold rules for custom metrics.
//!
//! Hosts report arbitrary named values (`api_response_time`, `cache_hit_ratio`,
//! ...). A [`RuleRegistry`] maps each name to a comparator, a threshold, and
//! severity tiers, so the mapping from metric names to warnings is data that
//! can be replaced at configuration time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::warning::{Severity, Warning, WarningKind, WarningLocation};

/// Entity type used in the location of custom-metric warnings.
pub const CUSTOM_METRIC_ENTITY: &str = "metric";

/// Which side of the threshold is a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    /// Values above the threshold are violations (latencies, error rates)
    Above,
    /// Values below the threshold are violations (hit ratios)
    Below,
}

impl Comparator {
    fn violates(self, value: f64, limit: f64) -> bool {
        match self {
            Comparator::Above => value > limit,
            Comparator::Below => value < limit,
        }
    }
}

/// A threshold rule for one named metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomMetricRule {
    /// Metric name the rule applies to
    pub metric: String,
    /// Violation side
    pub comparator: Comparator,
    /// Violation boundary
    pub threshold: f64,
    /// Values past this are high severity
    pub high: f64,
    /// Values past this are critical
    pub critical: f64,
    /// Warning kind emitted on violation
    pub kind: WarningKind,
    /// Unit shown in messages when the report carries none
    pub unit: Option<String>,
    /// Suggested fix attached to the warning
    pub suggestion: Option<String>,
}

impl CustomMetricRule {
    /// Rule for metrics where higher is worse.
    ///
    /// Severity tiers default to 2x (high) and 3x (critical) the threshold.
    pub fn above(metric: impl Into<String>, threshold: f64) -> Self {
        Self {
            metric: metric.into(),
            comparator: Comparator::Above,
            threshold,
            high: threshold * 2.0,
            critical: threshold * 3.0,
            kind: WarningKind::CustomThreshold,
            unit: None,
            suggestion: None,
        }
    }

    /// Rule for metrics where lower is worse.
    ///
    /// Severity tiers default to 1/2 (high) and 1/3 (critical) of the threshold;
    /// use [`with_tiers`](Self::with_tiers) for ratio-style metrics.
    pub fn below(metric: impl Into<String>, threshold: f64) -> Self {
        Self {
            metric: metric.into(),
            comparator: Comparator::Below,
            threshold,
            high: threshold / 2.0,
            critical: threshold / 3.0,
            kind: WarningKind::CustomThreshold,
            unit: None,
            suggestion: None,
        }
    }

    /// Set the high and critical boundaries.
    pub fn with_tiers(mut self, high: f64, critical: f64) -> Self {
        self.high = high;
        self.critical = critical;
        self
    }

    /// Set the emitted warning kind.
    pub fn with_kind(mut self, kind: WarningKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the display unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the suggestion text.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Check if a value violates the rule.
    pub fn is_violated(&self, value: f64) -> bool {
        self.comparator.violates(value, self.threshold)
    }

    /// Severity of a violating value.
    pub fn severity(&self, value: f64) -> Severity {
        if self.comparator.violates(value, self.critical) {
            Severity::Critical
        } else if self.comparator.violates(value, self.high) {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    /// Evaluate a reported value, producing a warning on violation.
    pub fn evaluate(&self, value: f64, unit: Option<&str>) -> Option<Warning> {
        if !value.is_finite() || !self.is_violated(value) {
            return None;
        }

        let unit = unit.or(self.unit.as_deref()).unwrap_or("");
        let relation = match self.comparator {
            Comparator::Above => "exceeds",
            Comparator::Below => "is below",
        };
        let message = format!(
            "{} = {}{} {} threshold {}{}",
            self.metric,
            format_value(value),
            unit,
            relation,
            format_value(self.threshold),
            unit
        );

        let mut warning = Warning::new(self.kind, self.severity(value), message).with_location(
            WarningLocation::entity(CUSTOM_METRIC_ENTITY).with_segment(self.metric.clone()),
        );
        if let Some(suggestion) = &self.suggestion {
            warning = warning.with_suggestion(suggestion.clone());
        }
        Some(warning)
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.3}", value)
    }
}

/// Registry of custom-metric rules keyed by metric name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleRegistry {
    rules: BTreeMap<String, CustomMetricRule>,
}

impl RuleRegistry {
    /// A registry with no rules.
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Add or replace a rule.
    pub fn insert(&mut self, rule: CustomMetricRule) -> Option<CustomMetricRule> {
        self.rules.insert(rule.metric.clone(), rule)
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_rule(mut self, rule: CustomMetricRule) -> Self {
        self.insert(rule);
        self
    }

    /// Remove a rule.
    pub fn remove(&mut self, metric: &str) -> Option<CustomMetricRule> {
        self.rules.remove(metric)
    }

    /// Look up a rule.
    pub fn get(&self, metric: &str) -> Option<&CustomMetricRule> {
        self.rules.get(metric)
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate over rules in name order.
    pub fn iter(&self) -> impl Iterator<Item = &CustomMetricRule> {
        self.rules.values()
    }

    /// Evaluate a reported value against its rule, if one is registered.
    pub fn evaluate(&self, metric: &str, value: f64, unit: Option<&str>) -> Option<Warning> {
        let warning = self.rules.get(metric)?.evaluate(value, unit)?;
        tracing::trace!(
            target: "perf::rules",
            metric = metric,
            value = value,
            severity = %warning.severity,
            "custom metric rule violated"
        );
        Some(warning)
    }
}

impl Default for RuleRegistry {
    /// The well-known rules every host gets out of the box.
    fn default() -> Self {
        Self::empty()
            .with_rule(
                CustomMetricRule::above("api_response_time", 2000.0)
                    .with_unit("ms")
                    .with_suggestion("Cache responses or move slow calls off the critical path"),
            )
            .with_rule(
                CustomMetricRule::below("cache_hit_ratio", 0.8)
                    .with_tiers(0.6, 0.5)
                    .with_suggestion("Review cache keys and eviction policy"),
            )
            .with_rule(
                CustomMetricRule::above("error_rate", 0.05)
                    .with_suggestion("Inspect recent failures; retries may be masking a fault"),
            )
            .with_rule(
                CustomMetricRule::above("database_query_time", 500.0)
                    .with_unit("ms")
                    .with_suggestion("Add an index or batch the queries"),
            )
            .with_rule(
                CustomMetricRule::above("widget_tree_depth", 100.0)
                    .with_kind(WarningKind::LargeTree)
                    .with_suggestion("Flatten deeply nested layouts"),
            )
            .with_rule(
                CustomMetricRule::above("main_thread_block_time", 50.0)
                    .with_unit("ms")
                    .with_kind(WarningKind::BlockingOperation)
                    .with_suggestion("Move the blocking work to a background task"),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_present() {
        let registry = RuleRegistry::default();
        assert_eq!(registry.len(), 6);
        assert!(registry.get("api_response_time").is_some());
        assert!(registry.get("cache_hit_ratio").is_some());
        assert!(registry.get("error_rate").is_some());
    }

    #[test]
    fn test_api_response_time_tiers() {
        let registry = RuleRegistry::default();

        assert!(registry.evaluate("api_response_time", 1500.0, None).is_none());

        let w = registry.evaluate("api_response_time", 3000.0, None).unwrap();
        assert_eq!(w.severity, Severity::Medium);
        assert_eq!(w.kind, WarningKind::CustomThreshold);
        assert!(w.message.contains("3000ms"));

        let w = registry.evaluate("api_response_time", 5000.0, None).unwrap();
        assert_eq!(w.severity, Severity::High);

        let w = registry.evaluate("api_response_time", 7000.0, None).unwrap();
        assert_eq!(w.severity, Severity::Critical);
    }

    #[test]
    fn test_cache_hit_ratio_inverted() {
        let registry = RuleRegistry::default();

        assert!(registry.evaluate("cache_hit_ratio", 0.9, None).is_none());
        assert_eq!(
            registry.evaluate("cache_hit_ratio", 0.7, None).unwrap().severity,
            Severity::Medium
        );
        assert_eq!(
            registry.evaluate("cache_hit_ratio", 0.55, None).unwrap().severity,
            Severity::High
        );
        let w = registry.evaluate("cache_hit_ratio", 0.4, None).unwrap();
        assert_eq!(w.severity, Severity::Critical);
        assert_eq!(w.kind, WarningKind::CustomThreshold);
        assert!(w.message.contains("is below"));
    }

    #[test]
    fn test_unknown_metric_ignored() {
        let registry = RuleRegistry::default();
        assert!(registry.evaluate("frobnication_level", 1e9, None).is_none());
    }

    #[test]
    fn test_non_finite_ignored() {
        let rule = CustomMetricRule::above("latency", 10.0);
        assert!(rule.evaluate(f64::NAN, None).is_none());
        assert!(rule.evaluate(f64::INFINITY, None).is_none());
    }

    #[test]
    fn test_default_tiers() {
        let above = CustomMetricRule::above("latency", 10.0);
        assert_eq!(above.severity(15.0), Severity::Medium);
        assert_eq!(above.severity(25.0), Severity::High);
        assert_eq!(above.severity(35.0), Severity::Critical);

        let below = CustomMetricRule::below("hit_rate", 0.9);
        assert_eq!(below.severity(0.8), Severity::Medium);
        assert_eq!(below.severity(0.4), Severity::High);
        assert_eq!(below.severity(0.2), Severity::Critical);
    }

    #[test]
    fn test_rule_kind_and_location() {
        let registry = RuleRegistry::default();
        let w = registry.evaluate("widget_tree_depth", 150.0, None).unwrap();
        assert_eq!(w.kind, WarningKind::LargeTree);

        let location = w.location.unwrap();
        assert_eq!(location.entity_type, CUSTOM_METRIC_ENTITY);
        assert_eq!(location.path, vec!["widget_tree_depth".to_string()]);
    }

    #[test]
    fn test_registry_replace_rule() {
        let mut registry = RuleRegistry::default();
        let previous = registry.insert(CustomMetricRule::above("error_rate", 0.5));
        assert!(previous.is_some());
        assert!(registry.evaluate("error_rate", 0.2, None).is_none());
    }

    #[test]
    fn test_registry_json_roundtrip() {
        let registry = RuleRegistry::empty().with_rule(CustomMetricRule::above("fetch_ms", 100.0));
        let json = serde_json::to_string(&registry).unwrap();
        assert!(json.starts_with("{\"fetch_ms\":"));
        let parsed: RuleRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, registry);
    }
}
