//! Frame statistics and trend classification.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Frame budget for 60fps rendering in milliseconds.
pub const FRAME_BUDGET_MS: f64 = 16.67;

/// FPS reported when no frame intervals have been observed.
pub const DEFAULT_FPS: f64 = 60.0;

/// Relative change between window halves that counts as a trend.
pub const TREND_CHANGE_THRESHOLD: f64 = 0.05;

/// Convert a duration to fractional milliseconds.
///
/// Goes through whole microseconds so that intervals such as 16.67ms map to
/// the same `f64` as the literal `16.67`.
#[inline]
pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}

/// Statistical summary of a frame-interval window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    /// Number of intervals summarized
    pub count: usize,
    /// Arithmetic mean interval in milliseconds
    pub average_ms: f64,
    /// Median interval in milliseconds
    pub median_ms: f64,
    /// 95th percentile interval in milliseconds
    pub p95_ms: f64,
    /// Largest interval in milliseconds
    pub max_ms: f64,
    /// Frames per second derived from the mean
    pub fps: f64,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            count: 0,
            average_ms: 0.0,
            median_ms: 0.0,
            p95_ms: 0.0,
            max_ms: 0.0,
            fps: DEFAULT_FPS,
        }
    }
}

impl FrameStats {
    /// Summarize a set of frame intervals.
    pub fn from_intervals<'a>(intervals: impl IntoIterator<Item = &'a Duration>) -> Self {
        let mut micros: Vec<u128> = intervals.into_iter().map(|d| d.as_micros()).collect();
        if micros.is_empty() {
            return Self::default();
        }
        micros.sort_unstable();

        let count = micros.len();
        let total: u128 = micros.iter().sum();
        let average_ms = (total as f64 / count as f64) / 1000.0;

        let to_ms = |us: u128| us as f64 / 1000.0;
        let median_ms = to_ms(micros[count / 2]);
        let p95_ms = to_ms(micros[percentile_index(count, 0.95)]);
        let max_ms = to_ms(micros[count - 1]);

        Self {
            count,
            average_ms,
            median_ms,
            p95_ms,
            max_ms,
            fps: fps_from_interval(average_ms),
        }
    }

    /// Check if any interval has been observed.
    pub fn has_samples(&self) -> bool {
        self.count > 0
    }
}

/// Index of the `fraction` percentile in a sorted slice of `len` elements.
///
/// Uses `floor(len * fraction)` clamped to the last valid index.
pub fn percentile_index(len: usize, fraction: f64) -> usize {
    if len == 0 {
        return 0;
    }
    let index = (len as f64 * fraction).floor() as usize;
    index.min(len - 1)
}

/// Frames per second for a mean interval, falling back to [`DEFAULT_FPS`].
pub fn fps_from_interval(average_ms: f64) -> f64 {
    if average_ms > 0.0 && average_ms.is_finite() {
        1000.0 / average_ms
    } else {
        DEFAULT_FPS
    }
}

/// Arithmetic mean, or zero for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Direction a metric series is moving in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    /// Moving toward better values
    Improving,
    /// No change beyond the threshold
    Stable,
    /// Moving toward worse values
    Declining,
}

impl TrendDirection {
    /// Majority vote across several directions.
    ///
    /// Two or more votes for a direction win; anything else is stable.
    pub fn majority(directions: &[TrendDirection]) -> Self {
        let improving = directions
            .iter()
            .filter(|d| **d == TrendDirection::Improving)
            .count();
        let declining = directions
            .iter()
            .filter(|d| **d == TrendDirection::Declining)
            .count();

        if improving >= 2 && improving > declining {
            TrendDirection::Improving
        } else if declining >= 2 && declining > improving {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Stable => "stable",
            TrendDirection::Declining => "declining",
        };
        f.write_str(s)
    }
}

/// Classify a series by comparing the mean of its first half to its second half.
///
/// A relative change above [`TREND_CHANGE_THRESHOLD`] is directional. With
/// `higher_is_better` an increase is improving, otherwise it is declining.
/// Series shorter than two values are stable.
pub fn classify_trend(values: &[f64], higher_is_better: bool) -> TrendDirection {
    if values.len() < 2 {
        return TrendDirection::Stable;
    }

    let mid = values.len() / 2;
    let first = mean(&values[..mid]);
    let second = mean(&values[mid..]);

    let change = if first.abs() < f64::EPSILON {
        if second.abs() < f64::EPSILON {
            0.0
        } else {
            second.signum()
        }
    } else {
        (second - first) / first.abs()
    };

    if change.abs() <= TREND_CHANGE_THRESHOLD {
        return TrendDirection::Stable;
    }

    let increased = change > 0.0;
    if increased == higher_is_better {
        TrendDirection::Improving
    } else {
        TrendDirection::Declining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_frame_stats_empty() {
        let stats = FrameStats::from_intervals(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.average_ms, 0.0);
        assert_eq!(stats.fps, DEFAULT_FPS);
        assert!(!stats.has_samples());
    }

    #[test]
    fn test_frame_stats_uniform_60fps() {
        let intervals = vec![Duration::from_micros(16_670); 60];
        let stats = FrameStats::from_intervals(&intervals);

        assert_eq!(stats.count, 60);
        assert_eq!(stats.average_ms, 16.67);
        assert_eq!(stats.p95_ms, 16.67);
        assert!((stats.fps - 60.0).abs() < 0.05);
    }

    #[test]
    fn test_frame_stats_values() {
        let intervals: Vec<Duration> = (1..=10).map(ms).collect();
        let stats = FrameStats::from_intervals(&intervals);

        assert_eq!(stats.count, 10);
        assert_eq!(stats.average_ms, 5.5);
        assert_eq!(stats.median_ms, 6.0);
        // floor(10 * 0.95) = 9 -> last element
        assert_eq!(stats.p95_ms, 10.0);
        assert_eq!(stats.max_ms, 10.0);
    }

    #[test]
    fn test_percentile_index_clamps() {
        assert_eq!(percentile_index(0, 0.95), 0);
        assert_eq!(percentile_index(1, 0.95), 0);
        assert_eq!(percentile_index(20, 0.95), 19);
        assert_eq!(percentile_index(100, 0.95), 95);
        assert_eq!(percentile_index(10, 1.0), 9);
    }

    #[test]
    fn test_duration_ms_exact() {
        assert_eq!(duration_ms(Duration::from_micros(16_670)), 16.67);
        assert_eq!(duration_ms(ms(40)), 40.0);
    }

    #[test]
    fn test_classify_trend() {
        let rising = [50.0, 50.0, 58.0, 60.0];
        assert_eq!(classify_trend(&rising, true), TrendDirection::Improving);
        assert_eq!(classify_trend(&rising, false), TrendDirection::Declining);

        let flat = [100.0, 101.0, 102.0, 101.0];
        assert_eq!(classify_trend(&flat, true), TrendDirection::Stable);

        assert_eq!(classify_trend(&[1.0], true), TrendDirection::Stable);
        assert_eq!(classify_trend(&[0.0, 0.0], true), TrendDirection::Stable);
        assert_eq!(classify_trend(&[0.0, 5.0], false), TrendDirection::Declining);
    }

    #[test]
    fn test_majority() {
        use TrendDirection::*;
        assert_eq!(TrendDirection::majority(&[Improving, Improving, Declining]), Improving);
        assert_eq!(TrendDirection::majority(&[Declining, Stable, Declining]), Declining);
        assert_eq!(TrendDirection::majority(&[Improving, Stable, Declining]), Stable);
        assert_eq!(TrendDirection::majority(&[]), Stable);
    }

    proptest! {
        #[test]
        fn prop_mean_and_fps(intervals in prop::collection::vec(1u64..200_000, 1..60)) {
            let durations: Vec<Duration> = intervals.iter().map(|us| Duration::from_micros(*us)).collect();
            let stats = FrameStats::from_intervals(&durations);

            let expected = intervals.iter().map(|us| *us as f64 / 1000.0).sum::<f64>() / intervals.len() as f64;
            prop_assert!((stats.average_ms - expected).abs() < 1e-6);
            prop_assert!((stats.fps - 1000.0 / stats.average_ms).abs() < 1e-9);
        }

        #[test]
        fn prop_p95_between_median_and_max(intervals in prop::collection::vec(1u64..200_000, 1..60)) {
            let durations: Vec<Duration> = intervals.iter().map(|us| Duration::from_micros(*us)).collect();
            let stats = FrameStats::from_intervals(&durations);

            prop_assert!(stats.p95_ms >= stats.median_ms);
            prop_assert!(stats.p95_ms <= stats.max_ms);
        }
    }
}
