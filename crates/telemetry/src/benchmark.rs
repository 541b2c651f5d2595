//! Timed benchmarks scored against FPS and memory targets.

use perf::{MetricsSnapshot, MIB};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A named measurement window with optional pass criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Benchmark {
    /// Unique name within a reporter
    pub name: String,
    /// What the benchmark exercises
    pub description: String,
    /// How long to measure
    #[serde(with = "crate::duration_serde")]
    pub duration: Duration,
    /// FPS the run must reach to pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_fps: Option<f64>,
    /// Memory in bytes the run must stay at or under to pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_memory_usage: Option<u64>,
}

impl Benchmark {
    /// Create a benchmark with no pass criteria.
    pub fn new(name: impl Into<String>, description: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            duration,
            expected_fps: None,
            max_memory_usage: None,
        }
    }

    /// Require at least `fps` at the end of the run.
    pub fn with_expected_fps(mut self, fps: f64) -> Self {
        self.expected_fps = Some(fps);
        self
    }

    /// Require memory at or under `bytes` at the end of the run.
    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory_usage = Some(bytes);
        self
    }

    /// Whether `after` meets every configured criterion.
    pub fn passes(&self, after: &MetricsSnapshot) -> bool {
        let fps_ok = self.expected_fps.map_or(true, |expected| after.fps() >= expected);
        let memory_ok = self
            .max_memory_usage
            .map_or(true, |max| after.memory_usage <= max);
        fps_ok && memory_ok
    }

    /// Score `after` against the criteria, 0 to 100.
    ///
    /// The product of the FPS ratio `actual / expected` and the memory ratio
    /// `ceiling / actual`, each clamped to `[0, 1]`. A missing criterion
    /// contributes a ratio of 1.
    pub fn score(&self, after: &MetricsSnapshot) -> f64 {
        let fps_ratio = match self.expected_fps {
            Some(expected) if expected > 0.0 => ratio(after.fps() / expected),
            _ => 1.0,
        };
        let memory_ratio = match self.max_memory_usage {
            Some(_) if after.memory_usage == 0 => 1.0,
            Some(max) => ratio(max as f64 / after.memory_usage as f64),
            None => 1.0,
        };
        100.0 * fps_ratio * memory_ratio
    }
}

fn ratio(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Outcome of one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResult {
    /// The benchmark that ran
    pub benchmark: Benchmark,
    /// Metrics when the run started
    pub before: MetricsSnapshot,
    /// Metrics when the run ended
    pub after: MetricsSnapshot,
    /// Measured run time
    #[serde(with = "crate::duration_serde")]
    pub elapsed: Duration,
    /// Every criterion was met
    pub passed: bool,
    /// 0-100 score
    pub score: f64,
}

impl BenchmarkResult {
    /// Evaluate a finished run.
    pub fn evaluate(
        benchmark: Benchmark,
        before: MetricsSnapshot,
        after: MetricsSnapshot,
        elapsed: Duration,
    ) -> Self {
        let passed = benchmark.passes(&after);
        let score = benchmark.score(&after);
        Self {
            benchmark,
            before,
            after,
            elapsed,
            passed,
            score,
        }
    }

    /// Change in FPS over the run.
    pub fn fps_delta(&self) -> f64 {
        self.after.fps() - self.before.fps()
    }

    /// Change in memory over the run, in mebibytes.
    pub fn memory_delta_mb(&self) -> f64 {
        (self.after.memory_usage as f64 - self.before.memory_usage as f64) / MIB as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(avg_frame: f64, memory: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            average_frame_time: avg_frame,
            ..MetricsSnapshot::new().with_memory(memory, memory)
        }
    }

    #[test]
    fn test_no_criteria_always_passes() {
        let bench = Benchmark::new("idle", "nothing", Duration::from_secs(1));
        let after = at(100.0, 900 * MIB);
        assert!(bench.passes(&after));
        assert_eq!(bench.score(&after), 100.0);
    }

    #[test]
    fn test_fps_floor() {
        let bench = Benchmark::new("scroll", "list scroll", Duration::from_secs(1)).with_expected_fps(60.0);

        // 25 ms frames run at 40 fps
        let slow = at(25.0, 0);
        assert!(!bench.passes(&slow));
        assert!((bench.score(&slow) - 100.0 * 40.0 / 60.0).abs() < 1e-9);

        let fast = at(10.0, 0);
        assert!(bench.passes(&fast));
        assert_eq!(bench.score(&fast), 100.0);
    }

    #[test]
    fn test_memory_ceiling() {
        let bench = Benchmark::new("load", "open file", Duration::from_secs(1)).with_max_memory(100 * MIB);

        let heavy = at(16.0, 200 * MIB);
        assert!(!bench.passes(&heavy));
        assert!((bench.score(&heavy) - 50.0).abs() < 1e-9);

        let exact = at(16.0, 100 * MIB);
        assert!(bench.passes(&exact));

        let empty = at(16.0, 0);
        assert_eq!(bench.score(&empty), 100.0);
    }

    #[test]
    fn test_result_evaluates_after_snapshot() {
        let bench = Benchmark::new("anim", "animation", Duration::from_millis(500))
            .with_expected_fps(30.0)
            .with_max_memory(256 * MIB);
        let result = BenchmarkResult::evaluate(
            bench,
            at(50.0, 300 * MIB),
            at(20.0, 200 * MIB),
            Duration::from_millis(500),
        );

        assert!(result.passed);
        assert_eq!(result.score, 100.0);
        assert!((result.fps_delta() - 30.0).abs() < 1e-9);
        assert!((result.memory_delta_mb() + 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_benchmark_json_shape() {
        let bench = Benchmark::new("scroll", "list scroll", Duration::from_millis(1500)).with_expected_fps(60.0);
        let json = serde_json::to_value(&bench).unwrap();
        assert_eq!(json["duration"], 1500);
        assert_eq!(json["expectedFps"], 60.0);
        assert!(json.get("maxMemoryUsage").is_none());
    }

    proptest! {
        #[test]
        fn test_score_bounded(
            expected in 0.001f64..1000.0,
            max_memory in 1u64..u64::MAX / 2,
            avg_frame in 0.0f64..1000.0,
            memory in 0u64..u64::MAX / 2,
        ) {
            let bench = Benchmark::new("b", "", Duration::ZERO)
                .with_expected_fps(expected)
                .with_max_memory(max_memory);
            let score = bench.score(&at(avg_frame, memory));
            prop_assert!((0.0..=100.0).contains(&score));
        }
    }
}
