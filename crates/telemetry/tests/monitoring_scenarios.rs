//! End-to-end scenarios for the telemetry engine
//!
//! Each test wires a tracker, monitor, and reporter the way a host would and
//! drives them with explicit frame timestamps, rebuild reports, and custom
//! metrics. Timer-driven behavior runs on a paused Tokio clock; rebuild rates
//! run on a manual clock.

use perf::{ManualClock, Severity, WarningKind};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{
    compare_snapshots, Benchmark, PerformanceMonitor, PerformanceReporter, PerformanceToolkit, RebuildTracker,
    ReporterConfig, ToolkitConfig,
};

fn monitor() -> PerformanceMonitor {
    PerformanceMonitor::new(Arc::new(RebuildTracker::new()))
}

/// Feed `count` intervals of `interval` starting at zero.
fn feed(monitor: &PerformanceMonitor, count: u32, interval: Duration) {
    for i in 0..=count {
        monitor.on_frame_boundary(interval * i).unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn steady_sixty_fps_is_healthy() {
    let monitor = monitor();
    monitor.start_monitoring().unwrap();
    feed(&monitor, 60, Duration::from_micros(16_670));

    let snapshot = monitor.sample().await.unwrap();

    assert!((snapshot.fps() - 60.0).abs() < 0.05);
    assert_eq!(snapshot.average_frame_time, 16.67);
    assert_eq!(snapshot.frame_drops, 0);
    assert!(snapshot.warnings.is_empty());
    assert!(snapshot.is_healthy());
}

#[tokio::test(start_paused = true)]
async fn slow_frames_raise_critical_frame_drops() {
    let monitor = monitor();
    monitor.start_monitoring().unwrap();
    feed(&monitor, 60, Duration::from_millis(40));

    let snapshot = monitor.sample().await.unwrap();

    assert_eq!(snapshot.frame_drops, 60);
    assert_eq!(snapshot.fps(), 25.0);
    let warning = snapshot
        .warnings
        .iter()
        .find(|w| w.kind == WarningKind::FrameDrops)
        .expect("frame drop warning");
    assert_eq!(warning.severity, Severity::Critical);

    // The drop counter starts over each tick.
    let next = monitor.sample().await.unwrap();
    assert_eq!(next.frame_drops, 0);
}

#[tokio::test(start_paused = true)]
async fn rebuild_storm_raises_memory_pressure() {
    let monitor = monitor();
    monitor.start_monitoring().unwrap();

    for _ in 0..1001 {
        monitor.track_rebuild("ListItem", None, None, None).unwrap();
    }

    let info = monitor.tracker().get_rebuild_info("ListItem").unwrap();
    assert_eq!(info.total_rebuilds, 1001);
    assert!(info.is_excessive());

    let snapshot = monitor.sample().await.unwrap();
    let pressure = snapshot
        .warnings
        .iter()
        .find(|w| w.kind == WarningKind::MemoryPressure)
        .expect("memory pressure warning");
    assert!(pressure.message.contains("ListItem"));
    assert_eq!(pressure.location.as_ref().unwrap().entity_type, "ListItem");
    assert!(snapshot
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::ExcessiveRebuilds));
    assert_eq!(snapshot.widget_rebuilds["ListItem"], 1001);
}

#[test]
fn low_cache_hit_ratio_is_critical() {
    let monitor = monitor();
    let warning = monitor
        .report_custom_metric("cache_hit_ratio", 0.4, None)
        .unwrap()
        .expect("custom threshold warning");

    assert_eq!(warning.kind, WarningKind::CustomThreshold);
    assert_eq!(warning.severity, Severity::Critical);
    assert_eq!(monitor.current_metrics().unwrap().custom_metrics["cache_hit_ratio"], 0.4);
}

#[test]
fn rebuild_rate_window_uses_injected_clock() {
    let clock = Arc::new(ManualClock::new());
    let toolkit = PerformanceToolkit::default().with_clock(clock.clone());
    toolkit.initialize(None, false, false).unwrap();
    let tracker = toolkit.tracker().unwrap();
    tracker.start_tracking().unwrap();

    for _ in 0..30 {
        tracker.record_rebuild("Row", None, None, None).unwrap();
        clock.advance(Duration::from_millis(100));
    }
    let info = tracker.get_rebuild_info("Row").unwrap();
    assert_eq!(info.total_rebuilds, 30);
    assert!((info.recent_rebuild_rate - 10.0).abs() < 1e-9);

    clock.advance(Duration::from_secs(61));
    let info = tracker.get_rebuild_info("Row").unwrap();
    assert_eq!(info.total_rebuilds, 30);
    assert_eq!(info.recent_rebuild_rate, 0.0);
    toolkit.dispose();
}

#[test]
fn comparing_a_snapshot_with_itself_finds_nothing() {
    let monitor = monitor();
    monitor.report_custom_metric("error_rate", 0.01, None).unwrap();
    let reporter = PerformanceReporter::new(monitor);
    let snapshot = reporter.take_snapshot(Some("same")).unwrap();

    let comparison = compare_snapshots(&snapshot, &snapshot);

    assert_eq!(comparison.fps_delta, 0.0);
    assert_eq!(comparison.memory_delta, 0);
    assert_eq!(comparison.frame_time_delta, 0.0);
    assert_eq!(comparison.rebuild_delta, 0);
    assert_eq!(comparison.summary, "No significant change");
    assert!(!comparison.is_improvement);
    assert!(!comparison.is_regression);
}

#[tokio::test(start_paused = true)]
async fn benchmark_sees_frames_rendered_during_the_run() {
    let monitor = monitor();
    monitor.start_monitoring().unwrap();
    feed(&monitor, 10, Duration::from_millis(40));
    let reporter = PerformanceReporter::new(monitor.clone());

    let bench = Benchmark::new("scroll", "fling the list", Duration::from_secs(3)).with_expected_fps(50.0);
    let run = {
        let reporter = reporter.clone();
        let bench = bench.clone();
        tokio::spawn(async move { reporter.run_benchmark(&bench).await })
    };

    // Render faster frames while the benchmark waits.
    tokio::time::sleep(Duration::from_secs(1)).await;
    for i in 0..=60u32 {
        monitor
            .on_frame_boundary(Duration::from_secs(10) + Duration::from_millis(10) * i)
            .unwrap();
    }

    let result = run.await.unwrap().unwrap();
    assert_eq!(result.elapsed, Duration::from_secs(3));
    assert_eq!(result.before.fps(), 25.0);
    assert_eq!(result.after.fps(), 100.0);
    assert!(result.passed);
    assert_eq!(result.score, 100.0);
    assert!(result.fps_delta() > 0.0);
}

#[tokio::test(start_paused = true)]
async fn toolkit_end_to_end_report() {
    let config = ToolkitConfig::default()
        .with_reporter(ReporterConfig::default().with_snapshot_interval(Duration::from_secs(1)));
    let toolkit = PerformanceToolkit::new(config);
    toolkit.initialize(None, true, true).unwrap();
    let monitor = toolkit.monitor().unwrap();

    feed(&monitor, 30, Duration::from_millis(20));
    monitor.report_custom_metric("api_response_time", 2500.0, Some("ms")).unwrap();
    tokio::time::sleep(Duration::from_millis(12_500)).await;

    let report = toolkit.generate_report(None, true).await.unwrap();
    assert_eq!(report.statistics.sample_count, 12);
    assert_eq!(report.comparisons.len(), 5);
    assert!(report.trend_analysis.is_some());
    assert!(report.base.trend.is_some());
    assert!((0.0..=100.0).contains(&report.performance_score));

    let markdown = report.to_markdown();
    assert!(markdown.contains("## Metrics"));
    assert!(markdown.contains("## Statistics"));

    toolkit.dispose();
    assert!(monitor.is_disposed());
}

proptest! {
    #[test]
    fn snapshot_list_keeps_the_newest(capacity in 1usize..20, taken in 0usize..60) {
        let config = ReporterConfig::default().with_snapshot_capacity(capacity);
        let reporter = PerformanceReporter::with_config(monitor(), config);
        for i in 0..taken {
            reporter.take_snapshot(Some(&format!("s{}", i))).unwrap();
        }

        let labels: Vec<String> = reporter.snapshots().unwrap().into_iter().map(|s| s.label).collect();
        let expected: Vec<String> = (taken.saturating_sub(capacity)..taken).map(|i| format!("s{}", i)).collect();
        prop_assert_eq!(labels, expected);
    }
}
