//! Live performance monitoring.
//!
//! The [`PerformanceMonitor`] receives frame boundaries from the host's frame
//! clock, keeps a window of frame intervals, merges in rebuild activity and
//! custom metric reports, and once per sample interval assembles a
//! [`MetricsSnapshot`]. Each snapshot is appended to a bounded history and
//! broadcast on the metrics channel.
//!
//! Warnings are recomputed from scratch on every tick. Custom metric reports
//! and rebuild records may add warnings between ticks; those are replaced at
//! the next tick.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use telemetry::{PerformanceMonitor, RebuildTracker};
//!
//! # async fn run() -> telemetry::TelemetryResult<()> {
//! let monitor = PerformanceMonitor::new(Arc::new(RebuildTracker::new()));
//! monitor.start_monitoring()?;
//!
//! monitor.on_frame_boundary(Duration::from_millis(0))?;
//! monitor.on_frame_boundary(Duration::from_millis(16))?;
//! monitor.report_custom_metric("api_response_time", 2500.0, Some("ms"))?;
//!
//! let report = monitor.generate_report(None, true).await?;
//! println!("{}", report.summary);
//! # Ok(())
//! # }
//! ```

use perf::{
    duration_ms, sort_by_severity, BoundedWindow, FrameStats, MetricsSnapshot, RuleRegistry, Severity,
    Thresholds, Warning, WarningKind, WarningLocation,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::analysis::window_start;
use crate::config::MonitorConfig;
use crate::error::{TelemetryError, TelemetryResult};
use crate::frame::FrameTicker;
use crate::memory::MemoryProvider;
use crate::rebuild::{RebuildEvent, RebuildInfo, RebuildTracker};
use crate::report::PerformanceReport;

/// Per-entity rebuild total above which memory pressure is reported.
pub const ENTITY_MEMORY_PRESSURE_REBUILDS: u64 = 1000;
/// Per-entity rebuild rate above which the entity is reported as inefficient.
pub const INEFFICIENT_REBUILD_RATE: f64 = 10.0;
/// p95 frame interval, as a multiple of the frame-time limit, that counts as blocking.
pub const BLOCKING_FRAME_MULTIPLIER: f64 = 3.0;
/// Shortest span the frame-drop rate is measured over.
pub const MIN_DROP_RATE_WINDOW: Duration = Duration::from_millis(100);

const METRICS_CHANNEL_CAPACITY: usize = 64;
const COMPONENT: &str = "PerformanceMonitor";

// =============================================================================
// State
// =============================================================================

#[derive(Debug)]
struct MonitorState {
    thresholds: Thresholds,
    rules: RuleRegistry,
    monitoring: bool,
    disposed: bool,
    /// Set when this monitor opened the tracker's write gate.
    owns_tracking: bool,

    last_frame: Option<Duration>,
    frame_intervals: BoundedWindow<Duration>,
    frame_drops: u32,
    /// Start of the span the current drop count covers.
    drops_since: Instant,

    memory_usage: u64,
    peak_memory_usage: u64,
    memory_known: bool,
    /// Set once the peak holds a provider reading rather than an estimate.
    peak_measured: bool,
    memory_in_flight: bool,
    memory_failures: u32,
    /// Bumped whenever in-flight memory readings must be discarded.
    generation: u64,

    warnings: Vec<Warning>,
    custom_metrics: BTreeMap<String, f64>,
    custom_units: HashMap<String, String>,
    history: BoundedWindow<MetricsSnapshot>,

    metrics_tx: Option<broadcast::Sender<MetricsSnapshot>>,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorState {
    /// Store a provider reading. The first one replaces any estimated peak.
    fn record_measured_memory(&mut self, bytes: u64) {
        self.memory_usage = bytes;
        if self.peak_measured {
            self.peak_memory_usage = self.peak_memory_usage.max(bytes);
        } else {
            self.peak_memory_usage = bytes;
            self.peak_measured = true;
        }
    }

    /// Store an estimate. Estimates never raise a measured peak.
    fn record_estimated_memory(&mut self, bytes: u64) {
        self.memory_usage = bytes;
        if !self.peak_measured {
            self.peak_memory_usage = self.peak_memory_usage.max(bytes);
        }
    }

    fn reset_memory(&mut self) {
        self.memory_usage = 0;
        self.peak_memory_usage = 0;
        self.memory_known = false;
        self.peak_measured = false;
        self.memory_in_flight = false;
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Replace any warning about the same subject, newest first.
fn push_warning(warnings: &mut Vec<Warning>, warning: Warning) {
    warnings.retain(|w| w.subject() != warning.subject());
    warnings.insert(0, warning);
}

#[derive(Debug)]
struct MonitorInner {
    config: MonitorConfig,
    tracker: Arc<RebuildTracker>,
    memory: Option<Arc<dyn MemoryProvider>>,
    frames: Option<FrameTicker>,
    state: Mutex<MonitorState>,
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_tasks();
    }
}

impl MonitorInner {
    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live(&self) -> TelemetryResult<MutexGuard<'_, MonitorState>> {
        let state = self.lock();
        if state.disposed {
            return Err(TelemetryError::Disposed(COMPONENT));
        }
        Ok(state)
    }

    fn on_frame(&self, timestamp: Duration) -> TelemetryResult<()> {
        let mut state = self.live()?;
        if !state.monitoring {
            return Ok(());
        }

        if let Some(previous) = state.last_frame.replace(timestamp) {
            let delta = timestamp.saturating_sub(previous);
            state.frame_intervals.push(delta);

            let delta_ms = duration_ms(delta);
            if delta_ms > self.config.frame_budget_ms {
                state.frame_drops += 1;
                tracing::trace!(
                    target: "telemetry::monitor",
                    interval_ms = delta_ms,
                    drops = state.frame_drops,
                    "frame over budget"
                );
            }
        }
        Ok(())
    }

    /// Memory used for a snapshot: the last provider reading, or an estimate.
    fn effective_memory(&self, state: &mut MonitorState, rebuild_activity: u64) -> u64 {
        if !state.memory_known {
            let estimate = self.config.estimator.estimate(rebuild_activity);
            state.record_estimated_memory(estimate);
        }
        state.memory_usage
    }

    fn apply_memory(&self, generation: u64, reading: TelemetryResult<u64>, background: bool) {
        let mut state = self.lock();
        if state.disposed || state.generation != generation {
            tracing::trace!(target: "telemetry::monitor", "discarding stale memory reading");
            return;
        }
        if background {
            state.memory_in_flight = false;
        }

        match reading {
            Ok(bytes) => {
                state.memory_known = true;
                state.memory_failures = 0;
                state.record_measured_memory(bytes);
            }
            Err(err) => {
                state.memory_known = false;
                state.memory_failures += 1;
                if state.memory_failures == 1 {
                    tracing::warn!(
                        target: "telemetry::monitor",
                        error = %err,
                        "memory provider failed, falling back to estimate"
                    );
                } else {
                    tracing::trace!(target: "telemetry::monitor", error = %err, "memory provider failed");
                }
            }
        }
    }

    /// Start a provider query without waiting for it.
    ///
    /// At most one query is in flight; its result lands whenever it resolves.
    fn request_memory_refresh(self: &Arc<Self>) {
        let Some(provider) = self.memory.clone() else {
            return;
        };
        let generation = {
            let mut state = self.lock();
            if state.disposed || state.memory_in_flight {
                return;
            }
            state.memory_in_flight = true;
            state.generation
        };

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let reading = provider.resident_bytes().await;
            if let Some(inner) = weak.upgrade() {
                inner.apply_memory(generation, reading, true);
            }
        });
    }

    /// Query the provider and wait for the reading.
    async fn refresh_memory_now(&self) -> TelemetryResult<()> {
        let Some(provider) = self.memory.clone() else {
            drop(self.live()?);
            return Ok(());
        };
        let generation = self.live()?.generation;
        let reading = provider.resident_bytes().await;
        self.apply_memory(generation, reading, false);
        Ok(())
    }

    fn tick(self: &Arc<Self>) {
        self.request_memory_refresh();
        if let Err(err) = self.complete_tick() {
            tracing::debug!(target: "telemetry::monitor", error = %err, "tick skipped");
        }
    }

    fn complete_tick(&self) -> TelemetryResult<MetricsSnapshot> {
        let infos = self.tracker.all_rebuilds();
        let activity = infos.iter().map(|info| info.total_rebuilds).sum();
        let counts: BTreeMap<String, u64> = infos
            .iter()
            .map(|info| (info.tracking_key().to_string(), info.total_rebuilds))
            .collect();

        let mut state = self.live()?;
        let stats = FrameStats::from_intervals(&state.frame_intervals);
        let memory = self.effective_memory(&mut state, activity);
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.drops_since);

        let mut warnings = self.evaluate_warnings(&state, &stats, memory, elapsed, &infos);
        sort_by_severity(&mut warnings);
        state.warnings = warnings.clone();

        let snapshot = MetricsSnapshot::new()
            .with_frame_stats(&stats)
            .with_frame_drops(state.frame_drops)
            .with_memory(memory, state.peak_memory_usage)
            .with_rebuilds(counts)
            .with_warnings(warnings)
            .with_custom_metrics(state.custom_metrics.clone());

        state.history.push(snapshot.clone());
        state.frame_drops = 0;
        state.drops_since = now;
        if let Some(tx) = &state.metrics_tx {
            // No subscribers is fine.
            let _ = tx.send(snapshot.clone());
        }

        tracing::debug!(
            target: "telemetry::monitor",
            fps = snapshot.fps(),
            avg_frame_ms = snapshot.average_frame_time,
            drops = snapshot.frame_drops,
            memory_mb = snapshot.memory_mb(),
            warnings = snapshot.warnings.len(),
            "tick"
        );
        Ok(snapshot)
    }

    fn evaluate_warnings(
        &self,
        state: &MonitorState,
        stats: &FrameStats,
        memory: u64,
        elapsed: Duration,
        infos: &[RebuildInfo],
    ) -> Vec<Warning> {
        let thresholds = &state.thresholds;
        let mut warnings = Vec::new();

        // Frame cadence
        let window = elapsed.max(MIN_DROP_RATE_WINDOW).as_secs_f64();
        let drops_per_second = state.frame_drops as f64 / window;
        let too_many_drops = drops_per_second > thresholds.max_frame_drops_per_second as f64;
        let low_fps = stats.has_samples() && !thresholds.check_fps(stats.fps);
        let slow_frames = stats.has_samples() && !thresholds.check_frame_time(stats.average_ms);

        if too_many_drops || low_fps || slow_frames {
            let severity = if stats.fps < 30.0 {
                Severity::Critical
            } else if stats.fps < 45.0 {
                Severity::High
            } else {
                Severity::Medium
            };
            warnings.push(
                Warning::new(
                    WarningKind::FrameDrops,
                    severity,
                    format!(
                        "{} dropped frames ({:.1}/s) at {:.1} FPS, average frame {:.2}ms",
                        state.frame_drops, drops_per_second, stats.fps, stats.average_ms
                    ),
                )
                .with_suggestion("Profile frames that exceed the budget and move heavy work off the render path"),
            );
        }

        if stats.has_samples() && stats.p95_ms > BLOCKING_FRAME_MULTIPLIER * thresholds.max_frame_time {
            let ratio = stats.p95_ms / thresholds.max_frame_time;
            let severity = if ratio > 2.0 * BLOCKING_FRAME_MULTIPLIER {
                Severity::Critical
            } else {
                Severity::High
            };
            warnings.push(
                Warning::new(
                    WarningKind::BlockingOperation,
                    severity,
                    format!("95th percentile frame takes {:.2}ms", stats.p95_ms),
                )
                .with_suggestion("Look for synchronous I/O or long computations on the render thread"),
            );
        }

        // Memory
        if !thresholds.check_memory(memory) {
            let ratio = memory as f64 / thresholds.max_memory_usage.max(1) as f64;
            let severity = if ratio > 1.5 {
                Severity::Critical
            } else if ratio > 1.2 {
                Severity::High
            } else {
                Severity::Medium
            };
            warnings.push(
                Warning::new(
                    WarningKind::MemoryPressure,
                    severity,
                    format!(
                        "Memory usage {:.1}MB exceeds limit {:.1}MB",
                        memory as f64 / perf::MIB as f64,
                        thresholds.max_memory_mb()
                    ),
                )
                .with_suggestion("Release caches and large buffers that are no longer displayed"),
            );
        }

        // Rebuild activity
        for info in infos {
            if info.total_rebuilds > thresholds.max_widget_rebuilds {
                warnings.push(
                    Warning::new(
                        WarningKind::ExcessiveRebuilds,
                        info.severity().max(Severity::Medium),
                        format!(
                            "{} rebuilt {} times (limit {})",
                            info.entity_type, info.total_rebuilds, thresholds.max_widget_rebuilds
                        ),
                    )
                    .with_suggestion("Narrow what triggers this entity to rebuild")
                    .with_location(entity_location(info)),
                );
            }
            if let Some(warning) = rebuild_memory_warning(info) {
                warnings.push(warning);
            }
            if let Some(warning) = inefficient_entity_warning(info) {
                warnings.push(warning);
            }
        }

        // Custom metrics
        for (name, value) in &state.custom_metrics {
            let unit = state.custom_units.get(name).map(String::as_str);
            if let Some(warning) = state.rules.evaluate(name, *value, unit) {
                warnings.push(warning);
            }
        }

        warnings
    }

    fn assemble(&self, state: &mut MonitorState) -> MetricsSnapshot {
        let counts = self.tracker.rebuild_counts();
        let activity = counts.values().sum();
        let stats = FrameStats::from_intervals(&state.frame_intervals);
        let memory = self.effective_memory(state, activity);

        MetricsSnapshot::new()
            .with_frame_stats(&stats)
            .with_frame_drops(state.frame_drops)
            .with_memory(memory, state.peak_memory_usage)
            .with_rebuilds(counts)
            .with_warnings(state.warnings.clone())
            .with_custom_metrics(state.custom_metrics.clone())
    }
}

fn entity_location(info: &RebuildInfo) -> WarningLocation {
    let mut location = WarningLocation::entity(info.entity_type.clone());
    if let Some(key) = &info.key {
        location = location.with_segment(key.clone());
    }
    if let Some(source) = &info.location {
        location = location.with_segment(source.clone());
    }
    location
}

fn rebuild_memory_warning(info: &RebuildInfo) -> Option<Warning> {
    if info.total_rebuilds <= ENTITY_MEMORY_PRESSURE_REBUILDS {
        return None;
    }
    Some(
        Warning::new(
            WarningKind::MemoryPressure,
            Severity::High,
            format!(
                "{} has rebuilt {} times, churning allocations",
                info.entity_type, info.total_rebuilds
            ),
        )
        .with_suggestion("Cache the built output or split out the parts that change")
        .with_location(entity_location(info)),
    )
}

fn inefficient_entity_warning(info: &RebuildInfo) -> Option<Warning> {
    if info.recent_rebuild_rate <= INEFFICIENT_REBUILD_RATE {
        return None;
    }
    Some(
        Warning::new(
            WarningKind::InefficientEntity,
            info.severity(),
            format!(
                "{} rebuilds {:.1} times per second",
                info.entity_type, info.recent_rebuild_rate
            ),
        )
        .with_suggestion("Debounce the state changes feeding this entity")
        .with_location(entity_location(info)),
    )
}

fn spawn_tick_loop(inner: &Arc<MonitorInner>, handle: &Handle) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let period = inner.config.sample_interval;
    handle.spawn(async move {
        let start = Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            inner.tick();
        }
    })
}

fn spawn_frame_pump(
    inner: &Arc<MonitorInner>,
    mut frames: broadcast::Receiver<Duration>,
    handle: &Handle,
) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    handle.spawn(async move {
        loop {
            match frames.recv().await {
                Ok(timestamp) => {
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    if inner.on_frame(timestamp).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        target: "telemetry::monitor",
                        skipped = skipped,
                        "frame pump lagged, restarting interval measurement"
                    );
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    inner.lock().last_frame = None;
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// =============================================================================
// Public Handle
// =============================================================================

/// Builder for [`PerformanceMonitor`].
#[derive(Debug, Default)]
pub struct MonitorBuilder {
    config: MonitorConfig,
    thresholds: Thresholds,
    rules: RuleRegistry,
    tracker: Option<Arc<RebuildTracker>>,
    memory: Option<Arc<dyn MemoryProvider>>,
    frames: Option<FrameTicker>,
}

impl MonitorBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the initial thresholds.
    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Set the custom-metric rules.
    pub fn rules(mut self, rules: RuleRegistry) -> Self {
        self.rules = rules;
        self
    }

    /// Share an existing rebuild tracker.
    pub fn tracker(mut self, tracker: Arc<RebuildTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Read memory from `provider` instead of estimating it.
    pub fn memory_provider(mut self, provider: Arc<dyn MemoryProvider>) -> Self {
        self.memory = Some(provider);
        self
    }

    /// Receive frame boundaries from `ticker` while monitoring.
    pub fn frame_ticker(mut self, ticker: FrameTicker) -> Self {
        self.frames = Some(ticker);
        self
    }

    /// Build the monitor. Monitoring starts stopped.
    pub fn build(self) -> PerformanceMonitor {
        let (metrics_tx, _) = broadcast::channel(METRICS_CHANNEL_CAPACITY);
        let state = MonitorState {
            thresholds: self.thresholds,
            rules: self.rules,
            monitoring: false,
            disposed: false,
            owns_tracking: false,
            last_frame: None,
            frame_intervals: BoundedWindow::new(self.config.frame_window_capacity),
            frame_drops: 0,
            drops_since: Instant::now(),
            memory_usage: 0,
            peak_memory_usage: 0,
            memory_known: false,
            peak_measured: false,
            memory_in_flight: false,
            memory_failures: 0,
            generation: 0,
            warnings: Vec::new(),
            custom_metrics: BTreeMap::new(),
            custom_units: HashMap::new(),
            history: BoundedWindow::new(self.config.history_capacity),
            metrics_tx: Some(metrics_tx),
            tasks: Vec::new(),
        };

        PerformanceMonitor {
            inner: Arc::new(MonitorInner {
                config: self.config,
                tracker: self.tracker.unwrap_or_default(),
                memory: self.memory,
                frames: self.frames,
                state: Mutex::new(state),
            }),
        }
    }
}

/// Handle to a live performance monitor. Clones share the same monitor.
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    inner: Arc<MonitorInner>,
}

impl PerformanceMonitor {
    /// Monitor with default configuration sharing `tracker`.
    pub fn new(tracker: Arc<RebuildTracker>) -> Self {
        Self::builder().tracker(tracker).build()
    }

    /// Start configuring a monitor.
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::default()
    }

    /// Start the periodic tick and, if configured, the frame clock subscription.
    ///
    /// Opens the tracker's write gate unless something else already did, and
    /// asks the memory provider for a first reading.
    ///
    /// Idempotent. Must be called from within a Tokio runtime.
    pub fn start_monitoring(&self) -> TelemetryResult<()> {
        let handle = Handle::try_current().map_err(|_| TelemetryError::NoRuntime(COMPONENT))?;
        if self.inner.live()?.monitoring {
            return Ok(());
        }
        let opened_gate = !self.inner.tracker.is_tracking();
        if opened_gate {
            self.inner.tracker.start_tracking()?;
        }

        let mut state = self.inner.live()?;
        if state.monitoring {
            return Ok(());
        }
        state.monitoring = true;
        state.owns_tracking |= opened_gate;
        state.last_frame = None;
        state.drops_since = Instant::now();
        state.tasks.push(spawn_tick_loop(&self.inner, &handle));
        if let Some(frames) = &self.inner.frames {
            state
                .tasks
                .push(spawn_frame_pump(&self.inner, frames.subscribe(), &handle));
        }

        tracing::info!(
            target: "telemetry::monitor",
            interval_ms = self.inner.config.sample_interval.as_millis() as u64,
            frame_clock = self.inner.frames.is_some(),
            memory_provider = self.inner.memory.as_ref().map(|p| p.name()).unwrap_or("estimate"),
            "monitoring started"
        );
        drop(state);

        self.inner.request_memory_refresh();
        Ok(())
    }

    /// Stop the periodic tick and the frame clock subscription.
    ///
    /// Closes the tracker's write gate only if [`start_monitoring`](Self::start_monitoring)
    /// opened it. Idempotent. History is kept; a memory reading still in flight
    /// is discarded.
    pub fn stop_monitoring(&self) -> TelemetryResult<()> {
        let mut state = self.inner.live()?;
        if !state.monitoring {
            return Ok(());
        }
        state.monitoring = false;
        state.last_frame = None;
        state.generation += 1;
        state.memory_in_flight = false;
        state.abort_tasks();
        let owned_gate = std::mem::take(&mut state.owns_tracking);
        drop(state);

        if owned_gate {
            self.inner.tracker.stop_tracking();
        }
        tracing::info!(target: "telemetry::monitor", "monitoring stopped");
        Ok(())
    }

    /// Check if the monitor is running.
    pub fn is_monitoring(&self) -> bool {
        self.inner.lock().monitoring
    }

    /// Record a render-frame boundary. Ignored while not monitoring.
    pub fn on_frame_boundary(&self, timestamp: Duration) -> TelemetryResult<()> {
        self.inner.on_frame(timestamp)
    }

    /// Store the latest value of a named metric and check it against the rules.
    ///
    /// Returns the warning raised, if any.
    pub fn report_custom_metric(
        &self,
        name: &str,
        value: f64,
        unit: Option<&str>,
    ) -> TelemetryResult<Option<Warning>> {
        let mut state = self.inner.live()?;
        state.custom_metrics.insert(name.to_string(), value);
        match unit {
            Some(unit) => {
                state.custom_units.insert(name.to_string(), unit.to_string());
            }
            None => {
                state.custom_units.remove(name);
            }
        }

        let warning = state.rules.evaluate(name, value, unit);
        if let Some(warning) = &warning {
            push_warning(&mut state.warnings, warning.clone());
        }

        tracing::trace!(
            target: "telemetry::monitor",
            metric = name,
            value = value,
            violated = warning.is_some(),
            "custom metric reported"
        );
        Ok(warning)
    }

    /// Record a rebuild through the shared tracker.
    ///
    /// Raises memory-pressure and inefficient-entity warnings immediately when
    /// the entity crosses those limits.
    pub fn track_rebuild(
        &self,
        entity_type: &str,
        key: Option<&str>,
        location: Option<&str>,
        processing_time: Option<Duration>,
    ) -> TelemetryResult<Option<RebuildEvent>> {
        drop(self.inner.live()?);
        let Some(event) = self
            .inner
            .tracker
            .record_rebuild(entity_type, key, location, processing_time)?
        else {
            return Ok(None);
        };

        if event.total_rebuilds > ENTITY_MEMORY_PRESSURE_REBUILDS
            || event.recent_rebuild_rate > INEFFICIENT_REBUILD_RATE
        {
            let tracking_key = key.unwrap_or(entity_type);
            if let Some(info) = self.inner.tracker.get_rebuild_info(tracking_key) {
                let mut state = self.inner.live()?;
                if let Some(warning) = rebuild_memory_warning(&info) {
                    push_warning(&mut state.warnings, warning);
                }
                if let Some(warning) = inefficient_entity_warning(&info) {
                    push_warning(&mut state.warnings, warning);
                }
            }
        }
        Ok(Some(event))
    }

    /// Metrics as of now, without waiting for the next tick.
    pub fn current_metrics(&self) -> TelemetryResult<MetricsSnapshot> {
        let mut state = self.inner.live()?;
        Ok(self.inner.assemble(&mut state))
    }

    /// Complete one tick immediately, waiting for a fresh memory reading.
    ///
    /// Works whether or not the periodic timer is running.
    pub async fn sample(&self) -> TelemetryResult<MetricsSnapshot> {
        self.inner.refresh_memory_now().await?;
        self.inner.complete_tick()
    }

    /// Build a report from current metrics and recent history.
    pub async fn generate_report(
        &self,
        time_range: Option<Duration>,
        include_recommendations: bool,
    ) -> TelemetryResult<PerformanceReport> {
        self.inner.refresh_memory_now().await?;
        let metrics = self.current_metrics()?;
        let history = self.history_within(time_range)?;

        Ok(PerformanceReport::build(
            metrics,
            &history,
            &self.inner.config.platform,
            self.inner.config.is_mobile(),
            time_range,
            include_recommendations,
        ))
    }

    /// Snapshot history, oldest first.
    pub fn history(&self) -> TelemetryResult<Vec<MetricsSnapshot>> {
        Ok(self.inner.live()?.history.to_vec())
    }

    /// Snapshot history within a trailing window, oldest first.
    pub fn history_within(&self, time_range: Option<Duration>) -> TelemetryResult<Vec<MetricsSnapshot>> {
        let state = self.inner.live()?;
        let start = window_start(time_range);
        Ok(state
            .history
            .iter()
            .filter(|s| start.map_or(true, |start| s.timestamp >= start))
            .cloned()
            .collect())
    }

    /// Active thresholds.
    pub fn thresholds(&self) -> Thresholds {
        self.inner.lock().thresholds.clone()
    }

    /// Replace the thresholds. Takes effect on the next tick.
    pub fn set_thresholds(&self, thresholds: Thresholds) -> TelemetryResult<()> {
        let mut state = self.inner.live()?;
        tracing::debug!(target: "telemetry::monitor", thresholds = %thresholds, "thresholds replaced");
        state.thresholds = thresholds;
        Ok(())
    }

    /// Replace the custom-metric rules.
    pub fn set_rules(&self, rules: RuleRegistry) -> TelemetryResult<()> {
        self.inner.live()?.rules = rules;
        Ok(())
    }

    /// Reset history, counters, warnings, and rebuild records. Monitoring continues.
    pub fn clear_metrics(&self) -> TelemetryResult<()> {
        let mut state = self.inner.live()?;
        state.history.clear();
        state.frame_intervals.clear();
        state.last_frame = None;
        state.frame_drops = 0;
        state.warnings.clear();
        state.custom_metrics.clear();
        state.custom_units.clear();
        state.reset_memory();
        state.drops_since = Instant::now();
        state.generation += 1;
        drop(state);

        self.inner.tracker.reset()?;
        tracing::debug!(target: "telemetry::monitor", "metrics cleared");
        Ok(())
    }

    /// Subscribe to per-tick snapshots.
    pub fn subscribe(&self) -> TelemetryResult<broadcast::Receiver<MetricsSnapshot>> {
        let state = self.inner.live()?;
        state
            .metrics_tx
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(TelemetryError::Disposed(COMPONENT))
    }

    /// The shared rebuild tracker.
    pub fn tracker(&self) -> &Arc<RebuildTracker> {
        &self.inner.tracker
    }

    /// Monitor configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Stop monitoring, drop all state, and close the metrics channel.
    ///
    /// Every later mutating call fails with [`TelemetryError::Disposed`].
    pub fn dispose(&self) {
        let mut state = self.inner.lock();
        if state.disposed {
            return;
        }
        let owned_gate = std::mem::take(&mut state.owns_tracking);
        state.disposed = true;
        state.monitoring = false;
        state.generation += 1;
        state.abort_tasks();
        state.metrics_tx = None;
        state.history.clear();
        state.frame_intervals.clear();
        state.warnings.clear();
        state.custom_metrics.clear();
        state.custom_units.clear();
        drop(state);

        if owned_gate {
            self.inner.tracker.stop_tracking();
        }
        tracing::info!(target: "telemetry::monitor", "monitor disposed");
    }

    /// Check if [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }
}
