//! Per-entity rebuild tracking.
//!
//! Every time a UI entity re-renders, the host calls
//! [`RebuildTracker::record_rebuild`]. The tracker keeps one record per entity
//! key with a cumulative total, the timestamps of the last minute of rebuilds,
//! and a capped sample of processing durations. Rates, averages, severity, and
//! the excessive flag are derived from those on read.
//!
//! One tracker is shared by the whole process through an `Arc`; the monitor
//! and any visual layer read from the same instance.

use chrono::{DateTime, Utc};
use perf::{duration_ms, BoundedWindow, Clock, MonotonicClock, Severity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{TelemetryError, TelemetryResult};

/// Span over which the recent rebuild rate is measured.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);
/// Processing-duration samples kept per entity.
pub const DURATION_SAMPLE_CAPACITY: usize = 100;
/// Records idle for longer than this are evicted by the sweep.
pub const STALE_AFTER: Duration = Duration::from_secs(5 * 60);
/// Time between background sweeps while tracking.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// Derived Info
// =============================================================================

/// A read-only view of one entity's rebuild activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildInfo {
    /// Entity type name
    pub entity_type: String,
    /// Stable key, if the entity has one
    pub key: Option<String>,
    /// Source location, if reported
    pub location: Option<String>,
    /// Rebuilds since the record was created
    pub total_rebuilds: u64,
    /// Rebuilds per second over the last minute
    pub recent_rebuild_rate: f64,
    /// Mean processing time over the sampled durations
    pub average_duration_ms: Option<f64>,
    /// Clock time of the first rebuild
    #[serde(with = "crate::duration_serde")]
    pub first_seen: Duration,
    /// Clock time of the latest rebuild
    #[serde(with = "crate::duration_serde")]
    pub last_seen: Duration,
}

impl RebuildInfo {
    /// Key the tracker files this entity under.
    pub fn tracking_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.entity_type)
    }

    /// More than 100 rebuilds, more than 5 per second, or slow and frequent.
    pub fn is_excessive(&self) -> bool {
        let avg = self.average_duration_ms.unwrap_or(0.0);
        self.total_rebuilds > 100
            || self.recent_rebuild_rate > 5.0
            || (avg > 10.0 && self.total_rebuilds > 20)
    }

    /// Four-level classification of the rebuild activity.
    pub fn severity(&self) -> Severity {
        let total = self.total_rebuilds;
        let rate = self.recent_rebuild_rate;
        let avg = self.average_duration_ms.unwrap_or(0.0);

        if total > 1000 || rate > 20.0 || avg > 50.0 {
            Severity::Critical
        } else if total > 500 || rate > 10.0 || avg > 25.0 {
            Severity::High
        } else if total > 100 || rate > 5.0 || avg > 10.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Published once per recorded rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildEvent {
    /// Entity type name
    pub entity_type: String,
    /// Stable key, if any
    pub key: Option<String>,
    /// Source location, if any
    pub location: Option<String>,
    /// Wall-clock time of the rebuild
    pub timestamp: DateTime<Utc>,
    /// Running total after this rebuild
    pub total_rebuilds: u64,
    /// Recent rate after this rebuild
    pub recent_rebuild_rate: f64,
    /// Running mean processing time
    pub average_duration_ms: Option<f64>,
    /// Whether the entity now counts as excessive
    pub is_excessive: bool,
}

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone)]
struct RebuildRecord {
    entity_type: String,
    key: Option<String>,
    location: Option<String>,
    total: u64,
    recent: VecDeque<Duration>,
    durations: BoundedWindow<Duration>,
    first_seen: Duration,
    last_seen: Duration,
}

impl RebuildRecord {
    fn new(entity_type: &str, key: Option<&str>, location: Option<&str>, now: Duration) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            key: key.map(str::to_string),
            location: location.map(str::to_string),
            total: 0,
            recent: VecDeque::new(),
            durations: BoundedWindow::new(DURATION_SAMPLE_CAPACITY),
            first_seen: now,
            last_seen: now,
        }
    }

    fn record(&mut self, now: Duration, location: Option<&str>, duration: Option<Duration>) {
        self.total += 1;
        self.last_seen = now;
        if let Some(location) = location {
            self.location = Some(location.to_string());
        }

        self.recent.push_back(now);
        let cutoff = now.saturating_sub(RATE_WINDOW);
        while self.recent.front().is_some_and(|t| *t < cutoff) {
            self.recent.pop_front();
        }

        if let Some(duration) = duration {
            self.durations.push(duration);
        }
    }

    /// Rebuilds within the window divided by the seconds they span, at least one.
    fn recent_rate(&self, now: Duration) -> f64 {
        let cutoff = now.saturating_sub(RATE_WINDOW);
        let mut in_window = self.recent.iter().filter(|t| **t >= cutoff);
        let Some(oldest) = in_window.next() else {
            return 0.0;
        };
        let count = 1 + in_window.count();
        let span = now.saturating_sub(*oldest).max(Duration::from_secs(1));
        count as f64 / span.as_secs_f64()
    }

    fn average_duration_ms(&self) -> Option<f64> {
        if self.durations.is_empty() {
            return None;
        }
        let total: Duration = self.durations.iter().sum();
        Some(duration_ms(total) / self.durations.len() as f64)
    }

    fn info(&self, now: Duration) -> RebuildInfo {
        RebuildInfo {
            entity_type: self.entity_type.clone(),
            key: self.key.clone(),
            location: self.location.clone(),
            total_rebuilds: self.total,
            recent_rebuild_rate: self.recent_rate(now),
            average_duration_ms: self.average_duration_ms(),
            first_seen: self.first_seen,
            last_seen: self.last_seen,
        }
    }
}

// =============================================================================
// Tracker
// =============================================================================

#[derive(Debug)]
struct TrackerState {
    records: HashMap<String, RebuildRecord>,
    tracking: bool,
    disposed: bool,
    events: Option<broadcast::Sender<RebuildEvent>>,
    sweep_task: Option<JoinHandle<()>>,
}

/// Process-wide registry of rebuild activity.
///
/// Writes are gated by [`start_tracking`](Self::start_tracking) /
/// [`stop_tracking`](Self::stop_tracking); reads are always allowed.
#[derive(Debug)]
pub struct RebuildTracker {
    clock: Arc<dyn Clock>,
    state: Mutex<TrackerState>,
}

impl RebuildTracker {
    /// Create a tracker reading time from a monotonic clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Create a tracker reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            clock,
            state: Mutex::new(TrackerState {
                records: HashMap::new(),
                tracking: false,
                disposed: false,
                events: Some(events),
                sweep_task: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live(&self) -> TelemetryResult<MutexGuard<'_, TrackerState>> {
        let state = self.lock();
        if state.disposed {
            return Err(TelemetryError::Disposed("RebuildTracker"));
        }
        Ok(state)
    }

    /// Open the write gate.
    ///
    /// Inside a Tokio runtime this also starts the stale-record sweep; without
    /// one, callers can run [`sweep_stale`](Self::sweep_stale) themselves.
    pub fn start_tracking(self: &Arc<Self>) -> TelemetryResult<()> {
        let mut state = self.live()?;
        if state.tracking {
            return Ok(());
        }
        state.tracking = true;

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let weak = Arc::downgrade(self);
            state.sweep_task = Some(handle.spawn(async move {
                let start = tokio::time::Instant::now() + SWEEP_INTERVAL;
                let mut ticker = tokio::time::interval_at(start, SWEEP_INTERVAL);
                loop {
                    ticker.tick().await;
                    let Some(tracker) = weak.upgrade() else {
                        break;
                    };
                    tracker.sweep_stale();
                }
            }));
        }

        tracing::info!(target: "telemetry::rebuild", "rebuild tracking started");
        Ok(())
    }

    /// Close the write gate. Records are kept.
    pub fn stop_tracking(&self) {
        let mut state = self.lock();
        if !state.tracking {
            return;
        }
        state.tracking = false;
        if let Some(task) = state.sweep_task.take() {
            task.abort();
        }
        tracing::info!(target: "telemetry::rebuild", "rebuild tracking stopped");
    }

    /// Check if writes are currently accepted.
    pub fn is_tracking(&self) -> bool {
        self.lock().tracking
    }

    /// Record one rebuild of an entity.
    ///
    /// Returns `Ok(None)` while tracking is off.
    pub fn record_rebuild(
        &self,
        entity_type: &str,
        key: Option<&str>,
        location: Option<&str>,
        duration: Option<Duration>,
    ) -> TelemetryResult<Option<RebuildEvent>> {
        let mut state = self.live()?;
        if !state.tracking {
            return Ok(None);
        }

        let now = self.clock.now();
        let record_key = key.unwrap_or(entity_type).to_string();
        let record = state
            .records
            .entry(record_key)
            .or_insert_with(|| RebuildRecord::new(entity_type, key, location, now));
        record.record(now, location, duration);
        let info = record.info(now);

        let event = RebuildEvent {
            is_excessive: info.is_excessive(),
            entity_type: info.entity_type,
            key: info.key,
            location: info.location,
            timestamp: Utc::now(),
            total_rebuilds: info.total_rebuilds,
            recent_rebuild_rate: info.recent_rebuild_rate,
            average_duration_ms: info.average_duration_ms,
        };

        tracing::trace!(
            target: "telemetry::rebuild",
            entity = entity_type,
            total = event.total_rebuilds,
            rate = event.recent_rebuild_rate,
            "rebuild recorded"
        );

        if let Some(events) = &state.events {
            // No subscribers is fine.
            let _ = events.send(event.clone());
        }
        Ok(Some(event))
    }

    /// Rebuild info for one entity key.
    pub fn get_rebuild_info(&self, key: &str) -> Option<RebuildInfo> {
        let now = self.clock.now();
        self.lock().records.get(key).map(|r| r.info(now))
    }

    /// Info for every tracked entity, most rebuilt first.
    pub fn all_rebuilds(&self) -> Vec<RebuildInfo> {
        let now = self.clock.now();
        let mut infos: Vec<RebuildInfo> = self.lock().records.values().map(|r| r.info(now)).collect();
        infos.sort_by(|a, b| {
            b.total_rebuilds
                .cmp(&a.total_rebuilds)
                .then_with(|| a.tracking_key().cmp(b.tracking_key()))
        });
        infos
    }

    /// Entities currently flagged as excessive, most rebuilt first.
    pub fn excessive_rebuilds(&self) -> Vec<RebuildInfo> {
        self.all_rebuilds()
            .into_iter()
            .filter(RebuildInfo::is_excessive)
            .collect()
    }

    /// Total rebuilds keyed by entity key.
    pub fn rebuild_counts(&self) -> BTreeMap<String, u64> {
        self.lock()
            .records
            .iter()
            .map(|(key, record)| (key.clone(), record.total))
            .collect()
    }

    /// Sum of rebuild totals across all entities.
    pub fn total_rebuild_activity(&self) -> u64 {
        self.lock().records.values().map(|r| r.total).sum()
    }

    /// Number of tracked entities.
    pub fn entity_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Subscribe to rebuild events.
    pub fn subscribe(&self) -> TelemetryResult<broadcast::Receiver<RebuildEvent>> {
        let state = self.live()?;
        state
            .events
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(TelemetryError::Disposed("RebuildTracker"))
    }

    /// Evict records whose last rebuild is older than [`STALE_AFTER`].
    ///
    /// Returns the number of records removed.
    pub fn sweep_stale(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.lock();
        let before = state.records.len();
        state
            .records
            .retain(|_, record| now.saturating_sub(record.last_seen) <= STALE_AFTER);
        let removed = before - state.records.len();

        if removed > 0 {
            tracing::debug!(
                target: "telemetry::rebuild",
                removed = removed,
                remaining = state.records.len(),
                "stale rebuild records evicted"
            );
        }
        removed
    }

    /// Forget every record.
    pub fn reset(&self) -> TelemetryResult<()> {
        self.live()?.records.clear();
        Ok(())
    }

    /// Stop tracking, clear all records, and close the event channel.
    pub fn dispose(&self) {
        let mut state = self.lock();
        if state.disposed {
            return;
        }
        state.tracking = false;
        state.disposed = true;
        state.records.clear();
        state.events = None;
        if let Some(task) = state.sweep_task.take() {
            task.abort();
        }
        tracing::info!(target: "telemetry::rebuild", "rebuild tracker disposed");
    }

    /// Check if [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }
}

impl Default for RebuildTracker {
    fn default() -> Self {
        Self::new()
    }
}
