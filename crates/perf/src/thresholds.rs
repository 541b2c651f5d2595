//! Threshold configuration for warning generation.

use serde::{Deserialize, Serialize};

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Limits a monitor checks on every tick.
///
/// A monitor holds one `Thresholds` value at a time; replacing it takes
/// effect on the next tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    /// Frames over budget tolerated per second.
    pub max_frame_drops_per_second: u32,

    /// Memory ceiling in bytes.
    pub max_memory_usage: u64,

    /// Rebuilds tolerated per entity before it is flagged.
    pub max_widget_rebuilds: u64,

    /// Lowest acceptable frames per second.
    pub min_fps: f64,

    /// Longest acceptable mean frame interval in milliseconds.
    ///
    /// Target: 16.67ms for 60fps.
    pub max_frame_time: f64,
}

impl Thresholds {
    /// Create thresholds with every limit set explicitly.
    pub fn new(
        max_frame_drops_per_second: u32,
        max_memory_usage: u64,
        max_widget_rebuilds: u64,
        min_fps: f64,
        max_frame_time: f64,
    ) -> Self {
        Self {
            max_frame_drops_per_second,
            max_memory_usage,
            max_widget_rebuilds,
            min_fps,
            max_frame_time,
        }
    }

    /// Limits for a 120Hz display.
    pub fn for_120fps() -> Self {
        Self {
            max_frame_drops_per_second: 10,
            max_memory_usage: 512 * MIB,
            max_widget_rebuilds: 100,
            min_fps: 110.0,
            max_frame_time: 8.33,
        }
    }

    /// Looser limits for heavy screens or low-end hardware.
    pub fn relaxed() -> Self {
        Self {
            max_frame_drops_per_second: 15,
            max_memory_usage: 1024 * MIB,
            max_widget_rebuilds: 500,
            min_fps: 30.0,
            max_frame_time: 33.33,
        }
    }

    /// Tight limits for performance testing.
    pub fn strict() -> Self {
        Self {
            max_frame_drops_per_second: 1,
            max_memory_usage: 256 * MIB,
            max_widget_rebuilds: 50,
            min_fps: 58.0,
            max_frame_time: 16.67,
        }
    }

    /// Builder method to set the frame-drop limit.
    pub fn with_max_frame_drops(mut self, per_second: u32) -> Self {
        self.max_frame_drops_per_second = per_second;
        self
    }

    /// Builder method to set the memory ceiling.
    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory_usage = bytes;
        self
    }

    /// Builder method to set the per-entity rebuild limit.
    pub fn with_max_rebuilds(mut self, rebuilds: u64) -> Self {
        self.max_widget_rebuilds = rebuilds;
        self
    }

    /// Builder method to set the FPS floor.
    pub fn with_min_fps(mut self, fps: f64) -> Self {
        self.min_fps = fps;
        self
    }

    /// Builder method to set the frame interval limit.
    pub fn with_max_frame_time(mut self, ms: f64) -> Self {
        self.max_frame_time = ms;
        self
    }

    /// Check if a memory reading is within the ceiling.
    pub fn check_memory(&self, bytes: u64) -> bool {
        bytes <= self.max_memory_usage
    }

    /// Check if an FPS reading meets the floor.
    pub fn check_fps(&self, fps: f64) -> bool {
        fps >= self.min_fps
    }

    /// Check if a mean frame interval is within the limit.
    pub fn check_frame_time(&self, ms: f64) -> bool {
        ms <= self.max_frame_time
    }

    /// Memory ceiling in mebibytes.
    pub fn max_memory_mb(&self) -> f64 {
        self.max_memory_usage as f64 / MIB as f64
    }
}

impl Default for Thresholds {
    /// Targets 60fps with a 512MB memory ceiling.
    fn default() -> Self {
        Self {
            max_frame_drops_per_second: 5,
            max_memory_usage: 512 * MIB,
            max_widget_rebuilds: 100,
            min_fps: 55.0,
            max_frame_time: 16.67,
        }
    }
}

impl std::fmt::Display for Thresholds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fps >= {:.1}, frame <= {:.2}ms, drops <= {}/s, memory <= {:.0}MB, rebuilds <= {}",
            self.min_fps,
            self.max_frame_time,
            self.max_frame_drops_per_second,
            self.max_memory_mb(),
            self.max_widget_rebuilds
        )
    }
}
