//! Performance Metric Primitives
//!
//! Synchronous building blocks shared by the telemetry engine:
//! - Clock abstraction with a manual clock for simulated time
//! - Bounded FIFO windows for frame intervals and metric history
//! - Frame statistics, percentiles, and trend classification
//! - Metrics snapshots, warnings, thresholds, and custom-metric rules
//!
//! # Example
//!
//! ```rust
//! use perf::{BoundedWindow, FrameStats, Duration};
//!
//! let mut window = BoundedWindow::new(60);
//! for _ in 0..60 {
//!     window.push(Duration::from_micros(16_670));
//! }
//!
//! let stats = FrameStats::from_intervals(&window);
//! assert_eq!(stats.average_ms, 16.67);
//! ```

mod clock;
mod rules;
mod snapshot;
mod stats;
mod thresholds;
mod warning;
mod window;

pub use clock::*;
pub use rules::*;
pub use snapshot::*;
pub use stats::*;
pub use thresholds::*;
pub use warning::*;
pub use window::*;

/// Re-export for convenience
pub use std::time::Duration;
