//! Error types for the telemetry engine.

use thiserror::Error;

/// Errors that can occur in the telemetry engine.
///
/// Threshold violations and failed benchmarks are data, not errors: they
/// surface as warnings, alerts, and `BenchmarkResult::passed`.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A component was used after `dispose()`
    #[error("{0} has been disposed")]
    Disposed(&'static str),

    /// The toolkit has not been initialized
    #[error("Performance toolkit is not initialized")]
    NotInitialized,

    /// A background task was requested outside a Tokio runtime
    #[error("No Tokio runtime is available to drive {0}")]
    NoRuntime(&'static str),

    /// The memory provider could not produce a reading
    #[error("Memory usage unavailable: {0}")]
    MemoryUnavailable(String),

    /// Failed to serialize a report
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
