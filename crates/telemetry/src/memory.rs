//! Memory usage sources.
//!
//! The monitor asks a [`MemoryProvider`] for the process's resident memory on
//! every tick. Providers may be slow or fail; when no reading is available the
//! monitor falls back to a [`FallbackEstimator`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{TelemetryError, TelemetryResult};

// =============================================================================
// Provider Trait
// =============================================================================

/// Asynchronous source of the process's resident memory in bytes.
#[async_trait]
pub trait MemoryProvider: Send + Sync + Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Current resident memory in bytes.
    async fn resident_bytes(&self) -> TelemetryResult<u64>;
}

// =============================================================================
// /proc Provider
// =============================================================================

/// Reads resident set size from `/proc/self/statm`.
///
/// Only Linux exposes this file; elsewhere every call fails and the monitor
/// uses its estimator.
#[derive(Debug, Clone)]
pub struct ProcMemoryProvider {
    statm_path: PathBuf,
    page_size: u64,
}

impl ProcMemoryProvider {
    /// Default page size assumed when converting pages to bytes.
    pub const DEFAULT_PAGE_SIZE: u64 = 4096;

    /// Provider for the current process.
    pub fn new() -> Self {
        Self {
            statm_path: PathBuf::from("/proc/self/statm"),
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// Read from a different statm-formatted file.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.statm_path = path.into();
        self
    }

    /// Override the page size.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn parse_statm(&self, contents: &str) -> TelemetryResult<u64> {
        // size resident shared text lib data dt
        let resident = contents
            .split_whitespace()
            .nth(1)
            .and_then(|field| field.parse::<u64>().ok())
            .ok_or_else(|| {
                TelemetryError::MemoryUnavailable(format!(
                    "malformed statm contents in {}",
                    self.statm_path.display()
                ))
            })?;
        Ok(resident.saturating_mul(self.page_size))
    }
}

impl Default for ProcMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryProvider for ProcMemoryProvider {
    fn name(&self) -> &str {
        "procfs"
    }

    async fn resident_bytes(&self) -> TelemetryResult<u64> {
        let contents = tokio::fs::read_to_string(&self.statm_path).await?;
        self.parse_statm(&contents)
    }
}

// =============================================================================
// Static Provider
// =============================================================================

/// A provider that reports whatever figure the host last stored.
///
/// Hosts that already sample memory elsewhere push readings with
/// [`set`](Self::set).
#[derive(Debug, Default)]
pub struct StaticMemoryProvider {
    bytes: AtomicU64,
}

impl StaticMemoryProvider {
    /// Provider reporting `bytes`.
    pub fn new(bytes: u64) -> Self {
        Self {
            bytes: AtomicU64::new(bytes),
        }
    }

    /// Replace the reported figure.
    pub fn set(&self, bytes: u64) {
        self.bytes.store(bytes, Ordering::Relaxed);
    }
}

#[async_trait]
impl MemoryProvider for StaticMemoryProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn resident_bytes(&self) -> TelemetryResult<u64> {
        Ok(self.bytes.load(Ordering::Relaxed))
    }
}

// =============================================================================
// Fallback Estimator
// =============================================================================

/// Deterministic stand-in used when no memory reading is available.
///
/// The estimate is `base_bytes + rebuild_activity * bytes_per_rebuild`. It is
/// a placeholder, not a measured relationship; the constants carry no meaning
/// beyond keeping the figure plausible and monotonic in rebuild activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FallbackEstimator {
    /// Bytes reported with no rebuild activity
    pub base_bytes: u64,
    /// Bytes added per recorded rebuild
    pub bytes_per_rebuild: u64,
}

impl FallbackEstimator {
    /// Create an estimator with explicit constants.
    pub fn new(base_bytes: u64, bytes_per_rebuild: u64) -> Self {
        Self {
            base_bytes,
            bytes_per_rebuild,
        }
    }

    /// Estimated memory for a cumulative rebuild count.
    pub fn estimate(&self, rebuild_activity: u64) -> u64 {
        self.base_bytes
            .saturating_add(rebuild_activity.saturating_mul(self.bytes_per_rebuild))
    }
}

impl Default for FallbackEstimator {
    /// 50 MiB base plus 1 KiB per rebuild.
    fn default() -> Self {
        Self {
            base_bytes: 50 * 1024 * 1024,
            bytes_per_rebuild: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimator_default() {
        let estimator = FallbackEstimator::default();
        assert_eq!(estimator.estimate(0), 50 * 1024 * 1024);
        assert_eq!(estimator.estimate(10), 50 * 1024 * 1024 + 10 * 1024);
    }

    #[test]
    fn test_estimator_saturates() {
        let estimator = FallbackEstimator::new(u64::MAX - 1, 1024);
        assert_eq!(estimator.estimate(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_parse_statm() {
        let provider = ProcMemoryProvider::new();
        let bytes = provider.parse_statm("12345 2500 300 10 0 900 0\n").unwrap();
        assert_eq!(bytes, 2500 * 4096);

        assert!(matches!(
            provider.parse_statm("garbage"),
            Err(TelemetryError::MemoryUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_proc_provider_reads_file() {
        let path = std::env::temp_dir().join(format!("statm-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, "100 20 5 1 0 10 0").await.unwrap();

        let provider = ProcMemoryProvider::new().with_path(&path).with_page_size(1000);
        assert_eq!(provider.resident_bytes().await.unwrap(), 20_000);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_proc_provider_missing_file() {
        let provider = ProcMemoryProvider::new().with_path("/nonexistent/statm");
        assert!(matches!(
            provider.resident_bytes().await,
            Err(TelemetryError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticMemoryProvider::new(1024);
        assert_eq!(provider.resident_bytes().await.unwrap(), 1024);

        provider.set(2048);
        assert_eq!(provider.resident_bytes().await.unwrap(), 2048);
        assert_eq!(provider.name(), "static");
    }
}
