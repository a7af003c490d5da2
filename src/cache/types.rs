//! Core types for the cache system.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Cache-related errors.
///
/// [`CacheError::Miss`] is an expected condition, never logged as an error:
/// the entry may be absent because it was never produced or because the
/// cleaner evicted it between a presence check and an open.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The entry is not in the cache.
    #[error("cache miss")]
    Miss,

    /// I/O error during a cache operation, distinct from a miss.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cleaner did not finish within the shutdown deadline.
    #[error("cleaner shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

impl CacheError {
    /// True if this error is a plain cache miss.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss)
    }
}

/// Cleaner configuration.
#[derive(Debug, Clone)]
pub struct CleanerConfig {
    /// Directory to keep within budget.
    pub dir: PathBuf,
    /// Interval between cleanup cycles (default: 1 hour).
    pub check_interval: Duration,
    /// Entries older than this are always evicted.
    pub max_age: Duration,
    /// Total size budget in bytes for entries younger than `max_age`.
    pub max_total_size: u64,
}

impl CleanerConfig {
    /// Create a configuration with the default check interval.
    pub fn new(dir: PathBuf, max_age: Duration, max_total_size: u64) -> Self {
        Self {
            dir,
            check_interval: Duration::from_secs(60 * 60),
            max_age,
            max_total_size,
        }
    }

    /// Set a custom interval between cleanup cycles.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleaner_config_defaults() {
        let config = CleanerConfig::new(
            PathBuf::from("/tmp/cache"),
            Duration::from_secs(24 * 60 * 60),
            1 << 30,
        );

        assert_eq!(config.check_interval, Duration::from_secs(3600));
        assert_eq!(config.max_total_size, 1 << 30);
    }

    #[test]
    fn test_cleaner_config_builder() {
        let config = CleanerConfig::new(PathBuf::from("/tmp/cache"), Duration::from_secs(60), 100)
            .with_check_interval(Duration::from_millis(50));

        assert_eq!(config.check_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_cache_error_is_miss() {
        assert!(CacheError::Miss.is_miss());
        let io_error = CacheError::Io(std::io::Error::other("boom"));
        assert!(!io_error.is_miss());
    }
}
