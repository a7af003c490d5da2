//! Observability sink for cache and generation events.
//!
//! Components emit counters and observations via a sink abstraction. The
//! cache and the generation service don't know how events are consumed - this
//! follows the "emit, don't present" pattern: consumers (logging, a metrics
//! endpoint, tests) decide how to aggregate or export them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Sink for cache and generation telemetry.
///
/// All methods are fire-and-forget and must be cheap; implementations are
/// called from hot paths and from worker tasks.
pub trait MetricsSink: Send + Sync {
    /// A cache probe or open found the entry.
    fn cache_hit(&self) {}
    /// A cache probe or open found nothing.
    fn cache_miss(&self) {}
    /// A cache operation failed with an I/O error other than a miss.
    fn cache_error(&self) {}

    /// A production attempt failed.
    fn generation_error(&self) {}
    /// A production attempt stored the original bytes verbatim.
    fn original_used(&self) {}

    /// Size in bytes of a downloaded original.
    fn observe_original_size(&self, _bytes: u64) {}
    /// Ratio of original size to thumbnail size for a transcoded entry.
    fn observe_size_ratio(&self, _ratio: f64) {}
    /// Wall-clock duration of one production attempt.
    fn observe_task_duration(&self, _duration: Duration) {}
}

/// Sink that discards all events.
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {}

/// Count/sum aggregate for observed values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Aggregate {
    pub count: u64,
    pub sum: f64,
}

impl Aggregate {
    fn observe(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
    }

    /// Mean of all observed values, or 0.0 if none were recorded.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Point-in-time view of an [`AtomicMetricsSink`].
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_errors: u64,
    pub generation_errors: u64,
    pub original_used: u64,
    pub original_sizes: Aggregate,
    pub size_ratios: Aggregate,
    pub task_durations_secs: Aggregate,
}

/// In-process aggregating sink.
///
/// Counters are lock-free; observations share one mutex, acquired only on the
/// comparatively rare per-task events.
#[derive(Default)]
pub struct AtomicMetricsSink {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_errors: AtomicU64,
    generation_errors: AtomicU64,
    original_used: AtomicU64,
    observations: Mutex<Observations>,
}

#[derive(Default)]
struct Observations {
    original_sizes: Aggregate,
    size_ratios: Aggregate,
    task_durations_secs: Aggregate,
}

impl AtomicMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all counters and aggregates.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let observations = self.observations.lock().unwrap();
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            generation_errors: self.generation_errors.load(Ordering::Relaxed),
            original_used: self.original_used.load(Ordering::Relaxed),
            original_sizes: observations.original_sizes,
            size_ratios: observations.size_ratios,
            task_durations_secs: observations.task_durations_secs,
        }
    }
}

impl MetricsSink for AtomicMetricsSink {
    fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn generation_error(&self) {
        self.generation_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn original_used(&self) {
        self.original_used.fetch_add(1, Ordering::Relaxed);
    }

    fn observe_original_size(&self, bytes: u64) {
        self.observations
            .lock()
            .unwrap()
            .original_sizes
            .observe(bytes as f64);
    }

    fn observe_size_ratio(&self, ratio: f64) {
        self.observations.lock().unwrap().size_ratios.observe(ratio);
    }

    fn observe_task_duration(&self, duration: Duration) {
        self.observations
            .lock()
            .unwrap()
            .task_durations_secs
            .observe(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_sink_counts() {
        let sink = AtomicMetricsSink::new();

        sink.cache_hit();
        sink.cache_hit();
        sink.cache_miss();
        sink.generation_error();
        sink.original_used();

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.cache_hits, 2);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.cache_errors, 0);
        assert_eq!(snapshot.generation_errors, 1);
        assert_eq!(snapshot.original_used, 1);
    }

    #[test]
    fn test_atomic_sink_aggregates() {
        let sink = AtomicMetricsSink::new();

        sink.observe_original_size(100);
        sink.observe_original_size(300);
        sink.observe_size_ratio(4.0);
        sink.observe_task_duration(Duration::from_millis(500));

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.original_sizes.count, 2);
        assert!((snapshot.original_sizes.mean() - 200.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.size_ratios.count, 1);
        assert!((snapshot.task_durations_secs.sum - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_aggregate_mean_of_empty() {
        let aggregate = Aggregate::default();
        assert_eq!(aggregate.mean(), 0.0);
    }

    #[test]
    fn test_null_sink_accepts_everything() {
        let sink = NullMetricsSink;
        sink.cache_hit();
        sink.observe_task_duration(Duration::from_secs(1));
    }
}
