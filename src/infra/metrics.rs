//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for poll latency (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total frames polled from the vision feed (monotonic)
    frames_total: AtomicU64,
    /// Frames since last report (reset on report)
    frames_since_report: AtomicU64,
    /// Total detections above threshold (monotonic)
    detections_total: AtomicU64,
    /// Detections that matched a wanted item (monotonic)
    items_found_total: AtomicU64,
    /// Sum of poll latencies in microseconds (reset on report)
    poll_latency_sum_us: AtomicU64,
    /// Max poll latency in microseconds (reset on report)
    poll_latency_max_us: AtomicU64,
    /// Poll latency histogram buckets (reset on report)
    poll_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Feed reconnect attempts (monotonic)
    feed_reconnects_total: AtomicU64,
    /// Sonar reads that failed or returned garbage (monotonic)
    sonar_read_errors_total: AtomicU64,
    /// Walls detected / turns performed (monotonic)
    turns_total: AtomicU64,
    /// Searches started (monotonic)
    searches_started_total: AtomicU64,
    /// Searches that reached a terminal Completed state (monotonic)
    searches_completed_total: AtomicU64,
    /// Searches that ended in Failed (monotonic)
    searches_failed_total: AtomicU64,
    /// Notifications dropped due to channel full (monotonic)
    notifications_dropped: AtomicU64,
    /// UI commands dropped due to channel full (monotonic)
    commands_dropped: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            frames_since_report: AtomicU64::new(0),
            detections_total: AtomicU64::new(0),
            items_found_total: AtomicU64::new(0),
            poll_latency_sum_us: AtomicU64::new(0),
            poll_latency_max_us: AtomicU64::new(0),
            poll_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            feed_reconnects_total: AtomicU64::new(0),
            sonar_read_errors_total: AtomicU64::new(0),
            turns_total: AtomicU64::new(0),
            searches_started_total: AtomicU64::new(0),
            searches_completed_total: AtomicU64::new(0),
            searches_failed_total: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            commands_dropped: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record one vision feed poll with its latency
    #[inline]
    pub fn record_frame_polled(&self, latency_us: u64) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
        self.poll_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.poll_latency_max_us, latency_us);
        self.poll_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_detections(&self, count: u64) {
        self.detections_total.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_item_found(&self) {
        self.items_found_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_feed_reconnect(&self) {
        self.feed_reconnects_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sonar_read_error(&self) {
        self.sonar_read_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_turn(&self) {
        self.turns_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_search_started(&self) {
        self.searches_started_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_search_completed(&self) {
        self.searches_completed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_search_failed(&self) {
        self.searches_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_command_dropped(&self) {
        self.commands_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn items_found(&self) -> u64 {
        self.items_found_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn turns(&self) -> u64 {
        self.turns_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn feed_reconnects(&self) -> u64 {
        self.feed_reconnects_total.load(Ordering::Relaxed)
    }

    /// Build a report, resetting the since-report counters
    pub fn report(&self) -> MetricsSummary {
        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let frames = self.frames_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.poll_latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.poll_latency_max_us.swap(0, Ordering::Relaxed);
        let buckets = swap_buckets(&self.poll_latency_buckets);

        let avg_latency_us = if frames > 0 { latency_sum / frames } else { 0 };
        let frames_per_sec = if elapsed.as_secs_f64() > 0.0 {
            frames as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            frames_total: self.frames_total.load(Ordering::Relaxed),
            frames_per_sec,
            avg_poll_latency_us: avg_latency_us,
            max_poll_latency_us: latency_max,
            poll_p95_us: percentile_from_buckets(&buckets, 0.95),
            detections_total: self.detections_total.load(Ordering::Relaxed),
            items_found_total: self.items_found_total.load(Ordering::Relaxed),
            feed_reconnects_total: self.feed_reconnects_total.load(Ordering::Relaxed),
            sonar_read_errors_total: self.sonar_read_errors_total.load(Ordering::Relaxed),
            turns_total: self.turns_total.load(Ordering::Relaxed),
            searches_started_total: self.searches_started_total.load(Ordering::Relaxed),
            searches_completed_total: self.searches_completed_total.load(Ordering::Relaxed),
            searches_failed_total: self.searches_failed_total.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of all metrics for one reporting interval
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub frames_total: u64,
    pub frames_per_sec: f64,
    pub avg_poll_latency_us: u64,
    pub max_poll_latency_us: u64,
    pub poll_p95_us: u64,
    pub detections_total: u64,
    pub items_found_total: u64,
    pub feed_reconnects_total: u64,
    pub sonar_read_errors_total: u64,
    pub turns_total: u64,
    pub searches_started_total: u64,
    pub searches_completed_total: u64,
    pub searches_failed_total: u64,
    pub notifications_dropped: u64,
    pub commands_dropped: u64,
}

impl MetricsSummary {
    /// Log the summary as a single structured event
    pub fn log(&self) {
        info!(
            frames = %self.frames_total,
            fps = %format!("{:.1}", self.frames_per_sec),
            avg_poll_us = %self.avg_poll_latency_us,
            max_poll_us = %self.max_poll_latency_us,
            p95_poll_us = %self.poll_p95_us,
            detections = %self.detections_total,
            items_found = %self.items_found_total,
            reconnects = %self.feed_reconnects_total,
            sonar_errors = %self.sonar_read_errors_total,
            turns = %self.turns_total,
            searches = %self.searches_started_total,
            completed = %self.searches_completed_total,
            failed = %self.searches_failed_total,
            notif_dropped = %self.notifications_dropped,
            cmd_dropped = %self.commands_dropped,
            "metrics_report"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(99999), 10);
    }

    #[test]
    fn test_report_resets_interval_counters() {
        let metrics = Metrics::new();
        metrics.record_frame_polled(150);
        metrics.record_frame_polled(250);
        metrics.record_detections(3);
        metrics.record_item_found();

        let report = metrics.report();
        assert_eq!(report.frames_total, 2);
        assert_eq!(report.avg_poll_latency_us, 200);
        assert_eq!(report.max_poll_latency_us, 250);
        assert_eq!(report.detections_total, 3);
        assert_eq!(report.items_found_total, 1);

        // Interval counters reset, monotonic counters persist
        let second = metrics.report();
        assert_eq!(second.frames_total, 2);
        assert_eq!(second.avg_poll_latency_us, 0);
        assert_eq!(second.max_poll_latency_us, 0);
    }

    #[test]
    fn test_atomic_max() {
        let max = AtomicU64::new(0);
        update_atomic_max(&max, 10);
        update_atomic_max(&max, 5);
        update_atomic_max(&max, 20);
        assert_eq!(max.load(Ordering::Relaxed), 20);
    }
}
