//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention between
//! lanes. Counters are monotonic; `report()` takes a snapshot without
//! resetting anything so the Prometheus endpoint and the log reporter can
//! both read it.
//!
//! NOTE: All atomics use Relaxed ordering intentionally: these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::types::{EpisodeOutcome, LaneId, LaneState};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Authorization round-trip bucket boundaries (milliseconds)
/// Buckets: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, >12800
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800];
pub const METRICS_NUM_BUCKETS: usize = 11;

const NUM_OUTCOMES: usize = EpisodeOutcome::ALL.len();

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
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

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile).ceil() as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector shared by all lanes
pub struct Metrics {
    /// Credential reads received from any reader
    reads_total: AtomicU64,
    /// Reads suppressed by the debounce rule
    reads_debounced: AtomicU64,
    /// Reads dropped because the lane was mid-episode
    reads_discarded_busy: AtomicU64,
    /// Completed episodes per outcome
    episodes: [AtomicU64; NUM_OUTCOMES],
    /// Authorization requests attempted (after the connectivity preflight)
    auth_requests: AtomicU64,
    auth_latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    auth_latency_sum_ms: AtomicU64,
    auth_latency_max_ms: AtomicU64,
    poll_attempts: AtomicU64,
    poll_failures: AtomicU64,
    barrier_opens: AtomicU64,
    barrier_closes: AtomicU64,
    barrier_command_failures: AtomicU64,
    /// Vehicle entries seen during passage watches
    vehicles_detected: AtomicU64,
    display_updates_dropped: AtomicU64,
    /// Current state per lane (small, written on transitions only)
    lane_states: parking_lot::RwLock<Vec<(LaneId, LaneState)>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            reads_total: AtomicU64::new(0),
            reads_debounced: AtomicU64::new(0),
            reads_discarded_busy: AtomicU64::new(0),
            episodes: std::array::from_fn(|_| AtomicU64::new(0)),
            auth_requests: AtomicU64::new(0),
            auth_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            auth_latency_sum_ms: AtomicU64::new(0),
            auth_latency_max_ms: AtomicU64::new(0),
            poll_attempts: AtomicU64::new(0),
            poll_failures: AtomicU64::new(0),
            barrier_opens: AtomicU64::new(0),
            barrier_closes: AtomicU64::new(0),
            barrier_command_failures: AtomicU64::new(0),
            vehicles_detected: AtomicU64::new(0),
            display_updates_dropped: AtomicU64::new(0),
            lane_states: parking_lot::RwLock::new(Vec::new()),
        }
    }

    /// Register lanes so the state gauge reports them from startup
    pub fn set_lanes(&self, lanes: &[LaneId]) {
        let mut states = self.lane_states.write();
        states.clear();
        states.extend(lanes.iter().map(|&lane| (lane, LaneState::Idle)));
    }

    pub fn set_lane_state(&self, lane: LaneId, state: LaneState) {
        let mut states = self.lane_states.write();
        match states.iter_mut().find(|(id, _)| *id == lane) {
            Some(entry) => entry.1 = state,
            None => states.push((lane, state)),
        }
    }

    pub fn lane_states(&self) -> Vec<(LaneId, LaneState)> {
        self.lane_states.read().clone()
    }

    #[inline]
    pub fn record_read(&self) {
        self.reads_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_read_debounced(&self) {
        self.reads_debounced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_read_discarded_busy(&self) {
        self.reads_discarded_busy.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_episode(&self, outcome: EpisodeOutcome) {
        self.episodes[outcome.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Record an authorization round trip (lock-free)
    #[inline]
    pub fn record_auth_latency(&self, latency_ms: u64) {
        self.auth_requests.fetch_add(1, Ordering::Relaxed);
        self.auth_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.auth_latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.auth_latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_poll_attempt(&self, failed: bool) {
        self.poll_attempts.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.poll_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_barrier_open(&self) {
        self.barrier_opens.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_barrier_close(&self) {
        self.barrier_closes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_barrier_command_failure(&self) {
        self.barrier_command_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_vehicle_detected(&self) {
        self.vehicles_detected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_display_update_dropped(&self) {
        self.display_updates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn episodes(&self, outcome: EpisodeOutcome) -> u64 {
        self.episodes[outcome.index()].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn poll_attempts(&self) -> u64 {
        self.poll_attempts.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn barrier_opens(&self) -> u64 {
        self.barrier_opens.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn barrier_closes(&self) -> u64 {
        self.barrier_closes.load(Ordering::Relaxed)
    }

    /// Take a snapshot of all counters
    pub fn report(&self) -> MetricsSummary {
        let auth_buckets = load_buckets(&self.auth_latency_buckets);
        let auth_requests = self.auth_requests.load(Ordering::Relaxed);
        let auth_sum = self.auth_latency_sum_ms.load(Ordering::Relaxed);

        let mut episodes = [0u64; NUM_OUTCOMES];
        for (i, counter) in self.episodes.iter().enumerate() {
            episodes[i] = counter.load(Ordering::Relaxed);
        }

        MetricsSummary {
            reads_total: self.reads_total.load(Ordering::Relaxed),
            reads_debounced: self.reads_debounced.load(Ordering::Relaxed),
            reads_discarded_busy: self.reads_discarded_busy.load(Ordering::Relaxed),
            episodes,
            auth_requests,
            auth_latency_buckets: auth_buckets,
            auth_latency_avg_ms: if auth_requests > 0 { auth_sum / auth_requests } else { 0 },
            auth_latency_max_ms: self.auth_latency_max_ms.load(Ordering::Relaxed),
            auth_latency_p99_ms: percentile_from_buckets(&auth_buckets, 0.99),
            poll_attempts: self.poll_attempts.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            barrier_opens: self.barrier_opens.load(Ordering::Relaxed),
            barrier_closes: self.barrier_closes.load(Ordering::Relaxed),
            barrier_command_failures: self.barrier_command_failures.load(Ordering::Relaxed),
            vehicles_detected: self.vehicles_detected.load(Ordering::Relaxed),
            display_updates_dropped: self.display_updates_dropped.load(Ordering::Relaxed),
            lane_states: self.lane_states(),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub reads_total: u64,
    pub reads_debounced: u64,
    pub reads_discarded_busy: u64,
    /// Indexed by `EpisodeOutcome::index()`
    pub episodes: [u64; NUM_OUTCOMES],
    pub auth_requests: u64,
    pub auth_latency_buckets: [u64; METRICS_NUM_BUCKETS],
    pub auth_latency_avg_ms: u64,
    pub auth_latency_max_ms: u64,
    pub auth_latency_p99_ms: u64,
    pub poll_attempts: u64,
    pub poll_failures: u64,
    pub barrier_opens: u64,
    pub barrier_closes: u64,
    pub barrier_command_failures: u64,
    pub vehicles_detected: u64,
    pub display_updates_dropped: u64,
    pub lane_states: Vec<(LaneId, LaneState)>,
}

impl MetricsSummary {
    pub fn episodes_total(&self) -> u64 {
        self.episodes.iter().sum()
    }

    pub fn log(&self) {
        info!(
            reads = %self.reads_total,
            debounced = %self.reads_debounced,
            discarded_busy = %self.reads_discarded_busy,
            episodes = %self.episodes_total(),
            passed = %self.episodes[EpisodeOutcome::Passed.index()],
            passage_timeouts = %self.episodes[EpisodeOutcome::PassageTimedOut.index()],
            denied = %self.episodes[EpisodeOutcome::Denied.index()],
            auth_avg_ms = %self.auth_latency_avg_ms,
            auth_p99_ms = %self.auth_latency_p99_ms,
            poll_attempts = %self.poll_attempts,
            poll_failures = %self.poll_failures,
            barrier_failures = %self.barrier_command_failures,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        let summary = metrics.report();
        assert_eq!(summary.reads_total, 0);
        assert_eq!(summary.episodes_total(), 0);
        assert_eq!(summary.auth_latency_p99_ms, 0);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(25), 0);
        assert_eq!(bucket_index(26), 1);
        assert_eq!(bucket_index(5000), 9);
        assert_eq!(bucket_index(20_000), 10);
    }

    #[test]
    fn test_record_auth_latency() {
        let metrics = Metrics::new();
        metrics.record_auth_latency(40);
        metrics.record_auth_latency(120);

        let summary = metrics.report();
        assert_eq!(summary.auth_requests, 2);
        assert_eq!(summary.auth_latency_avg_ms, 80);
        assert_eq!(summary.auth_latency_max_ms, 120);
        assert_eq!(summary.auth_latency_buckets[1], 1);
        assert_eq!(summary.auth_latency_buckets[3], 1);
        assert_eq!(summary.auth_latency_p99_ms, 200);
    }

    #[test]
    fn test_episode_counters() {
        let metrics = Metrics::new();
        metrics.record_episode(EpisodeOutcome::Passed);
        metrics.record_episode(EpisodeOutcome::Passed);
        metrics.record_episode(EpisodeOutcome::Denied);

        assert_eq!(metrics.episodes(EpisodeOutcome::Passed), 2);
        assert_eq!(metrics.episodes(EpisodeOutcome::Denied), 1);
        assert_eq!(metrics.report().episodes_total(), 3);
    }

    #[test]
    fn test_lane_state_gauge() {
        let metrics = Metrics::new();
        metrics.set_lanes(&[LaneId(1), LaneId(2)]);
        metrics.set_lane_state(LaneId(2), LaneState::AwaitingPayment);

        let states = metrics.lane_states();
        assert_eq!(states, vec![(LaneId(1), LaneState::Idle), (LaneId(2), LaneState::AwaitingPayment)]);
    }

    #[test]
    fn test_poll_attempts_count_failures() {
        let metrics = Metrics::new();
        metrics.record_poll_attempt(false);
        metrics.record_poll_attempt(true);
        let summary = metrics.report();
        assert_eq!(summary.poll_attempts, 2);
        assert_eq!(summary.poll_failures, 1);
    }
}
