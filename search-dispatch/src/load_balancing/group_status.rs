use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::*;

const DEFAULT_DECAY_RATE: u64 = 1000;
const MIN_DECAY_RATE: u64 = 42;
const INITIAL_SEARCH_TIME: f64 = 0.001;
const MIN_SEARCH_TIME: f64 = 0.001;
const MIN_SUCCESS_WEIGHT: f64 = 0.05;

/// Adaptive statistics of a group, in seconds where applicable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupStats {
    /// Number of successful queries.
    pub queries: u64,
    /// Number of failed or refused attempts.
    pub failures: u64,
    /// Decayed average search time of successful queries.
    pub average_search_time: f64,
    /// Decayed ratio of successful outcomes, in [0, 1].
    pub success_rate: f64,
}

impl Default for GroupStats {
    fn default() -> Self {
        GroupStats {
            queries: 0,
            failures: 0,
            average_search_time: INITIAL_SEARCH_TIME,
            success_rate: 1.0,
        }
    }
}

impl GroupStats {
    /// Selection weight: fast and reliable groups weigh more. The success rate is floored, so a
    /// struggling group still gets an occasional query and a chance to recover.
    pub fn weight(&self) -> f64 {
        self.success_rate.max(MIN_SUCCESS_WEIGHT) / self.average_search_time
    }

    fn record(&mut self, success: bool, search_time: Duration) {
        let samples = self.queries + self.failures;
        let outcome_decay = decay_rate(samples);
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate = (outcome + (outcome_decay - 1.0) * self.success_rate) / outcome_decay;

        if success {
            let search_time = search_time.as_secs_f64().max(MIN_SEARCH_TIME);
            let time_decay = decay_rate(self.queries);
            self.average_search_time =
                (search_time + (time_decay - 1.0) * self.average_search_time) / time_decay;
            self.queries += 1;
        } else {
            self.failures += 1;
        }
    }
}

// Young statistics adapt quickly, mature ones change slowly.
fn decay_rate(samples: u64) -> f64 {
    (samples + MIN_DECAY_RATE).min(DEFAULT_DECAY_RATE) as f64
}

/// Load balancer bookkeeping for one group.
#[derive(Debug)]
pub struct GroupStatus {
    group_id: u32,
    allocations: AtomicUsize,
    last_taken: AtomicU64,
    stats: Mutex<GroupStats>,
}

impl GroupStatus {
    pub fn new(group_id: u32) -> Self {
        GroupStatus {
            group_id,
            allocations: AtomicUsize::new(0),
            last_taken: AtomicU64::new(0),
            stats: Mutex::new(GroupStats::default()),
        }
    }

    #[inline]
    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    /// Number of queries currently holding this group.
    #[inline]
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Sequence number of the last time this group was taken; 0 means never.
    #[inline]
    pub fn last_taken(&self) -> u64 {
        self.last_taken.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn stats(&self) -> GroupStats {
        *self.stats.lock()
    }

    pub(crate) fn allocate(&self, sequence: u64) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.last_taken.store(sequence, Ordering::Relaxed);
    }

    pub(crate) fn release(&self, success: bool, search_time: Duration) {
        let previous = self
            .allocations
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |allocations| {
                Some(allocations.saturating_sub(1))
            });

        if previous == Ok(0) {
            warn!(group = self.group_id, "Double release of query target group detected.");
        }

        self.stats.lock().record(success, search_time);
    }
}
