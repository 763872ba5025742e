//! Shared health state for the /health endpoint.
//! Updated by the Updater, read by the API.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// True while an update batch holds the single-flight guard.
    pub update_in_progress: AtomicBool,
    /// Nanosecond timestamp of the last finished update (0 = none).
    pub last_update_at_ns: AtomicU64,
    /// Highest round persisted by this process (0 = none).
    pub last_processed_round: AtomicU64,
    /// Updates that finished with status "error" since the last good one.
    pub consecutive_failures: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_update_in_progress(&self, v: bool) {
        self.update_in_progress.store(v, Ordering::Relaxed);
    }

    pub fn record_update(&self, at_ns: u64, ok: bool) {
        self.last_update_at_ns.store(at_ns, Ordering::Relaxed);
        if ok {
            self.consecutive_failures.store(0, Ordering::Relaxed);
        } else {
            self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_last_processed_round(&self, round: u32) {
        self.last_processed_round
            .fetch_max(u64::from(round), Ordering::Relaxed);
    }

    pub fn update_in_progress(&self) -> bool {
        self.update_in_progress.load(Ordering::Relaxed)
    }

    pub fn last_update_at_ns(&self) -> u64 {
        self.last_update_at_ns.load(Ordering::Relaxed)
    }

    pub fn last_processed_round(&self) -> u64 {
        self.last_processed_round.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}
