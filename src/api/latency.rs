//! Upstream fetch latency. The sequencer records one sample per round request;
//! `/stats/latency` reads a millisecond snapshot.

use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

const LOWEST_US: u64 = 1;
/// Slowest trackable request (100 s); longer samples saturate.
const HIGHEST_US: u64 = 100_000_000;
const SIGFIG: u8 = 3;

pub struct LatencyStats {
    /// Microseconds. None only if the histogram could not be allocated, in
    /// which case samples are dropped.
    histogram: Mutex<Option<Histogram<u64>>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySnapshot {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self {
            histogram: Mutex::new(Histogram::new_with_bounds(LOWEST_US, HIGHEST_US, SIGFIG).ok()),
        }
    }

    pub fn record(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX).max(LOWEST_US);
        if let Ok(mut guard) = self.histogram.lock() {
            if let Some(h) = guard.as_mut() {
                h.saturating_record(us);
            }
        }
    }

    pub fn len(&self) -> u64 {
        self.histogram
            .lock()
            .ok()
            .and_then(|g| g.as_ref().map(|h| h.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let Ok(guard) = self.histogram.lock() else {
            return LatencySnapshot::default();
        };
        let Some(h) = guard.as_ref().filter(|h| h.len() > 0) else {
            return LatencySnapshot::default();
        };
        let ms = |q: f64| Some(h.value_at_quantile(q) as f64 / 1000.0);
        LatencySnapshot {
            samples: h.len(),
            p50_ms: ms(0.5),
            p95_ms: ms(0.95),
            p99_ms: ms(0.99),
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_has_no_percentiles() {
        let stats = LatencyStats::new();
        assert!(stats.is_empty());
        assert_eq!(stats.snapshot(), LatencySnapshot::default());
    }

    #[test]
    fn snapshot_reports_milliseconds() {
        let stats = LatencyStats::new();
        for ms in [100u64, 200, 300, 400] {
            stats.record(Duration::from_millis(ms));
        }
        let snap = stats.snapshot();
        assert_eq!(snap.samples, 4);
        let p50 = snap.p50_ms.unwrap();
        assert!((199.0..=201.0).contains(&p50), "p50={p50}");
        assert!(snap.p99_ms.unwrap() >= 399.0);
    }

    #[test]
    fn zero_and_oversized_samples_are_kept() {
        let stats = LatencyStats::new();
        stats.record(Duration::ZERO);
        stats.record(Duration::from_secs(3600));
        assert_eq!(stats.len(), 2);
    }
}
