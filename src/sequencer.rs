use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::api::latency::LatencyStats;
use crate::fetcher::RoundFetcher;
use crate::types::{ErrorPolicy, SequenceOutcome, StopReason};

/// Walks a fetcher over ascending round numbers, one request at a time, with a
/// fixed pause between requests.
///
/// Rounds are drawn strictly in order, so the first "not available" answer ends
/// the walk: nothing after it can exist yet.
pub struct Sequencer {
    delay: Duration,
    policy: ErrorPolicy,
    shutdown: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
    latency: Option<Arc<LatencyStats>>,
}

impl Sequencer {
    pub fn new(delay: Duration, policy: ErrorPolicy) -> Self {
        Self {
            delay,
            policy,
            shutdown: None,
            deadline: None,
            latency: None,
        }
    }

    /// Stop between rounds once the channel holds `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_latency(mut self, latency: Arc<LatencyStats>) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Rounds `start .. start + max_count`.
    pub async fn run(
        &self,
        fetcher: &dyn RoundFetcher,
        start: u32,
        max_count: u32,
    ) -> SequenceOutcome {
        let end = start.saturating_add(max_count);
        self.run_rounds(fetcher, start..end).await
    }

    /// An explicit ascending list of rounds, e.g. the holes in a sparse history.
    pub async fn run_rounds<I>(&self, fetcher: &dyn RoundFetcher, rounds: I) -> SequenceOutcome
    where
        I: IntoIterator<Item = u32>,
        I::IntoIter: Send,
    {
        let mut outcome = SequenceOutcome {
            rounds: Vec::new(),
            failed: Vec::new(),
            last_attempted: None,
            stop: StopReason::Exhausted,
        };

        for (i, round) in rounds.into_iter().enumerate() {
            if i > 0 && !self.pause().await {
                outcome.stop = StopReason::Cancelled;
                break;
            }
            if self.is_cancelled() {
                outcome.stop = StopReason::Cancelled;
                break;
            }
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                outcome.stop = StopReason::DeadlineReached;
                break;
            }

            outcome.last_attempted = Some(round);
            let started = Instant::now();
            let result = fetcher.fetch_round(round).await;
            if let Some(latency) = &self.latency {
                latency.record(started.elapsed());
            }

            match result {
                Ok(Some(record)) => {
                    debug!(round, source = fetcher.source_name(), "Round fetched");
                    outcome.rounds.push(record);
                }
                Ok(None) => {
                    info!(round, source = fetcher.source_name(), "Round not drawn yet, stopping");
                    outcome.stop = StopReason::NotAvailable(round);
                    break;
                }
                Err(error) => {
                    warn!(
                        round,
                        source = fetcher.source_name(),
                        kind = error.kind(),
                        "Fetch failed for round {round}: {error}"
                    );
                    match self.policy {
                        ErrorPolicy::Skip => outcome.failed.push(round),
                        ErrorPolicy::Abort => {
                            outcome.stop = StopReason::Aborted { round, error };
                            break;
                        }
                    }
                }
            }
        }

        outcome
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Sleep for the configured delay. Returns false if shutdown fired first.
    pub async fn pause(&self) -> bool {
        let Some(rx) = &self.shutdown else {
            sleep(self.delay).await;
            return true;
        };
        let mut rx = rx.clone();
        tokio::select! {
            _ = sleep(self.delay) => true,
            _ = wait_for_shutdown(&mut rx) => false,
        }
    }
}

/// Resolves once the flag turns true. Pends forever if the sender is gone.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
