use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{watch, Mutex};
use tokio::time::{interval, Instant};
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::{Config, MAX_UPDATE_COUNT};
use crate::error::Result;
use crate::fetcher::RoundFetcher;
use crate::sequencer::{wait_for_shutdown, Sequencer};
use crate::store::RoundStore;
use crate::types::{
    BackfillReport, ErrorPolicy, SequenceOutcome, StopReason, UpdateReport, UpdateRequest,
    UpdateStatus,
};

#[derive(Debug, Clone)]
pub struct UpdaterSettings {
    pub delay: Duration,
    pub default_count: u32,
    /// Policy for live updates. Back-fill always skips.
    pub error_policy: ErrorPolicy,
    /// Time budget for one `run_update`, None for unbounded.
    pub max_duration: Option<Duration>,
}

impl UpdaterSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            delay: cfg.delay,
            default_count: cfg.update_count,
            error_policy: cfg.error_policy,
            max_duration: Some(cfg.max_duration),
        }
    }
}

/// Resumes the round history from wherever the store left off.
///
/// Every run re-derives its starting point from the store, so a run that
/// failed halfway is repaired by simply running again.
pub struct Updater {
    store: Arc<dyn RoundStore>,
    fetcher: Arc<dyn RoundFetcher>,
    settings: UpdaterSettings,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
    shutdown: watch::Receiver<bool>,
    /// Single-flight guard: overlapping triggers queue up instead of racing.
    running: Mutex<()>,
}

impl Updater {
    pub fn new(
        store: Arc<dyn RoundStore>,
        fetcher: Arc<dyn RoundFetcher>,
        settings: UpdaterSettings,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            fetcher,
            settings,
            health,
            latency,
            shutdown,
            running: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn RoundStore> {
        &self.store
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    pub fn latency(&self) -> &Arc<LatencyStats> {
        &self.latency
    }

    /// Periodic trigger. Runs until shutdown.
    pub async fn run_periodic(self: Arc<Self>, every: Duration) {
        let mut ticker = interval(every);
        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Periodic lotto update stopped");
                    return;
                }
            }
            let report = self.run_update(UpdateRequest::default()).await;
            if report.status == UpdateStatus::Error {
                error!(
                    "Periodic lotto update failed: {}",
                    report.message.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    /// One bounded incremental batch. Never fails: errors are folded into the
    /// report so the HTTP trigger can always answer with JSON.
    pub async fn run_update(&self, req: UpdateRequest) -> UpdateReport {
        let _guard = self.running.lock().await;
        self.health.set_update_in_progress(true);

        let report = self.update_locked(req).await;

        self.health.set_update_in_progress(false);
        self.health
            .record_update(now_ns(), report.status != UpdateStatus::Error);
        if let Some(last) = report.last_processed_round {
            self.health.set_last_processed_round(last);
        }
        info!(
            status = %report.status,
            processed = report.processed.unwrap_or(0),
            inserted = report.inserted.unwrap_or(0),
            next_round = report.next_round.unwrap_or(0),
            "Lotto update finished: {}",
            report.status,
        );
        report
    }

    async fn update_locked(&self, req: UpdateRequest) -> UpdateReport {
        let start_round = match req.start {
            Some(start) => start.max(1),
            None => match self.store.max_round().await {
                Ok(max) => max.map_or(1, |m| m.saturating_add(1)),
                Err(e) => {
                    error!("Could not read stored frontier: {e}");
                    return UpdateReport::error(format!("store unavailable: {e}"));
                }
            },
        };
        let count = req
            .count
            .unwrap_or(self.settings.default_count)
            .clamp(1, MAX_UPDATE_COUNT);

        info!(start_round, count, source = self.fetcher.source_name(), "Lotto update starting");

        let mut sequencer = Sequencer::new(self.settings.delay, self.settings.error_policy)
            .with_shutdown(self.shutdown.clone())
            .with_latency(Arc::clone(&self.latency));
        if let Some(budget) = self.settings.max_duration {
            sequencer = sequencer.with_deadline(Instant::now() + budget);
        }
        let outcome = sequencer.run(self.fetcher.as_ref(), start_round, count).await;

        self.persist(start_round, outcome).await
    }

    /// Hand every fetched round to the store, in order, and build a report that
    /// only counts what actually reached it.
    async fn persist(&self, start_round: u32, outcome: SequenceOutcome) -> UpdateReport {
        let SequenceOutcome { rounds, failed, stop, .. } = outcome;

        let mut processed = 0u32;
        let mut inserted = 0u32;
        let mut last_processed = None;
        let mut store_error = None;

        for record in &rounds {
            match self.store.upsert(record).await {
                Ok(new) => {
                    processed += 1;
                    if new {
                        inserted += 1;
                    }
                    last_processed = Some(record.round());
                }
                Err(e) => {
                    error!(round = record.round(), "Failed to persist round: {e}");
                    store_error = Some(format!("failed to persist round {}: {e}", record.round()));
                    break;
                }
            }
        }

        let abort_message = match &stop {
            StopReason::Aborted { round, error } => {
                Some(format!("batch aborted at round {round}: {error}"))
            }
            StopReason::Cancelled => Some("update cancelled by shutdown".to_string()),
            StopReason::DeadlineReached => Some("update stopped at time budget".to_string()),
            StopReason::Exhausted | StopReason::NotAvailable(_) => None,
        };
        let skip_message = (!failed.is_empty())
            .then(|| format!("skipped rounds after fetch errors: {failed:?}"));
        let fetch_failed =
            matches!(stop, StopReason::Aborted { .. }) || !failed.is_empty();

        // "done" means the source had nothing new, not that every fetch failed.
        let status = if store_error.is_some() || (fetch_failed && processed == 0) {
            UpdateStatus::Error
        } else if processed > 0 {
            UpdateStatus::Success
        } else {
            UpdateStatus::Done
        };

        UpdateReport {
            status,
            processed: Some(processed),
            inserted: Some(inserted),
            failed: (!failed.is_empty()).then_some(failed.len() as u32),
            last_processed_round: last_processed,
            next_round: Some(last_processed.map_or(start_round, |r| r.saturating_add(1))),
            message: store_error.or(abort_message).or(skip_message),
        }
    }

    /// Fill every hole in `[1, ceiling]`, skipping rounds that fail and saving
    /// after each `save_every` fetched rounds. Progress goes to `progress`.
    pub async fn backfill(
        &self,
        ceiling: u32,
        save_every: usize,
        mut progress: impl FnMut(&str) + Send,
    ) -> Result<BackfillReport> {
        let _guard = self.running.lock().await;

        let stored: HashSet<u32> = self.store.stored_rounds().await?.into_iter().collect();
        let missing: Vec<u32> = (1..=ceiling).filter(|r| !stored.contains(r)).collect();

        let mut report = BackfillReport {
            missing: missing.len(),
            ..BackfillReport::default()
        };
        progress(&format!(
            "{} rounds stored, {} missing up to round {ceiling}",
            stored.len(),
            missing.len()
        ));
        if missing.is_empty() {
            return Ok(report);
        }

        let sequencer = Sequencer::new(self.settings.delay, ErrorPolicy::Skip)
            .with_shutdown(self.shutdown.clone())
            .with_latency(Arc::clone(&self.latency));

        let chunk_size = save_every.max(1);
        for (i, chunk) in missing.chunks(chunk_size).enumerate() {
            if i > 0 && !sequencer.pause().await {
                warn!("Back-fill interrupted");
                progress("interrupted, progress so far is saved");
                break;
            }
            let outcome = sequencer.run_rounds(self.fetcher.as_ref(), chunk.to_vec()).await;

            let inserted = self.store.upsert_many(&outcome.rounds).await?;
            if let Some(last) = outcome.rounds.iter().map(|r| r.round()).max() {
                self.health.set_last_processed_round(last);
            }
            report.fetched += outcome.rounds.len();
            report.inserted += inserted;
            report.failed.extend(&outcome.failed);
            if outcome.last_attempted.is_some() {
                report.last_attempted = outcome.last_attempted;
            }

            progress(&format!(
                "saved {} new rounds ({} fetched, {} failed so far, last attempted {})",
                report.inserted,
                report.fetched,
                report.failed.len(),
                report.last_attempted.map_or("-".to_string(), |r| r.to_string()),
            ));

            match outcome.stop {
                StopReason::Exhausted => {}
                StopReason::NotAvailable(round) => {
                    progress(&format!("round {round} is not drawn yet, stopping"));
                    break;
                }
                StopReason::Cancelled | StopReason::DeadlineReached => {
                    warn!("Back-fill interrupted");
                    progress("interrupted, progress so far is saved");
                    break;
                }
                StopReason::Aborted { round, error } => {
                    warn!(round, "Back-fill aborted: {error}");
                    break;
                }
            }
        }

        Ok(report)
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
