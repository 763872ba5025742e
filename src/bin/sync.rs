//! Batch reconciliation of the flat-file round history.
//!
//! Fetches every round missing from `LOTTO_DATA_FILE` up to `LOTTO_MAX_ROUND`
//! (default: the latest round drawn as of today), skipping rounds that fail
//! and saving every `LOTTO_SAVE_EVERY` fetched rounds. Safe to re-run.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lotto_pipeline::api::health::HealthState;
use lotto_pipeline::api::latency::LatencyStats;
use lotto_pipeline::config::Config;
use lotto_pipeline::error::Result;
use lotto_pipeline::fetcher;
use lotto_pipeline::store::FileStore;
use lotto_pipeline::types::latest_round_on;
use lotto_pipeline::updater::{Updater, UpdaterSettings};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Sync failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let ceiling = cfg
        .max_round
        .unwrap_or_else(|| latest_round_on(chrono::Local::now().date_naive()));
    let store = FileStore::new(cfg.data_file.clone());
    println!("Data file: {}", store.path().display());
    println!("Target: rounds 1..={ceiling}");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, finishing current chunk");
            let _ = shutdown_tx.send(true);
        }
    });

    let fetcher: Arc<dyn fetcher::RoundFetcher> = Arc::from(fetcher::from_config(&cfg)?);
    let updater = Updater::new(
        Arc::new(store),
        fetcher,
        UpdaterSettings::from_config(&cfg),
        Arc::new(HealthState::new()),
        Arc::new(LatencyStats::new()),
        shutdown_rx,
    );

    let report = updater
        .backfill(ceiling, cfg.save_every, |line| println!("{line}"))
        .await?;

    println!(
        "Done: {} missing, {} fetched, {} new rounds saved",
        report.missing, report.fetched, report.inserted
    );
    if !report.failed.is_empty() {
        println!(
            "{} rounds failed and will be retried next run: {:?}",
            report.failed.len(),
            report.failed
        );
    }
    Ok(())
}
