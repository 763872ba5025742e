use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lotto_pipeline::api::health::HealthState;
use lotto_pipeline::api::latency::LatencyStats;
use lotto_pipeline::api::routes::{router, ApiState};
use lotto_pipeline::config::Config;
use lotto_pipeline::db::SqliteStore;
use lotto_pipeline::error::Result;
use lotto_pipeline::fetcher;
use lotto_pipeline::sequencer::wait_for_shutdown;
use lotto_pipeline::store::RoundStore;
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
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let store = SqliteStore::connect(&cfg.db_path).await?;
    match store.max_round().await? {
        Some(max) => info!("Database ready at {} (latest stored round {max})", cfg.db_path),
        None => info!("Database ready at {} (empty)", cfg.db_path),
    }

    // --- Upstream source ---
    let fetcher: Arc<dyn fetcher::RoundFetcher> = Arc::from(fetcher::from_config(&cfg)?);
    info!(
        "Round source: {} (delay {}ms, timeout {}s, policy {:?})",
        fetcher.source_name(),
        cfg.delay.as_millis(),
        cfg.fetch_timeout.as_secs(),
        cfg.error_policy,
    );

    // --- Shutdown signal ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {e}");
            return;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let updater = Arc::new(Updater::new(
        Arc::new(store),
        fetcher,
        UpdaterSettings::from_config(&cfg),
        Arc::new(HealthState::new()),
        Arc::new(LatencyStats::new()),
        shutdown_rx.clone(),
    ));

    // Periodic updater (background, optional)
    match cfg.update_interval {
        Some(every) => {
            info!("Periodic update every {}s", every.as_secs());
            let periodic = Arc::clone(&updater);
            tokio::spawn(async move { periodic.run_periodic(every).await });
        }
        None => info!("Periodic update disabled; use GET /api/lotto/update"),
    }

    // HTTP API server
    let app = router(ApiState::new(updater));
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    let mut rx = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { wait_for_shutdown(&mut rx).await })
        .await?;

    info!("Server stopped");
    Ok(())
}
