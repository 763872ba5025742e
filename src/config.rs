use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::types::ErrorPolicy;

pub const LOTTO_API_URL: &str = "https://www.dhlottery.co.kr/common.do?method=getLottoNumber";
pub const LOTTO_HTML_URL: &str = "https://www.dhlottery.co.kr/gameResult.do?method=byWin";

/// Upstream blocks obvious bots, so requests look like a desktop browser.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Round 1 was drawn on 2002-12-07; one round per week after that.
pub const EPOCH_YEAR: i32 = 2002;
pub const EPOCH_MONTH: u32 = 12;
pub const EPOCH_DAY: u32 = 7;

/// Batch size used by the update trigger when the caller gives none.
pub const DEFAULT_UPDATE_COUNT: u32 = 5;

/// Hard cap on one update batch, regardless of the `count` parameter.
pub const MAX_UPDATE_COUNT: u32 = 50;

/// Default and maximum page size for `/api/lotto/rounds`.
pub const DEFAULT_LIST_LIMIT: u32 = 10;
pub const MAX_LIST_LIMIT: u32 = 100;

/// CSS selectors for the HTML result page.
pub mod html_selectors {
    pub const ROUND_HEADING: &str = "div.win_result h4 strong";
    pub const BALL: &str = "span.ball_645";
    pub const PRIZE_ROWS: &str = "table.tbl_data tbody tr";
    pub const CELL: &str = "td";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Structured JSON endpoint keyed by round number.
    Api,
    /// Result page scraped for the winning numbers and first-prize row.
    Html,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub source: SourceKind,
    pub api_url: String,
    pub html_url: String,
    /// Pause between two upstream requests (LOTTO_DELAY_MS)
    pub delay: Duration,
    /// Per-request timeout (LOTTO_FETCH_TIMEOUT_SECS)
    pub fetch_timeout: Duration,
    /// Default batch size for the update trigger (LOTTO_UPDATE_COUNT)
    pub update_count: u32,
    /// Wall-clock budget for one update run (LOTTO_MAX_DURATION_SECS)
    pub max_duration: Duration,
    /// Periodic trigger interval, None when disabled (LOTTO_UPDATE_INTERVAL_SECS=0)
    pub update_interval: Option<Duration>,
    /// What a live update does on a transient fetch failure (LOTTO_ERROR_POLICY)
    pub error_policy: ErrorPolicy,
    /// Flat-file store used by the batch script (LOTTO_DATA_FILE)
    pub data_file: PathBuf,
    /// Highest round the batch script will try (LOTTO_MAX_ROUND). None means
    /// "latest round drawn as of today".
    pub max_round: Option<u32>,
    /// Batch script flushes to disk after this many fetched rounds (LOTTO_SAVE_EVERY)
    pub save_every: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let source = match env_or("LOTTO_SOURCE", "api").to_lowercase().as_str() {
            "api" | "json" => SourceKind::Api,
            "html" => SourceKind::Html,
            other => {
                return Err(AppError::Config(format!(
                    "LOTTO_SOURCE must be 'api' or 'html', got '{other}'"
                )))
            }
        };

        let error_policy = match env_or("LOTTO_ERROR_POLICY", "abort").to_lowercase().as_str() {
            "abort" => ErrorPolicy::Abort,
            "skip" => ErrorPolicy::Skip,
            other => {
                return Err(AppError::Config(format!(
                    "LOTTO_ERROR_POLICY must be 'abort' or 'skip', got '{other}'"
                )))
            }
        };

        let interval_secs: u64 = parse_env("LOTTO_UPDATE_INTERVAL_SECS", 0)?;
        let max_round = match std::env::var("LOTTO_MAX_ROUND") {
            Ok(v) if !v.trim().is_empty() => Some(v.trim().parse::<u32>().map_err(|_| {
                AppError::Config("LOTTO_MAX_ROUND must be a positive integer".to_string())
            })?),
            _ => None,
        };

        Ok(Self {
            log_level: env_or("LOG_LEVEL", "info"),
            db_path: env_or("DB_PATH", "lotto.db"),
            api_port: parse_env("API_PORT", 3000)?,
            source,
            api_url: env_or("LOTTO_API_URL", LOTTO_API_URL),
            html_url: env_or("LOTTO_HTML_URL", LOTTO_HTML_URL),
            delay: Duration::from_millis(parse_env("LOTTO_DELAY_MS", 1000)?),
            fetch_timeout: Duration::from_secs(parse_env("LOTTO_FETCH_TIMEOUT_SECS", 10)?),
            update_count: parse_env("LOTTO_UPDATE_COUNT", DEFAULT_UPDATE_COUNT)?,
            max_duration: Duration::from_secs(parse_env("LOTTO_MAX_DURATION_SECS", 60)?),
            update_interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            error_policy,
            data_file: PathBuf::from(env_or("LOTTO_DATA_FILE", "data/lotto.json")),
            max_round,
            save_every: parse_env::<usize>("LOTTO_SAVE_EVERY", 10)?.max(1),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: '{raw}'"))),
        _ => Ok(default),
    }
}
