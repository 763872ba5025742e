use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::debug;

use crate::db::models::LottoRoundRow;
use crate::error::{AppError, Result};
use crate::store::RoundStore;
use crate::types::{LottoRound, RoundRecord};

const SELECT_COLUMNS: &str = "SELECT drwNo, drwNoDate, drwtNo1, drwtNo2, drwtNo3, drwtNo4, \
     drwtNo5, drwtNo6, bnusNo, totSellamnt, firstWinamnt, firstPrzwnerCo, firstAccumamnt \
     FROM lotto_rounds";

/// SQLite-backed store. Duplicate rounds are dropped by `INSERT OR IGNORE`
/// against the `drwNo` primary key.
#[derive(Clone)]
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database file and applies migrations.
    pub async fn connect(db_path: &str) -> Result<Self> {
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = sqlx::SqlitePool::connect_with(options).await?;
        Self::migrate(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(pool: &sqlx::SqlitePool) -> Result<()> {
        sqlx::migrate!("./migrations").run(pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }
}

fn to_i64(column: &str, v: u64) -> Result<i64> {
    i64::try_from(v).map_err(|_| AppError::InvalidRound(format!("{column} too large: {v}")))
}

#[async_trait]
impl RoundStore for SqliteStore {
    async fn max_round(&self) -> Result<Option<u32>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(drwNo) FROM lotto_rounds")
            .fetch_one(&self.pool)
            .await?;
        max.map(|m| {
            u32::try_from(m).map_err(|_| AppError::InvalidRound(format!("stored drwNo {m} out of range")))
        })
        .transpose()
    }

    async fn upsert(&self, round: &LottoRound) -> Result<bool> {
        let r = RoundRecord::from(round.clone());
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as i64;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO lotto_rounds (
                drwNo, drwNoDate, drwtNo1, drwtNo2, drwtNo3, drwtNo4, drwtNo5, drwtNo6,
                bnusNo, totSellamnt, firstWinamnt, firstPrzwnerCo, firstAccumamnt, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(i64::from(r.drw_no))
        .bind(&r.drw_no_date)
        .bind(i64::from(r.drwt_no1))
        .bind(i64::from(r.drwt_no2))
        .bind(i64::from(r.drwt_no3))
        .bind(i64::from(r.drwt_no4))
        .bind(i64::from(r.drwt_no5))
        .bind(i64::from(r.drwt_no6))
        .bind(i64::from(r.bnus_no))
        .bind(to_i64("totSellamnt", r.tot_sellamnt)?)
        .bind(to_i64("firstWinamnt", r.first_winamnt)?)
        .bind(to_i64("firstPrzwnerCo", r.first_przwner_co)?)
        .bind(to_i64("firstAccumamnt", r.first_accumamnt)?)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() == 1;
        if !inserted {
            debug!(round = r.drw_no, "Round already stored, insert ignored");
        }
        Ok(inserted)
    }

    async fn stored_rounds(&self) -> Result<Vec<u32>> {
        let rows: Vec<i64> = sqlx::query_scalar("SELECT drwNo FROM lotto_rounds ORDER BY drwNo")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().filter_map(|r| u32::try_from(r).ok()).collect())
    }

    async fn get(&self, round: u32) -> Result<Option<LottoRound>> {
        let row: Option<LottoRoundRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE drwNo = ?"))
                .bind(i64::from(round))
                .fetch_optional(&self.pool)
                .await?;
        row.map(LottoRound::try_from).transpose()
    }

    async fn latest(&self, limit: u32) -> Result<Vec<LottoRound>> {
        let rows: Vec<LottoRoundRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY drwNo DESC LIMIT ?"))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(LottoRound::try_from).collect()
    }
}
