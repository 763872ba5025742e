use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::store::RoundStore;
use crate::types::LottoRound;

/// Whole-collection JSON file, sorted ascending by `drwNo`.
///
/// Every write loads the file, merges, and replaces it through a temp file and
/// rename, so a crash mid-write leaves the previous version intact.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empty when the file does not exist yet.
    pub async fn load(&self) -> Result<Vec<LottoRound>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }
        let mut rounds: Vec<LottoRound> = serde_json::from_slice(&raw)?;
        rounds.sort_by_key(|r| r.round());
        rounds.dedup_by_key(|r| r.round());
        Ok(rounds)
    }

    async fn save(&self, rounds: &[LottoRound]) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(rounds)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), rounds = rounds.len(), "Saved round file");
        Ok(())
    }
}

#[async_trait]
impl RoundStore for FileStore {
    async fn max_round(&self) -> Result<Option<u32>> {
        Ok(self.load().await?.last().map(|r| r.round()))
    }

    async fn upsert(&self, round: &LottoRound) -> Result<bool> {
        Ok(self.upsert_many(std::slice::from_ref(round)).await? == 1)
    }

    async fn upsert_many(&self, rounds: &[LottoRound]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let mut merged: BTreeMap<u32, LottoRound> =
            self.load().await?.into_iter().map(|r| (r.round(), r)).collect();
        let mut inserted = 0;
        for round in rounds {
            if !merged.contains_key(&round.round()) {
                merged.insert(round.round(), round.clone());
                inserted += 1;
            }
        }

        if inserted > 0 {
            let all: Vec<LottoRound> = merged.into_values().collect();
            self.save(&all).await?;
        }
        Ok(inserted)
    }

    async fn stored_rounds(&self) -> Result<Vec<u32>> {
        Ok(self.load().await?.iter().map(|r| r.round()).collect())
    }

    async fn get(&self, round: u32) -> Result<Option<LottoRound>> {
        Ok(self.load().await?.into_iter().find(|r| r.round() == round))
    }

    async fn latest(&self, limit: u32) -> Result<Vec<LottoRound>> {
        let mut rounds = self.load().await?;
        rounds.reverse();
        rounds.truncate(limit as usize);
        Ok(rounds)
    }
}
