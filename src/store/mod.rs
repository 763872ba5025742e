pub mod file_store;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::LottoRound;

pub use file_store::FileStore;

/// Durable, idempotent storage of rounds keyed by round number.
///
/// Upserting a round that is already stored is a no-op: history is immutable,
/// so the stored copy wins.
#[async_trait]
pub trait RoundStore: Send + Sync {
    /// Highest stored round, None for an empty store.
    async fn max_round(&self) -> Result<Option<u32>>;

    /// Returns true when the round was newly stored.
    async fn upsert(&self, round: &LottoRound) -> Result<bool>;

    /// Returns the number of newly stored rounds.
    async fn upsert_many(&self, rounds: &[LottoRound]) -> Result<usize> {
        let mut inserted = 0;
        for round in rounds {
            if self.upsert(round).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// All stored round numbers, ascending.
    async fn stored_rounds(&self) -> Result<Vec<u32>>;

    async fn get(&self, round: u32) -> Result<Option<LottoRound>>;

    /// Newest first.
    async fn latest(&self, limit: u32) -> Result<Vec<LottoRound>>;
}
