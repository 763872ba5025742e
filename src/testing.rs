//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::db::SqliteStore;
use crate::error::FetchError;
use crate::fetcher::RoundFetcher;
use crate::types::{draw_date_for_round, LottoRound};

/// A valid round whose numbers depend on the round number.
pub fn round(n: u32) -> LottoRound {
    let base = (n % 39) as u8 + 1;
    let numbers = [base, base + 1, base + 2, base + 3, base + 4, base + 5];
    LottoRound::new(n, draw_date_for_round(n).unwrap(), numbers, base + 6)
        .unwrap()
        .with_prizes(100_000_000_000, 2_000_000_000, 10, 20_000_000_000)
}

/// Migrated SQLite store on a single in-memory connection; every new
/// in-memory connection would be a fresh database.
pub async fn memory_store() -> SqliteStore {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    SqliteStore::migrate(&pool).await.unwrap();
    SqliteStore::new(pool)
}

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Found,
    NotAvailable,
    NetworkDown,
    Garbled,
}

/// Fetcher answering from a script; unscripted rounds are "not available".
/// Records every round it was asked for.
#[derive(Default)]
pub struct ScriptedFetcher {
    replies: HashMap<u32, Reply>,
    pub calls: Mutex<Vec<u32>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rounds in `range` answer with data.
    pub fn found(mut self, range: impl IntoIterator<Item = u32>) -> Self {
        for r in range {
            self.replies.insert(r, Reply::Found);
        }
        self
    }

    pub fn reply(mut self, round: u32, reply: Reply) -> Self {
        self.replies.insert(round, reply);
        self
    }

    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoundFetcher for ScriptedFetcher {
    async fn fetch_round(&self, n: u32) -> Result<Option<LottoRound>, FetchError> {
        self.calls.lock().unwrap().push(n);
        match self.replies.get(&n).copied().unwrap_or(Reply::NotAvailable) {
            Reply::Found => Ok(Some(round(n))),
            Reply::NotAvailable => Ok(None),
            Reply::NetworkDown => Err(FetchError::Status(503)),
            Reply::Garbled => Err(FetchError::Parse(format!("round {n}: garbled"))),
        }
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}
