use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::{EPOCH_DAY, EPOCH_MONTH, EPOCH_YEAR};
use crate::error::{AppError, FetchError, Result};

pub const MIN_BALL: u8 = 1;
pub const MAX_BALL: u8 = 45;
pub const DRAWN_NUMBERS: usize = 6;

// ---------------------------------------------------------------------------
// LottoRound
// ---------------------------------------------------------------------------

/// One drawing. Only constructible through [`LottoRound::new`], so every value
/// in memory already satisfies the number invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RoundRecord", into = "RoundRecord")]
pub struct LottoRound {
    round: u32,
    draw_date: NaiveDate,
    numbers: [u8; DRAWN_NUMBERS],
    bonus_number: u8,
    pub total_sales: u64,
    pub first_prize_amount: u64,
    pub first_prize_winner_count: u64,
    pub first_prize_accumulated: u64,
}

impl LottoRound {
    /// Validates and normalizes (sorts) the winning numbers.
    pub fn new(
        round: u32,
        draw_date: NaiveDate,
        numbers: [u8; DRAWN_NUMBERS],
        bonus_number: u8,
    ) -> Result<Self> {
        if round == 0 {
            return Err(AppError::InvalidRound("round must be >= 1".to_string()));
        }
        let mut numbers = numbers;
        numbers.sort_unstable();

        if let Some(n) = numbers.iter().find(|n| !(MIN_BALL..=MAX_BALL).contains(*n)) {
            return Err(AppError::InvalidRound(format!(
                "round {round}: number {n} outside {MIN_BALL}..={MAX_BALL}"
            )));
        }
        if numbers.windows(2).any(|w| w[0] == w[1]) {
            return Err(AppError::InvalidRound(format!(
                "round {round}: duplicate winning numbers {numbers:?}"
            )));
        }
        if !(MIN_BALL..=MAX_BALL).contains(&bonus_number) {
            return Err(AppError::InvalidRound(format!(
                "round {round}: bonus {bonus_number} outside {MIN_BALL}..={MAX_BALL}"
            )));
        }
        if numbers.contains(&bonus_number) {
            return Err(AppError::InvalidRound(format!(
                "round {round}: bonus {bonus_number} repeats a winning number"
            )));
        }

        Ok(Self {
            round,
            draw_date,
            numbers,
            bonus_number,
            total_sales: 0,
            first_prize_amount: 0,
            first_prize_winner_count: 0,
            first_prize_accumulated: 0,
        })
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn draw_date(&self) -> NaiveDate {
        self.draw_date
    }

    pub fn numbers(&self) -> &[u8; DRAWN_NUMBERS] {
        &self.numbers
    }

    pub fn bonus_number(&self) -> u8 {
        self.bonus_number
    }

    pub fn with_prizes(
        mut self,
        total_sales: u64,
        first_prize_amount: u64,
        first_prize_winner_count: u64,
        first_prize_accumulated: u64,
    ) -> Self {
        self.total_sales = total_sales;
        self.first_prize_amount = first_prize_amount;
        self.first_prize_winner_count = first_prize_winner_count;
        self.first_prize_accumulated = first_prize_accumulated;
        self
    }
}

/// The upstream JSON shape. Also the flat-file layout and the column names of
/// the relational table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    #[serde(rename = "drwNo")]
    pub drw_no: u32,
    #[serde(rename = "drwNoDate")]
    pub drw_no_date: String,
    #[serde(rename = "drwtNo1")]
    pub drwt_no1: u8,
    #[serde(rename = "drwtNo2")]
    pub drwt_no2: u8,
    #[serde(rename = "drwtNo3")]
    pub drwt_no3: u8,
    #[serde(rename = "drwtNo4")]
    pub drwt_no4: u8,
    #[serde(rename = "drwtNo5")]
    pub drwt_no5: u8,
    #[serde(rename = "drwtNo6")]
    pub drwt_no6: u8,
    #[serde(rename = "bnusNo")]
    pub bnus_no: u8,
    #[serde(rename = "totSellamnt", default)]
    pub tot_sellamnt: u64,
    #[serde(rename = "firstWinamnt", default)]
    pub first_winamnt: u64,
    #[serde(rename = "firstPrzwnerCo", default)]
    pub first_przwner_co: u64,
    #[serde(rename = "firstAccumamnt", default)]
    pub first_accumamnt: u64,
}

pub const DATE_FORMAT: &str = "%Y-%m-%d";

impl TryFrom<RoundRecord> for LottoRound {
    type Error = AppError;

    fn try_from(r: RoundRecord) -> Result<Self> {
        let draw_date = NaiveDate::parse_from_str(&r.drw_no_date, DATE_FORMAT).map_err(|e| {
            AppError::InvalidRound(format!("round {}: bad drwNoDate '{}': {e}", r.drw_no, r.drw_no_date))
        })?;
        let numbers = [r.drwt_no1, r.drwt_no2, r.drwt_no3, r.drwt_no4, r.drwt_no5, r.drwt_no6];
        Ok(LottoRound::new(r.drw_no, draw_date, numbers, r.bnus_no)?.with_prizes(
            r.tot_sellamnt,
            r.first_winamnt,
            r.first_przwner_co,
            r.first_accumamnt,
        ))
    }
}

impl From<LottoRound> for RoundRecord {
    fn from(r: LottoRound) -> Self {
        let [n1, n2, n3, n4, n5, n6] = r.numbers;
        RoundRecord {
            drw_no: r.round,
            drw_no_date: r.draw_date.format(DATE_FORMAT).to_string(),
            drwt_no1: n1,
            drwt_no2: n2,
            drwt_no3: n3,
            drwt_no4: n4,
            drwt_no5: n5,
            drwt_no6: n6,
            bnus_no: r.bonus_number,
            tot_sellamnt: r.total_sales,
            first_winamnt: r.first_prize_amount,
            first_przwner_co: r.first_prize_winner_count,
            first_accumamnt: r.first_prize_accumulated,
        }
    }
}

// ---------------------------------------------------------------------------
// Draw calendar
// ---------------------------------------------------------------------------

pub fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(EPOCH_YEAR, EPOCH_MONTH, EPOCH_DAY).unwrap_or_default()
}

/// Draw date of `round` assuming one draw per week since the epoch.
pub fn draw_date_for_round(round: u32) -> Option<NaiveDate> {
    let weeks = u64::from(round.checked_sub(1)?);
    epoch_date().checked_add_days(Days::new(weeks * 7))
}

/// Highest round whose draw date is on or before `date`. Zero before the epoch.
pub fn latest_round_on(date: NaiveDate) -> u32 {
    let days = (date - epoch_date()).num_days();
    if days < 0 {
        return 0;
    }
    u32::try_from(days / 7 + 1).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// Sequencing
// ---------------------------------------------------------------------------

/// What the sequencer does when a single round fails with a transient error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop the batch at the failed round. Used for live incremental updates.
    Abort,
    /// Record the failure and move on to the next round. Used for back-fill.
    Skip,
}

#[derive(Debug)]
pub enum StopReason {
    /// Every requested round was attempted.
    Exhausted,
    /// The source reported this round as not drawn yet.
    NotAvailable(u32),
    /// A transient error under [`ErrorPolicy::Abort`].
    Aborted { round: u32, error: FetchError },
    /// Shutdown was signalled between rounds.
    Cancelled,
    /// The run's time budget ran out between rounds.
    DeadlineReached,
}

#[derive(Debug)]
pub struct SequenceOutcome {
    /// Records obtained, in ascending round order.
    pub rounds: Vec<LottoRound>,
    /// Rounds that failed and were skipped.
    pub failed: Vec<u32>,
    pub last_attempted: Option<u32>,
    pub stop: StopReason,
}

// ---------------------------------------------------------------------------
// Update reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    /// At least one round was persisted.
    Success,
    /// Nothing new upstream.
    Done,
    /// Unrecoverable failure.
    Error,
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpdateStatus::Success => "success",
            UpdateStatus::Done => "done",
            UpdateStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Explicit resume point; otherwise highest stored round + 1.
    pub start: Option<u32>,
    pub count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReport {
    pub status: UpdateStatus,
    /// Fetched rounds handed to the store, counting insert-ignore no-ops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<u32>,
    /// Net-new rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted: Option<u32>,
    /// Rounds skipped after a transient error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_processed_round: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_round: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UpdateReport {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: UpdateStatus::Error,
            processed: None,
            inserted: None,
            failed: None,
            last_processed_round: None,
            next_round: None,
            message: Some(message.into()),
        }
    }
}

/// Result of a flat-file reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Rounds in `[1, ceiling]` absent from the store at the start.
    pub missing: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub failed: Vec<u32>,
    pub last_attempted: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn numbers_are_sorted_on_construction() {
        let r = LottoRound::new(1, date(2002, 12, 7), [40, 10, 23, 37, 2, 33], 16).unwrap();
        assert_eq!(r.numbers(), &[2, 10, 23, 33, 37, 40]);
        assert_eq!(r.bonus_number(), 16);
    }

    #[test]
    fn rejects_bonus_inside_numbers() {
        let err = LottoRound::new(5, date(2003, 1, 4), [1, 2, 3, 4, 5, 6], 6).unwrap_err();
        assert!(err.to_string().contains("bonus 6"), "{err}");
    }

    #[test]
    fn rejects_duplicates_and_out_of_range() {
        assert!(LottoRound::new(5, date(2003, 1, 4), [1, 1, 3, 4, 5, 6], 7).is_err());
        assert!(LottoRound::new(5, date(2003, 1, 4), [0, 2, 3, 4, 5, 6], 7).is_err());
        assert!(LottoRound::new(5, date(2003, 1, 4), [1, 2, 3, 4, 5, 46], 7).is_err());
        assert!(LottoRound::new(5, date(2003, 1, 4), [1, 2, 3, 4, 5, 6], 46).is_err());
        assert!(LottoRound::new(0, date(2003, 1, 4), [1, 2, 3, 4, 5, 6], 7).is_err());
    }

    #[test]
    fn draw_date_follows_weekly_schedule() {
        assert_eq!(draw_date_for_round(1), Some(date(2002, 12, 7)));
        assert_eq!(draw_date_for_round(2), Some(date(2002, 12, 14)));
        assert_eq!(draw_date_for_round(1100), Some(date(2023, 12, 30)));
        assert_eq!(draw_date_for_round(0), None);
    }

    #[test]
    fn latest_round_on_counts_draw_days_inclusively() {
        assert_eq!(latest_round_on(date(2002, 12, 6)), 0);
        assert_eq!(latest_round_on(date(2002, 12, 7)), 1);
        assert_eq!(latest_round_on(date(2002, 12, 13)), 1);
        assert_eq!(latest_round_on(date(2023, 12, 30)), 1100);
        assert_eq!(latest_round_on(date(2024, 1, 5)), 1100);
    }

    #[test]
    fn wire_shape_uses_upstream_field_names() {
        let raw = r#"{"drwNo":1100,"drwNoDate":"2023-12-30","drwtNo1":17,"drwtNo2":26,
            "drwtNo3":29,"drwtNo4":30,"drwtNo5":31,"drwtNo6":43,"bnusNo":12,
            "totSellamnt":114638792000,"firstWinamnt":2640841500,"firstPrzwnerCo":10,
            "firstAccumamnt":26408415000,"returnValue":"success"}"#;
        let r: LottoRound = serde_json::from_str(raw).unwrap();
        assert_eq!(r.round(), 1100);
        assert_eq!(r.first_prize_winner_count, 10);

        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["drwNo"], 1100);
        assert_eq!(v["drwNoDate"], "2023-12-30");
        assert_eq!(v["bnusNo"], 12);
        assert!(v.get("returnValue").is_none());
    }

    #[test]
    fn invalid_wire_record_is_rejected_by_deserialization() {
        let raw = r#"{"drwNo":3,"drwNoDate":"2002-12-21","drwtNo1":1,"drwtNo2":2,
            "drwtNo3":3,"drwtNo4":4,"drwtNo5":5,"drwtNo6":6,"bnusNo":1}"#;
        assert!(serde_json::from_str::<LottoRound>(raw).is_err());
    }

    #[test]
    fn update_report_omits_absent_fields() {
        let v = serde_json::to_value(UpdateReport::error("store unreachable")).unwrap();
        assert_eq!(v, serde_json::json!({"status": "error", "message": "store unreachable"}));
    }
}
