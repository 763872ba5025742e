//! Row type for the `lotto_rounds` table. Column names mirror the upstream
//! JSON fields.

use crate::error::{AppError, Result};
use crate::types::{LottoRound, RoundRecord};

#[derive(Debug, sqlx::FromRow)]
pub struct LottoRoundRow {
    #[sqlx(rename = "drwNo")]
    pub drw_no: i64,
    #[sqlx(rename = "drwNoDate")]
    pub drw_no_date: String,
    #[sqlx(rename = "drwtNo1")]
    pub drwt_no1: i64,
    #[sqlx(rename = "drwtNo2")]
    pub drwt_no2: i64,
    #[sqlx(rename = "drwtNo3")]
    pub drwt_no3: i64,
    #[sqlx(rename = "drwtNo4")]
    pub drwt_no4: i64,
    #[sqlx(rename = "drwtNo5")]
    pub drwt_no5: i64,
    #[sqlx(rename = "drwtNo6")]
    pub drwt_no6: i64,
    #[sqlx(rename = "bnusNo")]
    pub bnus_no: i64,
    #[sqlx(rename = "totSellamnt")]
    pub tot_sellamnt: i64,
    #[sqlx(rename = "firstWinamnt")]
    pub first_winamnt: i64,
    #[sqlx(rename = "firstPrzwnerCo")]
    pub first_przwner_co: i64,
    #[sqlx(rename = "firstAccumamnt")]
    pub first_accumamnt: i64,
}

fn narrow<T: TryFrom<i64>>(column: &str, drw_no: i64, v: i64) -> Result<T> {
    T::try_from(v).map_err(|_| {
        AppError::InvalidRound(format!("round {drw_no}: column {column} out of range ({v})"))
    })
}

impl TryFrom<LottoRoundRow> for LottoRound {
    type Error = AppError;

    fn try_from(r: LottoRoundRow) -> Result<Self> {
        let n = r.drw_no;
        LottoRound::try_from(RoundRecord {
            drw_no: narrow("drwNo", n, r.drw_no)?,
            drw_no_date: r.drw_no_date,
            drwt_no1: narrow("drwtNo1", n, r.drwt_no1)?,
            drwt_no2: narrow("drwtNo2", n, r.drwt_no2)?,
            drwt_no3: narrow("drwtNo3", n, r.drwt_no3)?,
            drwt_no4: narrow("drwtNo4", n, r.drwt_no4)?,
            drwt_no5: narrow("drwtNo5", n, r.drwt_no5)?,
            drwt_no6: narrow("drwtNo6", n, r.drwt_no6)?,
            bnus_no: narrow("bnusNo", n, r.bnus_no)?,
            tot_sellamnt: narrow("totSellamnt", n, r.tot_sellamnt)?,
            first_winamnt: narrow("firstWinamnt", n, r.first_winamnt)?,
            first_przwner_co: narrow("firstPrzwnerCo", n, r.first_przwner_co)?,
            first_accumamnt: narrow("firstAccumamnt", n, r.first_accumamnt)?,
        })
    }
}
