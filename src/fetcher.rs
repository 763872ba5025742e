use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::config::{html_selectors, Config, SourceKind, USER_AGENT};
use crate::error::{FetchError, Result};
use crate::types::{draw_date_for_round, LottoRound, RoundRecord, DRAWN_NUMBERS};

/// A source of single-round results.
///
/// `Ok(None)` means the source says the round is not drawn yet. Any `Err` is
/// transient: the same round may succeed on a later attempt.
#[async_trait]
pub trait RoundFetcher: Send + Sync {
    async fn fetch_round(&self, round: u32) -> std::result::Result<Option<LottoRound>, FetchError>;

    /// Label for logs.
    fn source_name(&self) -> &'static str;
}

pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Builds the fetcher selected by `LOTTO_SOURCE`.
pub fn from_config(cfg: &Config) -> Result<Box<dyn RoundFetcher>> {
    let client = build_client(cfg.fetch_timeout)?;
    Ok(match cfg.source {
        SourceKind::Api => Box::new(ApiFetcher::new(client, cfg.api_url.clone())),
        SourceKind::Html => Box::new(HtmlFetcher::new(client, cfg.html_url.clone())),
    })
}

async fn get_body(client: &reqwest::Client, url: &str) -> std::result::Result<String, FetchError> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    Ok(resp.text().await?)
}

// ---------------------------------------------------------------------------
// JSON API
// ---------------------------------------------------------------------------

pub struct ApiFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl ApiFetcher {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl RoundFetcher for ApiFetcher {
    async fn fetch_round(&self, round: u32) -> std::result::Result<Option<LottoRound>, FetchError> {
        let url = format!("{}&drwNo={round}", self.base_url);
        let body = get_body(&self.client, &url).await?;
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| FetchError::Parse(format!("round {round}: body is not JSON: {e}")))?;
        parse_api_response(round, &value)
    }

    fn source_name(&self) -> &'static str {
        "api"
    }
}

/// Interpret one JSON API response. Only `returnValue == "success"` carries a
/// record; anything else is the upstream's way of saying "not drawn yet".
pub fn parse_api_response(
    round: u32,
    v: &serde_json::Value,
) -> std::result::Result<Option<LottoRound>, FetchError> {
    let Some(return_value) = v.get("returnValue").and_then(|r| r.as_str()) else {
        return Err(FetchError::Parse(format!("round {round}: missing returnValue")));
    };
    if return_value != "success" {
        debug!(round, return_value, "Round not available from API");
        return Ok(None);
    }

    let record: RoundRecord = serde_json::from_value(v.clone())
        .map_err(|e| FetchError::Parse(format!("round {round}: {e}")))?;
    if record.drw_no != round {
        return Err(FetchError::Parse(format!(
            "round {round}: response is for round {}",
            record.drw_no
        )));
    }
    LottoRound::try_from(record)
        .map(Some)
        .map_err(|e| FetchError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// HTML result page
// ---------------------------------------------------------------------------

pub struct HtmlFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HtmlFetcher {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl RoundFetcher for HtmlFetcher {
    async fn fetch_round(&self, round: u32) -> std::result::Result<Option<LottoRound>, FetchError> {
        let url = format!("{}&drwNo={round}", self.base_url);
        let body = get_body(&self.client, &url).await?;
        parse_result_page(round, &body)
    }

    fn source_name(&self) -> &'static str {
        "html"
    }
}

fn selector(css: &str) -> std::result::Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Parse(format!("bad selector '{css}': {e}")))
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Digits only, so "2,640,841,500원" and "10" both parse.
fn parse_amount(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Scrape one result page.
///
/// The page shows the latest drawn round when asked for one that does not
/// exist yet, so a heading for a different round means "not available".
pub fn parse_result_page(
    round: u32,
    html: &str,
) -> std::result::Result<Option<LottoRound>, FetchError> {
    let document = Html::parse_document(html);

    let heading = document
        .select(&selector(html_selectors::ROUND_HEADING)?)
        .next()
        .map(text_of)
        .ok_or_else(|| FetchError::Parse(format!("round {round}: round heading not found")))?;
    let shown = parse_amount(&heading)
        .ok_or_else(|| FetchError::Parse(format!("round {round}: unreadable heading '{heading}'")))?;
    if shown != u64::from(round) {
        debug!(round, shown, "Result page shows a different round");
        return Ok(None);
    }

    let balls: Vec<u8> = document
        .select(&selector(html_selectors::BALL)?)
        .map(text_of)
        .map(|t| {
            t.parse::<u8>()
                .map_err(|_| FetchError::Parse(format!("round {round}: non-numeric ball '{t}'")))
        })
        .collect::<std::result::Result<_, _>>()?;
    if balls.len() != DRAWN_NUMBERS + 1 {
        return Err(FetchError::Parse(format!(
            "round {round}: expected {} number circles, found {}",
            DRAWN_NUMBERS + 1,
            balls.len()
        )));
    }
    let mut numbers = [0u8; DRAWN_NUMBERS];
    numbers.copy_from_slice(&balls[..DRAWN_NUMBERS]);
    let bonus = balls[DRAWN_NUMBERS];

    let first_row = document
        .select(&selector(html_selectors::PRIZE_ROWS)?)
        .next()
        .ok_or_else(|| FetchError::Parse(format!("round {round}: first-prize row not found")))?;
    let cells: Vec<String> = first_row
        .select(&selector(html_selectors::CELL)?)
        .map(text_of)
        .collect();
    let (winners, per_winner) = match (
        cells.get(2).and_then(|c| parse_amount(c)),
        cells.get(3).and_then(|c| parse_amount(c)),
    ) {
        (Some(w), Some(a)) => (w, a),
        _ => {
            return Err(FetchError::Parse(format!(
                "round {round}: first-prize row has unexpected cells {cells:?}"
            )))
        }
    };
    let accumulated = winners.checked_mul(per_winner).ok_or_else(|| {
        FetchError::Parse(format!("round {round}: first-prize total overflows"))
    })?;

    let draw_date = draw_date_for_round(round)
        .ok_or_else(|| FetchError::Parse(format!("round {round}: draw date out of range")))?;

    LottoRound::new(round, draw_date, numbers, bonus)
        .map(|r| Some(r.with_prizes(0, per_winner, winners, accumulated)))
        .map_err(|e| FetchError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result_page(shown_round: u32, balls: &[u8], winners: &str, amount: &str) -> String {
        let spans: String = balls
            .iter()
            .map(|b| format!(r#"<span class="ball_645 lrg ball{}">{b}</span>"#, b / 10 + 1))
            .collect();
        format!(
            r#"<html><body>
            <div class="win_result">
              <h4><strong>{shown_round}회</strong> 당첨결과</h4>
              <div class="nums">{spans}</div>
            </div>
            <table class="tbl_data tbl_data_col">
              <thead><tr><th>순위</th><th>총 당첨금액</th><th>당첨게임 수</th><th>1게임당 당첨금액</th></tr></thead>
              <tbody>
                <tr><td>1등</td><td class="tar"><strong>26,408,415,000원</strong></td><td>{winners}</td><td class="tar">{amount}</td></tr>
                <tr><td>2등</td><td class="tar">4,401,402,750원</td><td>83</td><td class="tar">53,029,000원</td></tr>
              </tbody>
            </table>
            </body></html>"#
        )
    }

    #[test]
    fn api_success_yields_record() {
        let v = json!({
            "returnValue": "success", "drwNo": 1100, "drwNoDate": "2023-12-30",
            "drwtNo1": 17, "drwtNo2": 26, "drwtNo3": 29, "drwtNo4": 30, "drwtNo5": 31, "drwtNo6": 43,
            "bnusNo": 12, "totSellamnt": 114638792000u64, "firstWinamnt": 2640841500u64,
            "firstPrzwnerCo": 10, "firstAccumamnt": 26408415000u64
        });
        let r = parse_api_response(1100, &v).unwrap().unwrap();
        assert_eq!(r.round(), 1100);
        assert_eq!(r.numbers(), &[17, 26, 29, 30, 31, 43]);
        assert_eq!(r.bonus_number(), 12);
        assert_eq!(r.first_prize_accumulated, 26_408_415_000);
    }

    #[test]
    fn api_fail_value_means_not_drawn() {
        let v = json!({"returnValue": "fail"});
        assert!(parse_api_response(9999, &v).unwrap().is_none());
    }

    #[test]
    fn api_missing_fields_is_parse_error() {
        let v = json!({"returnValue": "success", "drwNo": 5});
        let err = parse_api_response(5, &v).unwrap_err();
        assert_eq!(err.kind(), "parse");

        let err = parse_api_response(5, &json!({"unexpected": true})).unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn api_round_mismatch_is_parse_error() {
        let v = json!({
            "returnValue": "success", "drwNo": 4, "drwNoDate": "2002-12-28",
            "drwtNo1": 1, "drwtNo2": 2, "drwtNo3": 3, "drwtNo4": 4, "drwtNo5": 5, "drwtNo6": 6,
            "bnusNo": 7
        });
        assert!(matches!(parse_api_response(5, &v), Err(FetchError::Parse(_))));
    }

    #[test]
    fn html_page_is_scraped() {
        let page = result_page(1100, &[17, 26, 29, 30, 31, 43, 12], "10", "2,640,841,500원");
        let r = parse_result_page(1100, &page).unwrap().unwrap();
        assert_eq!(r.numbers(), &[17, 26, 29, 30, 31, 43]);
        assert_eq!(r.bonus_number(), 12);
        assert_eq!(r.first_prize_winner_count, 10);
        assert_eq!(r.first_prize_amount, 2_640_841_500);
        assert_eq!(r.first_prize_accumulated, 26_408_415_000);
        assert_eq!(r.total_sales, 0);
        assert_eq!(r.draw_date().to_string(), "2023-12-30");
    }

    #[test]
    fn html_page_for_other_round_means_not_available() {
        let page = result_page(1100, &[17, 26, 29, 30, 31, 43, 12], "10", "2,640,841,500원");
        assert!(parse_result_page(1101, &page).unwrap().is_none());
    }

    #[test]
    fn html_wrong_ball_count_is_parse_error() {
        let page = result_page(1100, &[17, 26, 29, 30, 31, 43], "10", "1원");
        let err = parse_result_page(1100, &page).unwrap_err();
        assert!(err.to_string().contains("number circles"), "{err}");
    }

    #[test]
    fn html_without_markup_is_parse_error() {
        let err = parse_result_page(1100, "<html><body>maintenance</body></html>").unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn html_bad_prize_row_is_parse_error() {
        let page = result_page(1100, &[17, 26, 29, 30, 31, 43, 12], "-", "-");
        assert!(matches!(parse_result_page(1100, &page), Err(FetchError::Parse(_))));
    }

    // ---------------------------------------------------------------------
    // HTTP layer, against a local stub server
    // ---------------------------------------------------------------------

    use std::collections::HashMap;

    use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};

    /// Serves `app` on an ephemeral port and returns the base URL a fetcher
    /// appends `&drwNo=N` to.
    async fn serve(path: &str, app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}{path}?method=stub")
    }

    fn client(timeout: Duration) -> reqwest::Client {
        build_client(timeout).unwrap()
    }

    #[tokio::test]
    async fn api_fetcher_passes_round_number_upstream() {
        let app = Router::new().route(
            "/common.do",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                if q.get("drwNo").map(String::as_str) != Some("1100") {
                    return Json(json!({"returnValue": "fail"}));
                }
                Json(json!({
                    "returnValue": "success", "drwNo": 1100, "drwNoDate": "2023-12-30",
                    "drwtNo1": 17, "drwtNo2": 26, "drwtNo3": 29, "drwtNo4": 30,
                    "drwtNo5": 31, "drwtNo6": 43, "bnusNo": 12
                }))
            }),
        );
        let fetcher = ApiFetcher::new(client(Duration::from_secs(5)), serve("/common.do", app).await);

        let found = fetcher.fetch_round(1100).await.unwrap().unwrap();
        assert_eq!(found.round(), 1100);
        assert!(fetcher.fetch_round(1101).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_success_status_is_status_error() {
        let app = Router::new().route(
            "/common.do",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let fetcher = ApiFetcher::new(client(Duration::from_secs(5)), serve("/common.do", app).await);

        let err = fetcher.fetch_round(1).await.unwrap_err();
        assert_eq!(err.kind(), "status");
        assert!(matches!(err, FetchError::Status(500)));
    }

    #[tokio::test]
    async fn unanswered_request_times_out_as_network_error() {
        let app = Router::new().route(
            "/gameResult.do",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "too late"
            }),
        );
        let fetcher = HtmlFetcher::new(
            client(Duration::from_millis(200)),
            serve("/gameResult.do", app).await,
        );

        let started = std::time::Instant::now();
        let err = fetcher.fetch_round(1).await.unwrap_err();
        assert_eq!(err.kind(), "network");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn html_fetcher_scrapes_served_page() {
        let page = result_page(1100, &[17, 26, 29, 30, 31, 43, 12], "10", "2,640,841,500원");
        let app = Router::new().route(
            "/gameResult.do",
            get(move || async move { axum::response::Html(page) }),
        );
        let fetcher = HtmlFetcher::new(
            client(Duration::from_secs(5)),
            serve("/gameResult.do", app).await,
        );

        let r = fetcher.fetch_round(1100).await.unwrap().unwrap();
        assert_eq!(r.bonus_number(), 12);
        // The same page answered for a later round means it is not drawn yet.
        assert!(fetcher.fetch_round(1101).await.unwrap().is_none());
    }
}
