//! MOEX ISS data provider.
//!
//! Fetches share candles and the share list from the exchange's public ISS
//! REST API. ISS answers with tables (`columns` + `data` rows) and pages
//! results at 500 rows per request.

use super::provider::CandleProvider;
use crate::config::IssConfig;
use crate::domain::{Candle, Instrument, Timeframe};
use crate::error::FetchError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// Maximum rows ISS returns per page.
pub const ISS_PAGE_SIZE: usize = 500;

const ISS_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Anchor for the first-candle lookup, earlier than any listing.
const FIRST_CANDLE_ANCHOR: &str = "1900-01-01";

/// ISS table block.
#[derive(Debug, Deserialize)]
struct IssTable {
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
}

impl IssTable {
    fn column(&self, name: &str) -> Result<usize, FetchError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| FetchError::ResponseFormat(format!("missing column '{name}'")))
    }
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    candles: IssTable,
}

#[derive(Debug, Deserialize)]
struct SecuritiesResponse {
    securities: IssTable,
}

/// MOEX ISS provider.
pub struct IssProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    board: String,
}

impl IssProvider {
    pub fn new(config: &IssConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            board: config.board.clone(),
        })
    }

    fn candles_url(&self, secid: &str) -> String {
        format!(
            "{}/engines/stock/markets/shares/securities/{secid}/candles.json",
            self.base_url
        )
    }

    fn securities_url(&self) -> String {
        format!(
            "{}/engines/stock/markets/shares/boards/{}/securities.json",
            self.base_url, self.board
        )
    }

    /// GET and decode. `Ok(None)` on 404.
    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, FetchError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        resp.json()
            .map(Some)
            .map_err(|e| FetchError::ResponseFormat(format!("{url}: {e}")))
    }

    /// One page of candles between two dates (both inclusive).
    fn candles_page(
        &self,
        secid: &str,
        timeframe: Timeframe,
        from: &str,
        till: &str,
        start: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>, FetchError> {
        let query = candles_query(timeframe, from, till, start, limit);
        match self.get_json::<CandlesResponse>(&self.candles_url(secid), &query)? {
            Some(resp) => parse_candles(resp.candles),
            None => Ok(Vec::new()),
        }
    }
}

fn candles_query(
    timeframe: Timeframe,
    from: &str,
    till: &str,
    start: usize,
    limit: Option<usize>,
) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("from", from.to_string()),
        ("till", till.to_string()),
        ("interval", timeframe.iss_interval().to_string()),
        ("start", start.to_string()),
        ("iss.meta", "off".to_string()),
    ];
    if let Some(limit) = limit {
        query.push(("limit", limit.to_string()));
    }
    query
}

impl CandleProvider for IssProvider {
    fn name(&self) -> &str {
        "moex_iss"
    }

    fn fetch_day(
        &self,
        secid: &str,
        timeframe: Timeframe,
        day: NaiveDate,
    ) -> Result<Vec<Candle>, FetchError> {
        let date = day.format("%Y-%m-%d").to_string();
        let mut all = Vec::new();
        loop {
            let page = self.candles_page(secid, timeframe, &date, &date, all.len(), None)?;
            let n = page.len();
            all.extend(page);
            if n < ISS_PAGE_SIZE {
                break;
            }
        }
        Ok(all)
    }

    fn first_candle(
        &self,
        secid: &str,
        timeframe: Timeframe,
        until: NaiveDate,
    ) -> Result<Option<Candle>, FetchError> {
        let till = until.format("%Y-%m-%d").to_string();
        let page = self.candles_page(secid, timeframe, FIRST_CANDLE_ANCHOR, &till, 0, Some(1))?;
        Ok(page.into_iter().next())
    }

    fn list_all_instruments(&self) -> Result<Vec<Instrument>, FetchError> {
        let query = [
            ("iss.only", "securities".to_string()),
            ("iss.meta", "off".to_string()),
        ];
        let url = self.securities_url();
        match self.get_json::<SecuritiesResponse>(&url, &query)? {
            Some(resp) => parse_securities(resp.securities),
            None => Err(FetchError::Http {
                status: 404,
                url,
            }),
        }
    }
}

// ── Response decoding ───────────────────────────────────────────────

/// Convert an ISS `candles` table into candles, looking columns up by name.
fn parse_candles(table: IssTable) -> Result<Vec<Candle>, FetchError> {
    let begin = table.column("begin")?;
    let end = table.column("end")?;
    let open = table.column("open")?;
    let high = table.column("high")?;
    let low = table.column("low")?;
    let close = table.column("close")?;
    let value = table.column("value")?;
    let volume = table.column("volume")?;

    table
        .data
        .iter()
        .enumerate()
        .map(|(i, row)| {
            Ok(Candle {
                begin: cell_datetime(row, begin, i)?,
                end: cell_datetime(row, end, i)?,
                open: cell_f64(row, open, i)?,
                high: cell_f64(row, high, i)?,
                low: cell_f64(row, low, i)?,
                close: cell_f64(row, close, i)?,
                value: cell_f64(row, value, i)?,
                volume: cell_u64(row, volume, i)?,
            })
        })
        .collect()
}

/// Convert an ISS `securities` table into instruments, keeping every column.
fn parse_securities(table: IssTable) -> Result<Vec<Instrument>, FetchError> {
    table.column("SECID")?;

    table
        .data
        .into_iter()
        .map(|row| {
            let object: Map<String, Value> = table.columns.iter().cloned().zip(row).collect();
            serde_json::from_value(Value::Object(object))
                .map_err(|e| FetchError::ResponseFormat(format!("security row: {e}")))
        })
        .collect()
}

fn cell(row: &[Value], col: usize, i: usize) -> Result<&Value, FetchError> {
    row.get(col)
        .ok_or_else(|| FetchError::ResponseFormat(format!("row {i} is too short")))
}

fn cell_f64(row: &[Value], col: usize, i: usize) -> Result<f64, FetchError> {
    cell(row, col, i)?
        .as_f64()
        .ok_or_else(|| FetchError::ResponseFormat(format!("row {i}: column {col} is not a number")))
}

fn cell_u64(row: &[Value], col: usize, i: usize) -> Result<u64, FetchError> {
    let v = cell(row, col, i)?;
    v.as_u64()
        .or_else(|| v.as_f64().filter(|x| *x >= 0.0).map(|x| x as u64))
        .ok_or_else(|| FetchError::ResponseFormat(format!("row {i}: column {col} is not a volume")))
}

fn cell_datetime(row: &[Value], col: usize, i: usize) -> Result<NaiveDateTime, FetchError> {
    let raw = cell(row, col, i)?
        .as_str()
        .ok_or_else(|| FetchError::ResponseFormat(format!("row {i}: column {col} is not a string")))?;
    NaiveDateTime::parse_from_str(raw, ISS_DATETIME_FORMAT)
        .map_err(|e| FetchError::ResponseFormat(format!("row {i}: timestamp '{raw}': {e}")))
}
