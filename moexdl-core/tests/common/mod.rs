//! Shared fixtures: an in-memory candle provider and a manager over a temp dir.

#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use moexdl_core::data::{CandleProvider, ListStore, MoexData, SeriesStore};
use moexdl_core::domain::{Candle, Instrument, Timeframe};
use moexdl_core::error::FetchError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FetchDay(String, Timeframe, NaiveDate),
    FirstCandle(String, Timeframe, NaiveDate),
    ListAll,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Deterministic exchange: each listed instrument trades every weekday from
/// its listing date on. Unknown instruments have no data.
pub struct MockProvider {
    listings: HashMap<String, NaiveDate>,
    calls: CallLog,
}

impl MockProvider {
    pub fn new(listings: &[(&str, NaiveDate)]) -> (Self, CallLog) {
        let calls = CallLog::default();
        let provider = Self {
            listings: listings
                .iter()
                .map(|(s, d)| (s.to_string(), *d))
                .collect(),
            calls: calls.clone(),
        };
        (provider, calls)
    }
}

impl CandleProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn fetch_day(
        &self,
        secid: &str,
        timeframe: Timeframe,
        day: NaiveDate,
    ) -> Result<Vec<Candle>, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::FetchDay(secid.to_string(), timeframe, day));
        match self.listings.get(secid) {
            Some(listed) if day >= *listed => Ok(candles_on(day, timeframe)),
            _ => Ok(Vec::new()),
        }
    }

    fn first_candle(
        &self,
        secid: &str,
        timeframe: Timeframe,
        until: NaiveDate,
    ) -> Result<Option<Candle>, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::FirstCandle(secid.to_string(), timeframe, until));
        let Some(listed) = self.listings.get(secid) else {
            return Ok(None);
        };
        let mut day = *listed;
        while day <= until {
            if let Some(first) = candles_on(day, timeframe).into_iter().next() {
                return Ok(Some(first));
            }
            day = day.succ_opt().unwrap();
        }
        Ok(None)
    }

    fn list_all_instruments(&self) -> Result<Vec<Instrument>, FetchError> {
        self.calls.lock().unwrap().push(Call::ListAll);
        let mut secids: Vec<&String> = self.listings.keys().collect();
        secids.sort();
        Ok(secids
            .into_iter()
            .map(|s| Instrument::new(s.as_str(), format!("{s} ao")))
            .collect())
    }
}

/// Candles a weekday produces for one timeframe.
pub fn candles_on(day: NaiveDate, timeframe: Timeframe) -> Vec<Candle> {
    let weekday = day.weekday();
    if weekday == Weekday::Sat || weekday == Weekday::Sun {
        return Vec::new();
    }
    let midnight = day.and_hms_opt(0, 0, 0).unwrap();
    let starts: Vec<(NaiveDateTime, Duration)> = match timeframe {
        Timeframe::Day => vec![(midnight, Duration::days(1))],
        Timeframe::Week if weekday == Weekday::Mon => vec![(midnight, Duration::days(7))],
        Timeframe::Week => Vec::new(),
        Timeframe::Month if day.day() == 1 => vec![(midnight, Duration::days(28))],
        Timeframe::Month => Vec::new(),
        Timeframe::Hour1 => (10..19)
            .map(|h| (day.and_hms_opt(h, 0, 0).unwrap(), Duration::hours(1)))
            .collect(),
        Timeframe::Minute10 => (0..6)
            .map(|m| (day.and_hms_opt(10, m * 10, 0).unwrap(), Duration::minutes(10)))
            .collect(),
        Timeframe::Minute1 => (0..10)
            .map(|m| (day.and_hms_opt(10, m, 0).unwrap(), Duration::minutes(1)))
            .collect(),
    };

    starts
        .into_iter()
        .map(|(begin, len)| {
            let base = 100.0 + f64::from(day.ordinal() % 50) + 0.25 * f64::from(begin.hour());
            Candle {
                begin,
                end: begin + len - Duration::seconds(1),
                open: base,
                high: base + 1.5,
                low: base - 0.75,
                close: base + 0.5,
                value: base * 1000.0,
                volume: 1000 + u64::from(day.ordinal()),
            }
        })
        .collect()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, 0, 0).unwrap()
}

/// Settable "now" shared with a manager.
pub type SharedClock = Arc<Mutex<NaiveDateTime>>;

/// Manager over `root/download` and `root/list` with a fixed clock.
pub fn manager(
    root: &std::path::Path,
    provider: MockProvider,
    now: NaiveDateTime,
) -> (MoexData, SharedClock) {
    let clock = Arc::new(Mutex::new(now));
    let handle = clock.clone();
    let manager = MoexData::new(
        Box::new(provider),
        SeriesStore::new(root.join("download")),
        ListStore::new(root.join("list")),
    )
    .with_clock(move || *handle.lock().unwrap());
    (manager, clock)
}

pub fn fetched_days(calls: &CallLog) -> usize {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| matches!(c, Call::FetchDay(..)))
        .count()
}
