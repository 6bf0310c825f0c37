//! Timeframe: the nominal interval of a candle series.

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Candle interval. The string tokens are what the front end accepts and what
/// ends up in directory and file names, so they must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    Minute1,
    Minute10,
    Hour1,
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeframeError {
    #[error("unsupported timeframe '{0}', expected one of: 1m, 10m, 1h, D, W, M")]
    Unsupported(String),
}

impl Timeframe {
    /// Every supported timeframe, shortest first.
    pub const ALL: [Timeframe; 6] = [
        Timeframe::Minute1,
        Timeframe::Minute10,
        Timeframe::Hour1,
        Timeframe::Day,
        Timeframe::Week,
        Timeframe::Month,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Minute1 => "1m",
            Timeframe::Minute10 => "10m",
            Timeframe::Hour1 => "1h",
            Timeframe::Day => "D",
            Timeframe::Week => "W",
            Timeframe::Month => "M",
        }
    }

    /// Interval code used by the MOEX ISS candles endpoint.
    pub fn iss_interval(&self) -> u32 {
        match self {
            Timeframe::Minute1 => 1,
            Timeframe::Minute10 => 10,
            Timeframe::Hour1 => 60,
            Timeframe::Day => 24,
            Timeframe::Week => 7,
            Timeframe::Month => 31,
        }
    }

    /// Open timestamp of the candle expected right after one opening at `begin`.
    ///
    /// Intraday and daily frames add their fixed length. A week is seven days.
    /// A month moves to the first day of the following calendar month, keeping
    /// the time of day.
    pub fn next_after(&self, begin: NaiveDateTime) -> NaiveDateTime {
        match self {
            Timeframe::Minute1 => begin + Duration::minutes(1),
            Timeframe::Minute10 => begin + Duration::minutes(10),
            Timeframe::Hour1 => begin + Duration::hours(1),
            Timeframe::Day => begin + Duration::days(1),
            Timeframe::Week => begin + Duration::days(7),
            Timeframe::Month => {
                let date = begin.date();
                NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
                    .and_then(|first| first.checked_add_months(Months::new(1)))
                    .map(|next| next.and_time(begin.time()))
                    .unwrap_or_else(|| begin + Duration::days(31))
            }
        }
    }

    /// Whether the period opened at `begin` is over by `cutoff`. A candle of an
    /// open period still changes upstream and must not be stored.
    pub fn is_closed(&self, begin: NaiveDateTime, cutoff: NaiveDateTime) -> bool {
        self.next_after(begin) <= cutoff
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| TimeframeError::Unsupported(s.to_string()))
    }
}
