//! Candle: the fundamental market data unit, and its series-file text form.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field delimiter of series files.
pub const DELIMITER: u8 = b';';

/// First line of every series file. Documentation only, never parsed as data.
pub const HEADER: [&str; 8] = [
    "<begin>", "<end>", "<open>", "<high>", "<low>", "<close>", "<value>", "<volume>",
];

/// ISO-8601 without sub-seconds or offset.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One fixed-interval OHLCV record for a single instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub begin: NaiveDateTime,
    pub end: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Traded value in currency.
    pub value: f64,
    /// Traded volume in shares.
    pub volume: u64,
}

/// Why a series line could not be turned into a candle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("expected 8 fields, found {found}")]
    FieldCount { found: usize },

    #[error("invalid timestamp in <{field}>: '{value}'")]
    Timestamp { field: &'static str, value: String },

    #[error("invalid number in <{field}>: '{value}'")]
    Number { field: &'static str, value: String },
}

impl Candle {
    /// Calendar year of the open timestamp; decides which series file owns the candle.
    pub fn year(&self) -> i32 {
        self.begin.year()
    }

    /// Fields in file order. Floats use the shortest representation that
    /// parses back to the same value.
    pub fn to_fields(&self) -> [String; 8] {
        [
            self.begin.format(TIMESTAMP_FORMAT).to_string(),
            self.end.format(TIMESTAMP_FORMAT).to_string(),
            format!("{:?}", self.open),
            format!("{:?}", self.high),
            format!("{:?}", self.low),
            format!("{:?}", self.close),
            format!("{:?}", self.value),
            self.volume.to_string(),
        ]
    }

    /// One series line, without terminator.
    pub fn to_line(&self) -> String {
        self.to_fields().join(";")
    }

    /// Parse one series line.
    pub fn parse_line(line: &str) -> Result<Self, RecordError> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        Self::from_fields(line.split(DELIMITER as char))
    }

    /// Build a candle from fields in file order.
    ///
    /// A single trailing empty field is accepted: older files end every line
    /// with the delimiter.
    pub fn from_fields<'a, I>(fields: I) -> Result<Self, RecordError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut fields: Vec<&str> = fields.into_iter().collect();
        if fields.len() == HEADER.len() + 1 && fields.last() == Some(&"") {
            fields.pop();
        }
        if fields.len() != HEADER.len() {
            return Err(RecordError::FieldCount {
                found: fields.len(),
            });
        }

        Ok(Candle {
            begin: parse_timestamp("begin", fields[0])?,
            end: parse_timestamp("end", fields[1])?,
            open: parse_number("open", fields[2])?,
            high: parse_number("high", fields[3])?,
            low: parse_number("low", fields[4])?,
            close: parse_number("close", fields[5])?,
            value: parse_number("value", fields[6])?,
            volume: parse_number("volume", fields[7])?,
        })
    }
}

/// Header line, without terminator.
pub fn header_line() -> String {
    HEADER.join(";")
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<NaiveDateTime, RecordError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).map_err(|_| {
        RecordError::Timestamp {
            field,
            value: value.to_string(),
        }
    })
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, RecordError> {
    value.trim().parse().map_err(|_| RecordError::Number {
        field,
        value: value.to_string(),
    })
}
