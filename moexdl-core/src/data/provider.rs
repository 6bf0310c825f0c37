//! Candle provider trait.
//!
//! The CandleProvider trait abstracts over the market data source (MOEX ISS)
//! so the data manager can be driven by a mock in tests. Providers know
//! nothing about local storage.

use crate::domain::{Candle, Instrument, Timeframe};
use crate::error::FetchError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Trait for remote candle sources.
///
/// Upstream result size is limited per call, so ranges are fetched one
/// calendar day at a time. Implementations only provide the single-day call;
/// `fetch_candles` stitches days together.
pub trait CandleProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// All candles whose open timestamp falls on `day`, in chronological order.
    /// An unknown instrument yields an empty vector.
    fn fetch_day(
        &self,
        secid: &str,
        timeframe: Timeframe,
        day: NaiveDate,
    ) -> Result<Vec<Candle>, FetchError>;

    /// Earliest candle opening on or before `until`, or `None` if the
    /// instrument has no market data.
    fn first_candle(
        &self,
        secid: &str,
        timeframe: Timeframe,
        until: NaiveDate,
    ) -> Result<Option<Candle>, FetchError>;

    /// Every tradable share, in upstream order.
    fn list_all_instruments(&self) -> Result<Vec<Instrument>, FetchError>;

    /// Candles with `from <= begin < to`, one request per calendar day,
    /// concatenated in request order (which is chronological order).
    fn fetch_candles(
        &self,
        secid: &str,
        timeframe: Timeframe,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<Candle>, FetchError> {
        let mut all = Vec::new();
        if from >= to {
            return Ok(all);
        }

        let mut day = from.date();
        while day.and_time(NaiveTime::MIN) < to {
            log::info!("  - request {secid}-{timeframe} {day}");
            let candles = self.fetch_day(secid, timeframe, day)?;
            all.extend(
                candles
                    .into_iter()
                    .filter(|c| c.begin >= from && c.begin < to),
            );
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        Ok(all)
    }
}
