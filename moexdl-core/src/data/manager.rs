//! Data manager: the download and incremental update pipeline.
//!
//! Per (instrument, timeframe) the local state is either "no data" or
//! "partial up to the last stored candle". `download_range` fills whole
//! years; `update` extends the newest year file and opens new year files as
//! needed. Only `update` requires existing local data.

use super::iss::IssProvider;
use super::lists::ListStore;
use super::provider::CandleProvider;
use super::storage::SeriesStore;
use crate::config::Config;
use crate::domain::{Candle, Instrument, Timeframe};
use crate::error::DataError;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Source of "now". Replaced in tests to pin the date.
pub type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Outcome of one incremental update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSummary {
    /// Completed candles returned by the provider.
    pub received: usize,
    /// Candles appended to the existing newest file.
    pub appended: usize,
    /// Year files created for later years.
    pub created: Vec<PathBuf>,
    /// Open timestamp of the newest stored candle after the update.
    pub last: NaiveDateTime,
}

/// Owns the provider and both stores.
pub struct MoexData {
    provider: Box<dyn CandleProvider>,
    store: SeriesStore,
    lists: ListStore,
    clock: Clock,
}

impl MoexData {
    pub fn new(provider: Box<dyn CandleProvider>, store: SeriesStore, lists: ListStore) -> Self {
        Self {
            provider,
            store,
            lists,
            clock: Box::new(|| chrono::Local::now().naive_local()),
        }
    }

    /// ISS provider and stores under the configured root.
    pub fn from_config(config: &Config) -> Result<Self, DataError> {
        let provider = IssProvider::new(&config.iss)?;
        Ok(Self::new(
            Box::new(provider),
            SeriesStore::new(config.download_dir()),
            ListStore::new(config.list_dir()),
        ))
    }

    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub fn lists(&self) -> &ListStore {
        &self.lists
    }

    pub fn provider(&self) -> &dyn CandleProvider {
        self.provider.as_ref()
    }

    fn today_midnight(&self) -> NaiveDateTime {
        (self.clock)().date().and_time(NaiveTime::MIN)
    }

    /// Fetch `from..to` and drop candles whose period is still open today.
    fn fetch_closed(
        &self,
        secid: &str,
        timeframe: Timeframe,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<Candle>, DataError> {
        let cutoff = self.today_midnight();
        let mut candles = self.provider.fetch_candles(secid, timeframe, from, to)?;
        candles.retain(|c| {
            let closed = timeframe.is_closed(c.begin, cutoff);
            if !closed {
                log::debug!("{secid}-{timeframe}: skipping open candle at {}", c.begin);
            }
            closed
        });
        Ok(candles)
    }

    // ── Instrument lists ────────────────────────────────────────────

    pub fn get_all_shares(&self) -> Result<Vec<Instrument>, DataError> {
        Ok(self.provider.list_all_instruments()?)
    }

    pub fn save_shares_list(&self, name: &str, instruments: &[Instrument]) -> Result<(), DataError> {
        Ok(self.lists.save(name, instruments)?)
    }

    pub fn load_shares_list(&self, name: &str) -> Result<Vec<Instrument>, DataError> {
        Ok(self.lists.load(name)?)
    }

    pub fn list_names(&self) -> Result<Vec<String>, DataError> {
        Ok(self.lists.names()?)
    }

    /// Bootstrap the `all` list if missing. Returns whether it was created.
    pub fn ensure_all_list(&self) -> Result<bool, DataError> {
        self.lists.ensure_all(self.provider.as_ref())
    }

    // ── Dates ───────────────────────────────────────────────────────

    /// Open timestamp of the earliest candle upstream.
    pub fn get_first_datetime(
        &self,
        secid: &str,
        timeframe: Timeframe,
    ) -> Result<Option<NaiveDateTime>, DataError> {
        let today = (self.clock)().date();
        let first = self.provider.first_candle(secid, timeframe, today)?;
        if first.is_none() {
            log::warn!("{secid}-{timeframe}: no market data upstream");
        }
        Ok(first.map(|c| c.begin))
    }

    /// Open timestamp of the newest candle stored locally. Never touches the network.
    pub fn get_last_datetime(
        &self,
        secid: &str,
        timeframe: Timeframe,
    ) -> Result<Option<NaiveDateTime>, DataError> {
        match self.store.latest_file(secid, timeframe)? {
            Some(path) => Ok(self.store.last_candle_begin(&path)?),
            None => Ok(None),
        }
    }

    // ── Download ────────────────────────────────────────────────────

    /// Fetch one calendar year and write it as a fresh file.
    ///
    /// The current year is fetched up to today at midnight, and a week or
    /// month that has not ended yet is left out. Returns the written path, or
    /// `None` when upstream had nothing for that year.
    pub fn download_year(
        &self,
        secid: &str,
        timeframe: Timeframe,
        year: i32,
    ) -> Result<Option<PathBuf>, DataError> {
        if !(0..=9998).contains(&year) {
            return Err(DataError::InvalidYear(year));
        }
        let from = jan_first(year).ok_or(DataError::InvalidYear(year))?;
        let mut to = jan_first(year + 1).ok_or(DataError::InvalidYear(year))?;
        if to >= (self.clock)() {
            to = self.today_midnight();
        }

        log::info!("Download {secid}-{timeframe}-{year}");
        let candles = self.fetch_closed(secid, timeframe, from, to)?;
        if candles.is_empty() {
            log::warn!("No data for {secid}-{timeframe}-{year}!");
            return Ok(None);
        }

        let path = self.write_year(secid, timeframe, year, &candles)?;
        Ok(Some(path))
    }

    /// Download every year from `begin` (or the first upstream year) to `end`, inclusive.
    pub fn download_range(
        &self,
        secid: &str,
        timeframe: Timeframe,
        begin: Option<i32>,
        end: i32,
    ) -> Result<Vec<PathBuf>, DataError> {
        let begin = match begin {
            Some(year) => year,
            None => match self.get_first_datetime(secid, timeframe)? {
                Some(first) => first.year(),
                None => return Ok(Vec::new()),
            },
        };

        let mut written = Vec::new();
        for year in begin..=end {
            if let Some(path) = self.download_year(secid, timeframe, year)? {
                written.push(path);
            }
        }
        Ok(written)
    }

    fn write_year(
        &self,
        secid: &str,
        timeframe: Timeframe,
        year: i32,
        candles: &[Candle],
    ) -> Result<PathBuf, DataError> {
        self.store.ensure_dir(secid, timeframe)?;
        let path = self.store.path_for(secid, timeframe, year);
        self.store.write_series(&path, candles)?;
        log::info!("Saved {} candles to {}", candles.len(), path.display());
        Ok(path)
    }

    // ── Update ──────────────────────────────────────────────────────

    /// Fetch candles newer than the last stored one, up to today at midnight,
    /// and merge them into the year files.
    pub fn update(&self, secid: &str, timeframe: Timeframe) -> Result<UpdateSummary, DataError> {
        let no_data = || DataError::NoLocalData {
            secid: secid.to_string(),
            timeframe,
        };

        let latest_year = self.store.latest_year(secid, timeframe)?.ok_or_else(no_data)?;
        let latest_path = self.store.path_for(secid, timeframe, latest_year);
        let last = self
            .store
            .last_candle_begin(&latest_path)?
            .ok_or_else(no_data)?;

        let from = timeframe.next_after(last);
        let to = self.today_midnight();
        log::info!("Update {secid}-{timeframe} from {from} to {to}");

        let fetched = self.fetch_closed(secid, timeframe, from, to)?;
        let received = fetched.len();

        let mut prev = last;
        let mut by_year: BTreeMap<i32, Vec<Candle>> = BTreeMap::new();
        for candle in fetched {
            if candle.begin <= prev {
                log::warn!(
                    "{secid}-{timeframe}: dropping out-of-order candle at {}",
                    candle.begin
                );
                continue;
            }
            prev = candle.begin;
            by_year.entry(candle.year()).or_default().push(candle);
        }

        let mut summary = UpdateSummary {
            received,
            appended: 0,
            created: Vec::new(),
            last: prev,
        };

        for (year, candles) in by_year {
            if year == latest_year {
                self.store.append_series(&latest_path, &candles)?;
                log::info!(
                    "Appended {} candles to {}",
                    candles.len(),
                    latest_path.display()
                );
                summary.appended += candles.len();
            } else if year > latest_year {
                let path = self.write_year(secid, timeframe, year, &candles)?;
                summary.created.push(path);
            } else {
                log::warn!(
                    "{secid}-{timeframe}: skipping {} candles for {year}, older than {latest_year}",
                    candles.len()
                );
            }
        }

        if received == 0 {
            log::info!("{secid}-{timeframe} is up to date");
        }
        Ok(summary)
    }

    // ── Maintenance ─────────────────────────────────────────────────

    /// Remove every instrument directory under the download root.
    pub fn delete_all_local_data(&self) -> Result<usize, DataError> {
        let removed = self.store.delete_all()?;
        log::info!(
            "Deleted {removed} instrument directories under {}",
            self.store.root().display()
        );
        Ok(removed)
    }
}

fn jan_first(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1).map(|d| d.and_time(NaiveTime::MIN))
}
