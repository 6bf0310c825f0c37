//! Series file store.
//!
//! Layout: `{root}/{SECID}/{timeframe}/{SECID}-{timeframe}-{YYYY}.csv`
//!
//! One file per calendar year, `;`-delimited, header on the first line.
//! Files are written whole or appended to; nothing is rewritten in place.
//! An absent directory means "no data yet", never an error.

use crate::domain::candle::{Candle, DELIMITER, HEADER};
use crate::domain::Timeframe;
use crate::error::StorageError;
use chrono::NaiveDateTime;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// The on-disk candle store.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    root: PathBuf,
}

impl SeriesStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root download directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one series: `{root}/{SECID}/{timeframe}/`
    pub fn series_dir(&self, secid: &str, timeframe: Timeframe) -> PathBuf {
        self.root.join(secid).join(timeframe.as_str())
    }

    /// Create the series directory if missing.
    pub fn ensure_dir(&self, secid: &str, timeframe: Timeframe) -> Result<PathBuf, StorageError> {
        let dir = self.series_dir(secid, timeframe);
        fs::create_dir_all(&dir).map_err(StorageError::io(&dir))?;
        Ok(dir)
    }

    /// Path of the file for one year. Pure; never touches the filesystem.
    pub fn path_for(&self, secid: &str, timeframe: Timeframe, year: i32) -> PathBuf {
        self.series_dir(secid, timeframe)
            .join(file_name(secid, timeframe, year))
    }

    /// Every stored year, ascending. Files not named like a series file are ignored.
    pub fn years(&self, secid: &str, timeframe: Timeframe) -> Result<Vec<i32>, StorageError> {
        let dir = self.series_dir(secid, timeframe);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&dir)(e)),
        };

        let prefix = format!("{secid}-{timeframe}-");
        let mut years = Vec::new();
        for entry in entries {
            let entry = entry.map_err(StorageError::io(&dir))?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(year) = name.to_str().and_then(|n| parse_year(n, &prefix)) {
                years.push(year);
            }
        }
        years.sort_unstable();
        Ok(years)
    }

    /// Greatest stored year, if any.
    pub fn latest_year(&self, secid: &str, timeframe: Timeframe) -> Result<Option<i32>, StorageError> {
        Ok(self.years(secid, timeframe)?.last().copied())
    }

    /// File with the greatest year, if any.
    pub fn latest_file(
        &self,
        secid: &str,
        timeframe: Timeframe,
    ) -> Result<Option<PathBuf>, StorageError> {
        Ok(self
            .latest_year(secid, timeframe)?
            .map(|year| self.path_for(secid, timeframe, year)))
    }

    /// Write header and candles, replacing any existing file.
    pub fn write_series(&self, path: &Path, candles: &[Candle]) -> Result<(), StorageError> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .from_path(path)
            .map_err(StorageError::csv(path))?;

        wtr.write_record(HEADER).map_err(StorageError::csv(path))?;
        for c in candles {
            wtr.write_record(c.to_fields())
                .map_err(StorageError::csv(path))?;
        }
        wtr.flush().map_err(StorageError::io(path))
    }

    /// Append candle lines to an existing file. Prior bytes are untouched.
    pub fn append_series(&self, path: &Path, candles: &[Candle]) -> Result<(), StorageError> {
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(StorageError::io(path))?;

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .from_writer(file);
        for c in candles {
            wtr.write_record(c.to_fields())
                .map_err(StorageError::csv(path))?;
        }
        wtr.flush().map_err(StorageError::io(path))
    }

    /// Read every candle of one file. The header line is skipped, blank lines ignored.
    pub fn read_series(&self, path: &Path) -> Result<Vec<Candle>, StorageError> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(StorageError::csv(path))?;

        let mut candles = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(StorageError::csv(path))?;
            let candle = Candle::from_fields(record.iter()).map_err(|e| StorageError::Malformed {
                path: path.to_path_buf(),
                line: record.position().map_or(0, |p| p.line()),
                reason: e.to_string(),
            })?;
            candles.push(candle);
        }
        Ok(candles)
    }

    /// Whole series, all year files in ascending order.
    pub fn load_series(&self, secid: &str, timeframe: Timeframe) -> Result<Vec<Candle>, StorageError> {
        let mut all = Vec::new();
        for year in self.years(secid, timeframe)? {
            all.extend(self.read_series(&self.path_for(secid, timeframe, year))?);
        }
        Ok(all)
    }

    /// Open timestamp of the last non-empty data line, or `None` for a
    /// header-only file.
    pub fn last_candle_begin(&self, path: &Path) -> Result<Option<NaiveDateTime>, StorageError> {
        let content = fs::read_to_string(path).map_err(StorageError::io(path))?;

        let last = content
            .lines()
            .enumerate()
            .skip(1)
            .filter(|(_, line)| !line.trim().is_empty())
            .last();

        match last {
            None => Ok(None),
            Some((i, line)) => Candle::parse_line(line)
                .map(|c| Some(c.begin))
                .map_err(|e| StorageError::Malformed {
                    path: path.to_path_buf(),
                    line: i as u64 + 1,
                    reason: e.to_string(),
                }),
        }
    }

    /// Remove every instrument directory under the root. Returns how many
    /// were removed; a missing root removes nothing.
    pub fn delete_all(&self) -> Result<usize, StorageError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::io(&self.root)(e)),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry.map_err(StorageError::io(&self.root))?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path).map_err(StorageError::io(&path))?;
                log::debug!("removed {}", path.display());
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// `{SECID}-{timeframe}-{YYYY}.csv`
pub fn file_name(secid: &str, timeframe: Timeframe, year: i32) -> String {
    format!("{secid}-{timeframe}-{year:04}.csv")
}

/// Year of a series file name, given its `{SECID}-{timeframe}-` prefix.
fn parse_year(name: &str, prefix: &str) -> Option<i32> {
    let digits = name.strip_prefix(prefix)?.strip_suffix(".csv")?;
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
