//! Error taxonomy of the data layer.
//!
//! Displayable as-is in the CLI status stream. "Instrument has no market
//! data" is not an error: it surfaces as `None` or an empty sequence.

use crate::domain::Timeframe;
use std::path::PathBuf;
use thiserror::Error;

/// Upstream or network failure during a fetch call.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),
}

/// Filesystem failure on a series or list file.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed line {line} in {path}: {reason}")]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StorageError {
        let path = path.into();
        move |source| StorageError::Io { path, source }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>) -> impl FnOnce(csv::Error) -> StorageError {
        let path = path.into();
        move |source| StorageError::Csv { path, source }
    }

    pub(crate) fn json(path: impl Into<PathBuf>) -> impl FnOnce(serde_json::Error) -> StorageError {
        let path = path.into();
        move |source| StorageError::Json { path, source }
    }
}

/// Errors from data manager operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("no local data for {secid}-{timeframe}; download it before updating")]
    NoLocalData { secid: String, timeframe: Timeframe },

    #[error("year {0} is out of range")]
    InvalidYear(i32),
}
