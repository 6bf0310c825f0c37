//! moexdl core: download and locally cache MOEX share candles.
//!
//! - Domain types (candles, instruments, timeframes)
//! - Per-year `;`-delimited series files under `download/`
//! - MOEX ISS provider behind the `CandleProvider` trait
//! - Data manager: first/last dates, year downloads, incremental update
//! - Named instrument lists under `list/`
//! - Batch runner over instruments × timeframes

pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod logging;

pub use config::Config;
pub use data::{CandleProvider, ListStore, MoexData, SeriesStore};
pub use domain::{Candle, Instrument, Timeframe};
pub use error::{DataError, FetchError, StorageError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the CLI worker thread takes ownership
    /// of is Send.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Candle>();
        require_sync::<Candle>();
        require_send::<Instrument>();
        require_sync::<Instrument>();
        require_send::<Timeframe>();
        require_sync::<Timeframe>();

        require_send::<MoexData>();
        require_sync::<MoexData>();
        require_send::<SeriesStore>();
        require_send::<ListStore>();
        require_send::<data::IssProvider>();
        require_sync::<data::IssProvider>();

        require_send::<DataError>();
        require_send::<data::BatchSummary>();
        require_send::<data::UpdateSummary>();
    }
}
