//! Market data acquisition and local storage.

pub mod batch;
pub mod iss;
pub mod lists;
pub mod manager;
pub mod provider;
pub mod storage;

pub use batch::{BatchProgress, BatchSummary, DateEntry, LogProgress, PairOutcome};
pub use iss::IssProvider;
pub use lists::{ListStore, ALL_LIST};
pub use manager::{MoexData, UpdateSummary};
pub use provider::CandleProvider;
pub use storage::SeriesStore;
