//! Batch orchestrator: runs manager operations over instruments × timeframes
//! with progress reporting.
//!
//! Pairs are processed sequentially. A failed pair is handed to the progress
//! reporter and recorded in the summary; the loop moves on to the next pair.

use super::manager::{MoexData, UpdateSummary};
use crate::domain::Timeframe;
use crate::error::DataError;
use chrono::NaiveDateTime;
use std::path::PathBuf;

/// What one successful pair produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    Downloaded(Vec<PathBuf>),
    Updated(UpdateSummary),
}

impl std::fmt::Display for PairOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairOutcome::Downloaded(files) if files.is_empty() => write!(f, "no data"),
            PairOutcome::Downloaded(files) => write!(f, "{} file(s) written", files.len()),
            PairOutcome::Updated(s) => write!(
                f,
                "{} new candle(s), {} appended, {} file(s) created, last {}",
                s.received,
                s.appended,
                s.created.len(),
                s.last
            ),
        }
    }
}

/// Progress callback for batch operations.
pub trait BatchProgress: Send {
    /// Called before a pair is processed.
    fn on_start(&self, secid: &str, timeframe: Timeframe, index: usize, total: usize);

    /// Called when a pair completes.
    fn on_complete(
        &self,
        secid: &str,
        timeframe: Timeframe,
        index: usize,
        total: usize,
        result: &Result<PairOutcome, DataError>,
    );

    /// Called once the whole batch is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Reports through the `log` facade.
pub struct LogProgress;

impl BatchProgress for LogProgress {
    fn on_start(&self, secid: &str, timeframe: Timeframe, index: usize, total: usize) {
        log::info!("[{}/{}] {secid}-{timeframe}", index + 1, total);
    }

    fn on_complete(
        &self,
        secid: &str,
        timeframe: Timeframe,
        _index: usize,
        _total: usize,
        result: &Result<PairOutcome, DataError>,
    ) {
        match result {
            Ok(outcome) => log::info!("  {secid}-{timeframe}: {outcome}"),
            Err(e) => log::error!("  {secid}-{timeframe}: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        log::info!("Done: {succeeded}/{total} succeeded, {failed} failed");
    }
}

/// Summary of a batch operation.
#[derive(Debug)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(String, Timeframe, DataError)>,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Download `begin..=end` for every pair. With no `begin`, each instrument
/// starts at its own first upstream year.
pub fn download_batch(
    manager: &MoexData,
    secids: &[String],
    timeframes: &[Timeframe],
    begin: Option<i32>,
    end: i32,
    progress: &dyn BatchProgress,
) -> BatchSummary {
    run_pairs(secids, timeframes, progress, |secid, tf| {
        manager
            .download_range(secid, tf, begin, end)
            .map(PairOutcome::Downloaded)
    })
}

/// Incrementally update every pair.
pub fn update_batch(
    manager: &MoexData,
    secids: &[String],
    timeframes: &[Timeframe],
    progress: &dyn BatchProgress,
) -> BatchSummary {
    run_pairs(secids, timeframes, progress, |secid, tf| {
        manager.update(secid, tf).map(PairOutcome::Updated)
    })
}

fn run_pairs<F>(
    secids: &[String],
    timeframes: &[Timeframe],
    progress: &dyn BatchProgress,
    mut op: F,
) -> BatchSummary
where
    F: FnMut(&str, Timeframe) -> Result<PairOutcome, DataError>,
{
    let total = secids.len() * timeframes.len();
    let mut succeeded = 0;
    let mut failed = 0;
    let mut errors = Vec::new();

    let pairs = secids
        .iter()
        .flat_map(|s| timeframes.iter().map(move |tf| (s.as_str(), *tf)));
    for (i, (secid, tf)) in pairs.enumerate() {
        progress.on_start(secid, tf, i, total);
        let result = op(secid, tf);
        progress.on_complete(secid, tf, i, total, &result);

        match result {
            Ok(_) => succeeded += 1,
            Err(e) => {
                errors.push((secid.to_string(), tf, e));
                failed += 1;
            }
        }
    }

    progress.on_batch_complete(succeeded, failed, total);

    BatchSummary {
        total,
        succeeded,
        failed,
        errors,
    }
}

/// One row of a first/last date refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct DateEntry {
    pub secid: String,
    pub datetime: Option<NaiveDateTime>,
}

/// Earliest upstream candle per instrument. Failures are logged and read as `None`.
pub fn first_dates(manager: &MoexData, secids: &[String], timeframe: Timeframe) -> Vec<DateEntry> {
    collect_dates(secids, |secid| manager.get_first_datetime(secid, timeframe))
}

/// Newest local candle per instrument. Failures are logged and read as `None`.
pub fn last_dates(manager: &MoexData, secids: &[String], timeframe: Timeframe) -> Vec<DateEntry> {
    collect_dates(secids, |secid| manager.get_last_datetime(secid, timeframe))
}

fn collect_dates<F>(secids: &[String], mut lookup: F) -> Vec<DateEntry>
where
    F: FnMut(&str) -> Result<Option<NaiveDateTime>, DataError>,
{
    secids
        .iter()
        .map(|secid| {
            let datetime = lookup(secid.as_str()).unwrap_or_else(|e| {
                log::error!("{secid}: {e}");
                None
            });
            DateEntry {
                secid: secid.clone(),
                datetime,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records error-level messages.
    struct Capture(Mutex<Vec<String>>);

    impl log::Log for Capture {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Error
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.0.lock().unwrap().push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    static CAPTURE: Capture = Capture(Mutex::new(Vec::new()));

    fn errors_mentioning(secid: &str) -> usize {
        let _ = log::set_logger(&CAPTURE);
        log::set_max_level(log::LevelFilter::Error);
        CAPTURE
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.contains(secid))
            .count()
    }

    struct Silent;

    impl BatchProgress for Silent {
        fn on_start(&self, _: &str, _: Timeframe, _: usize, _: usize) {}
        fn on_complete(
            &self,
            _: &str,
            _: Timeframe,
            _: usize,
            _: usize,
            _: &Result<PairOutcome, DataError>,
        ) {
        }
        fn on_batch_complete(&self, _: usize, _: usize, _: usize) {}
    }

    fn failing(secid: &str, timeframe: Timeframe) -> Result<PairOutcome, DataError> {
        Err(DataError::NoLocalData {
            secid: secid.to_string(),
            timeframe,
        })
    }

    #[test]
    fn failures_are_collected_and_the_loop_continues() {
        let secids = vec!["AAAA".to_string(), "BBBB".to_string()];
        let summary = run_pairs(&secids, &[Timeframe::Day], &Silent, |secid, tf| {
            if secid == "AAAA" {
                failing(secid, tf)
            } else {
                Ok(PairOutcome::Downloaded(Vec::new()))
            }
        });
        assert_eq!((summary.total, summary.succeeded, summary.failed), (2, 1, 1));
        assert_eq!(summary.errors[0].0, "AAAA");
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn failed_pair_is_logged_once_by_the_reporter() {
        errors_mentioning("QUIETX");
        let secids = vec!["QUIETX".to_string()];
        run_pairs(&secids, &[Timeframe::Day], &Silent, failing);
        assert_eq!(errors_mentioning("QUIETX"), 0);

        let secids = vec!["LOUDX".to_string()];
        run_pairs(&secids, &[Timeframe::Day], &LogProgress, failing);
        assert_eq!(errors_mentioning("LOUDX"), 1);
    }
}
