//! Background worker thread: every data operation runs here.
//!
//! Communication with the main thread is via `mpsc` channels. The worker
//! owns the data manager and runs one task at a time; a task submitted
//! while another is in flight is rejected.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use moexdl_core::data::{batch, BatchProgress, DateEntry, MoexData, PairOutcome};
use moexdl_core::domain::Timeframe;
use moexdl_core::error::DataError;
use thiserror::Error;

/// Tasks sent from the front end to the worker.
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    Download {
        secids: Vec<String>,
        timeframes: Vec<Timeframe>,
        begin: Option<i32>,
        end: i32,
    },
    Update {
        secids: Vec<String>,
        timeframes: Vec<Timeframe>,
    },
    FirstDates {
        secids: Vec<String>,
        timeframe: Timeframe,
    },
    LastDates {
        secids: Vec<String>,
        timeframe: Timeframe,
    },
    DeleteAll,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    First,
    Last,
}

/// Responses sent from the worker back to the front end.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerResponse {
    PairStarted {
        secid: String,
        timeframe: Timeframe,
        index: usize,
        total: usize,
    },
    PairDone {
        secid: String,
        timeframe: Timeframe,
        result: Result<String, String>,
    },
    BatchDone {
        succeeded: usize,
        failed: usize,
        total: usize,
    },
    Dates {
        kind: DateKind,
        timeframe: Timeframe,
        entries: Vec<DateEntry>,
    },
    Deleted {
        directories: usize,
    },
    Error {
        message: String,
    },
    /// Always the last response of a task. The worker is idle again when it arrives.
    Finished,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Data manager is busy now")]
    Busy,

    #[error("worker thread has stopped")]
    Stopped,
}

/// Handle to the worker thread.
pub struct Worker {
    tx: Sender<WorkerCommand>,
    busy: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(manager: MoexData, responses: Sender<WorkerResponse>) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let busy = Arc::new(AtomicBool::new(false));
        let worker_busy = Arc::clone(&busy);

        let handle = thread::Builder::new()
            .name("moexdl-worker".into())
            .spawn(move || worker_loop(manager, rx, responses, worker_busy))?;

        Ok(Self {
            tx,
            busy,
            handle: Some(handle),
        })
    }

    /// Queue a task. Rejected while a previous task is still running.
    pub fn submit(&self, cmd: WorkerCommand) -> Result<(), WorkerError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(WorkerError::Busy);
        }
        self.tx.send(cmd).map_err(|_| {
            self.busy.store(false, Ordering::Release);
            WorkerError::Stopped
        })
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Stop the thread after the current task and wait for it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.tx.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("worker thread panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(
    manager: MoexData,
    rx: Receiver<WorkerCommand>,
    tx: Sender<WorkerResponse>,
    busy: Arc<AtomicBool>,
) {
    loop {
        match rx.recv() {
            Ok(WorkerCommand::Shutdown) | Err(_) => break,
            Ok(cmd) => {
                handle_command(&manager, cmd, &tx);
                busy.store(false, Ordering::Release);
                let _ = tx.send(WorkerResponse::Finished);
            }
        }
    }
    log::debug!("worker stopped");
}

fn handle_command(manager: &MoexData, cmd: WorkerCommand, tx: &Sender<WorkerResponse>) {
    let progress = ChannelProgress { tx: tx.clone() };
    match cmd {
        WorkerCommand::Download {
            secids,
            timeframes,
            begin,
            end,
        } => {
            batch::download_batch(manager, &secids, &timeframes, begin, end, &progress);
        }
        WorkerCommand::Update { secids, timeframes } => {
            batch::update_batch(manager, &secids, &timeframes, &progress);
        }
        WorkerCommand::FirstDates { secids, timeframe } => {
            let entries = batch::first_dates(manager, &secids, timeframe);
            let _ = tx.send(WorkerResponse::Dates {
                kind: DateKind::First,
                timeframe,
                entries,
            });
        }
        WorkerCommand::LastDates { secids, timeframe } => {
            let entries = batch::last_dates(manager, &secids, timeframe);
            let _ = tx.send(WorkerResponse::Dates {
                kind: DateKind::Last,
                timeframe,
                entries,
            });
        }
        WorkerCommand::DeleteAll => {
            let response = match manager.delete_all_local_data() {
                Ok(directories) => WorkerResponse::Deleted { directories },
                Err(e) => WorkerResponse::Error {
                    message: format!("delete failed: {e}"),
                },
            };
            let _ = tx.send(response);
        }
        WorkerCommand::Shutdown => {} // handled in loop
    }
}

/// BatchProgress implementation that sends messages through a channel.
struct ChannelProgress {
    tx: Sender<WorkerResponse>,
}

impl BatchProgress for ChannelProgress {
    fn on_start(&self, secid: &str, timeframe: Timeframe, index: usize, total: usize) {
        let _ = self.tx.send(WorkerResponse::PairStarted {
            secid: secid.to_string(),
            timeframe,
            index,
            total,
        });
    }

    fn on_complete(
        &self,
        secid: &str,
        timeframe: Timeframe,
        _index: usize,
        _total: usize,
        result: &Result<PairOutcome, DataError>,
    ) {
        let _ = self.tx.send(WorkerResponse::PairDone {
            secid: secid.to_string(),
            timeframe,
            result: result
                .as_ref()
                .map(|outcome| outcome.to_string())
                .map_err(|e| e.to_string()),
        });
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        let _ = self.tx.send(WorkerResponse::BatchDone {
            succeeded,
            failed,
            total,
        });
    }
}
