//! moexdl CLI: instrument lists, candle download and incremental update.
//!
//! Commands:
//! - `lists` / `show` / `list-add` / `list-remove`: manage saved instrument lists
//! - `first-date` / `last-date`: earliest upstream / newest local candle
//! - `download`: fetch whole years into per-year series files
//! - `update`: append candles newer than the last stored one
//! - `delete`: remove all downloaded series

mod worker;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use moexdl_core::data::{batch, MoexData, ALL_LIST};
use moexdl_core::domain::{Instrument, Timeframe};
use moexdl_core::{logging, Config};
use std::path::PathBuf;
use std::sync::mpsc;
use thiserror::Error;
use worker::{DateKind, Worker, WorkerCommand, WorkerResponse};

#[derive(Parser)]
#[command(
    name = "moexdl",
    version,
    about = "moexdl: download and cache MOEX share candles"
)]
struct Cli {
    /// Config file. Defaults to ./moexdl.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the names of saved instrument lists.
    Lists,
    /// Print a saved list with first and last candle dates.
    Show {
        list: String,

        /// Timeframe for the date columns: 1m, 10m, 1h, D, W, M.
        #[arg(short, long, default_value = "1m")]
        timeframe: Timeframe,
    },
    /// Add instruments from the `all` list to a saved list.
    ListAdd {
        list: String,
        #[arg(required = true)]
        secids: Vec<String>,
    },
    /// Remove instruments from a saved list.
    ListRemove {
        list: String,
        #[arg(required = true)]
        secids: Vec<String>,
    },
    /// Print the earliest candle available upstream.
    FirstDate {
        #[command(flatten)]
        selection: Selection,

        #[arg(short, long, default_value = "1m")]
        timeframe: Timeframe,
    },
    /// Print the newest candle stored locally.
    LastDate {
        #[command(flatten)]
        selection: Selection,

        #[arg(short, long, default_value = "1m")]
        timeframe: Timeframe,
    },
    /// Download whole years of candles, replacing existing year files.
    Download {
        #[command(flatten)]
        selection: Selection,

        /// Timeframes to download (repeatable): 1m, 10m, 1h, D, W, M.
        #[arg(short = 't', long = "timeframe", num_args = 1..)]
        timeframes: Vec<Timeframe>,

        /// First year. Defaults to each instrument's first trading year.
        #[arg(long)]
        begin: Option<i32>,

        /// Last year. Defaults to the current year.
        #[arg(long)]
        end: Option<i32>,
    },
    /// Fetch candles newer than the last stored one.
    Update {
        #[command(flatten)]
        selection: Selection,

        /// Timeframes to update (repeatable): 1m, 10m, 1h, D, W, M.
        #[arg(short = 't', long = "timeframe", num_args = 1..)]
        timeframes: Vec<Timeframe>,
    },
    /// Delete all downloaded series.
    Delete {
        /// Actually delete (without this flag, only previews what would be removed).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

/// Instruments to work on: a saved list or explicit codes.
#[derive(Args, Debug, Clone)]
struct Selection {
    /// Take instruments from a saved list.
    #[arg(long, conflicts_with = "secids")]
    list: Option<String>,

    /// Instrument codes (SECID), e.g. SBER GAZP.
    secids: Vec<String>,
}

/// Input problems caught before any file or network access.
#[derive(Debug, Error, PartialEq, Eq)]
enum PreflightError {
    #[error("no instruments selected: pass SECIDs or --list NAME")]
    NoInstruments,

    #[error("no timeframe chosen: pass -t with one of 1m, 10m, 1h, D, W, M")]
    NoTimeframe,

    #[error("begin year {begin} is after end year {end}")]
    YearOrder { begin: i32, end: i32 },
}

fn check_selection(selection: &Selection) -> Result<(), PreflightError> {
    if selection.list.is_none() && selection.secids.is_empty() {
        return Err(PreflightError::NoInstruments);
    }
    Ok(())
}

fn check_batch(
    selection: &Selection,
    timeframes: &[Timeframe],
    begin: Option<i32>,
    end: i32,
) -> Result<(), PreflightError> {
    check_selection(selection)?;
    if timeframes.is_empty() {
        return Err(PreflightError::NoTimeframe);
    }
    if let Some(begin) = begin {
        if begin > end {
            return Err(PreflightError::YearOrder { begin, end });
        }
    }
    Ok(())
}

fn current_year() -> i32 {
    chrono::Local::now().year()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Validate arguments before touching disk or network.
    match &cli.command {
        Commands::FirstDate { selection, .. } | Commands::LastDate { selection, .. } => {
            check_selection(selection)?
        }
        Commands::Download {
            selection,
            timeframes,
            begin,
            end,
        } => check_batch(selection, timeframes, *begin, end.unwrap_or_else(current_year))?,
        Commands::Update {
            selection,
            timeframes,
        } => check_batch(selection, timeframes, None, current_year())?,
        _ => {}
    }

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let log_file = logging::init(&config).context("initialising logging")?;
    log::debug!("config: {config:?}, log file {}", log_file.display());

    let manager = MoexData::from_config(&config).context("creating MOEX ISS client")?;

    let ok = match cli.command {
        Commands::Lists => run_lists(&manager)?,
        Commands::Show { list, timeframe } => run_show(&manager, &list, timeframe)?,
        Commands::ListAdd { list, secids } => run_list_add(&manager, &list, &secids)?,
        Commands::ListRemove { list, secids } => run_list_remove(&manager, &list, &secids)?,
        Commands::FirstDate {
            selection,
            timeframe,
        } => {
            let secids = resolve(&manager, &selection)?;
            run_task(manager, WorkerCommand::FirstDates { secids, timeframe })?
        }
        Commands::LastDate {
            selection,
            timeframe,
        } => {
            let secids = resolve(&manager, &selection)?;
            run_task(manager, WorkerCommand::LastDates { secids, timeframe })?
        }
        Commands::Download {
            selection,
            timeframes,
            begin,
            end,
        } => {
            let secids = resolve(&manager, &selection)?;
            let end = end.unwrap_or_else(current_year);
            run_task(
                manager,
                WorkerCommand::Download {
                    secids,
                    timeframes,
                    begin,
                    end,
                },
            )?
        }
        Commands::Update {
            selection,
            timeframes,
        } => {
            let secids = resolve(&manager, &selection)?;
            run_task(manager, WorkerCommand::Update { secids, timeframes })?
        }
        Commands::Delete { confirm } => run_delete(manager, confirm)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// SECIDs from a saved list or the command line, upper-cased and deduplicated.
fn resolve(manager: &MoexData, selection: &Selection) -> Result<Vec<String>> {
    let secids: Vec<String> = match &selection.list {
        Some(name) => {
            manager.ensure_all_list()?;
            let list = manager
                .load_shares_list(name)
                .with_context(|| format!("loading list '{name}'"))?;
            if list.is_empty() {
                bail!("list '{name}' is empty");
            }
            list.into_iter().map(|i| i.secid).collect()
        }
        None => selection.secids.iter().map(|s| s.to_uppercase()).collect(),
    };

    let mut unique = Vec::with_capacity(secids.len());
    for secid in secids {
        if !unique.contains(&secid) {
            unique.push(secid);
        }
    }
    Ok(unique)
}

fn run_lists(manager: &MoexData) -> Result<bool> {
    if manager.ensure_all_list()? {
        println!("Created list '{ALL_LIST}'");
    }
    for name in manager.list_names()? {
        println!("{name}");
    }
    Ok(true)
}

fn run_show(manager: &MoexData, list: &str, timeframe: Timeframe) -> Result<bool> {
    manager.ensure_all_list()?;
    let instruments = manager
        .load_shares_list(list)
        .with_context(|| format!("loading list '{list}'"))?;
    let secids: Vec<String> = instruments.iter().map(|i| i.secid.clone()).collect();

    let first = batch::first_dates(manager, &secids, timeframe);
    let last = batch::last_dates(manager, &secids, timeframe);

    println!(
        "{:<8} {:<40} {:<19} {:<19}",
        "SECID",
        "SECNAME",
        format!("first ({timeframe})"),
        format!("last ({timeframe})")
    );
    for ((inst, f), l) in instruments.iter().zip(&first).zip(&last) {
        println!(
            "{:<8} {:<40} {:<19} {:<19}",
            inst.secid,
            inst.secname().unwrap_or(""),
            fmt_datetime(f.datetime),
            fmt_datetime(l.datetime)
        );
    }
    Ok(true)
}

fn run_list_add(manager: &MoexData, list: &str, secids: &[String]) -> Result<bool> {
    manager.ensure_all_list()?;
    let all = manager.load_shares_list(ALL_LIST)?;

    let mut found: Vec<Instrument> = Vec::new();
    let mut ok = true;
    for secid in secids.iter().map(|s| s.to_uppercase()) {
        match all.iter().find(|i| i.secid == secid) {
            Some(inst) => found.push(inst.clone()),
            None => {
                log::warn!("{secid} is not in list '{ALL_LIST}'");
                ok = false;
            }
        }
    }

    let added = manager.lists().add(list, &found)?;
    println!("Added {added} instrument(s) to '{list}'");
    Ok(ok)
}

fn run_list_remove(manager: &MoexData, list: &str, secids: &[String]) -> Result<bool> {
    let secids: Vec<String> = secids.iter().map(|s| s.to_uppercase()).collect();
    let removed = manager
        .lists()
        .remove(list, &secids)
        .with_context(|| format!("updating list '{list}'"))?;
    println!("Removed {removed} instrument(s) from '{list}'");
    Ok(true)
}

fn run_delete(manager: MoexData, confirm: bool) -> Result<bool> {
    if !confirm {
        let root = manager.store().root();
        let count = match std::fs::read_dir(root) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .count(),
            Err(_) => 0,
        };
        println!(
            "Would remove {count} instrument directories under {}",
            root.display()
        );
        println!("Run with --confirm to delete.");
        return Ok(true);
    }
    run_task(manager, WorkerCommand::DeleteAll)
}

/// Run one task on the worker and print its responses. Returns false if
/// anything failed.
fn run_task(manager: MoexData, cmd: WorkerCommand) -> Result<bool> {
    let (resp_tx, resp_rx) = mpsc::channel();
    let worker = Worker::spawn(manager, resp_tx).context("starting worker thread")?;
    worker.submit(cmd)?;

    let mut ok = true;
    for resp in resp_rx.iter() {
        match resp {
            WorkerResponse::PairStarted {
                secid,
                timeframe,
                index,
                total,
            } => println!("[{}/{}] {secid}-{timeframe}", index + 1, total),
            WorkerResponse::PairDone {
                secid,
                timeframe,
                result,
            } => match result {
                Ok(msg) => println!("  {secid}-{timeframe}: {msg}"),
                // The logger echoes to stderr, so this also lands in the log file.
                Err(msg) => log::error!("{secid}-{timeframe}: {msg}"),
            },
            WorkerResponse::BatchDone {
                succeeded,
                failed,
                total,
            } => {
                println!("Done: {succeeded}/{total} succeeded, {failed} failed");
                ok &= failed == 0;
            }
            WorkerResponse::Dates {
                kind,
                timeframe,
                entries,
            } => {
                let label = match kind {
                    DateKind::First => "first",
                    DateKind::Last => "last",
                };
                println!("{:<8} {label} ({timeframe})", "SECID");
                for entry in entries {
                    println!("{:<8} {}", entry.secid, fmt_datetime(entry.datetime));
                }
            }
            WorkerResponse::Deleted { directories } => {
                println!("Deleted {directories} instrument directories");
            }
            WorkerResponse::Error { message } => {
                log::error!("{message}");
                ok = false;
            }
            WorkerResponse::Finished => break,
        }
    }

    worker.shutdown();
    Ok(ok)
}

fn fmt_datetime(dt: Option<NaiveDateTime>) -> String {
    dt.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".into())
}
