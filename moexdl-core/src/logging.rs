//! Process-wide logger setup.
//!
//! Called once at startup. Every record goes to `log/debug.log` (truncated on
//! each run) and to stderr, which is the status console of the CLI.

use crate::config::Config;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("create log file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("logger already initialised")]
    AlreadyInitialized,
}

/// Writes every record to the log file and to stderr.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        io::stderr().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        io::stderr().flush()
    }
}

/// Initialise the global logger. Returns the log file path.
pub fn init(config: &Config) -> Result<PathBuf, LoggingError> {
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir).map_err(|source| LoggingError::Io {
        path: log_dir.clone(),
        source,
    })?;

    let path = config.log_file();
    let file = File::create(&path).map_err(|source| LoggingError::Io {
        path: path.clone(),
        source,
    })?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log.level.as_str()),
    )
    .format(|buf, record| {
        writeln!(
            buf,
            "{}: {} [{}] {}",
            record.module_path().unwrap_or("moexdl"),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    })
    .target(env_logger::Target::Pipe(Box::new(Tee { file })))
    .try_init()
    .map_err(|_| LoggingError::AlreadyInitialized)?;

    log::debug!("logging to {}", path.display());
    Ok(path)
}
