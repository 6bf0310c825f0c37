//! TOML configuration.
//!
//! Every key has a default, so a missing `moexdl.toml` is the same as an
//! empty one. All on-disk state lives under `root_dir`:
//! `download/`, `list/` and `log/debug.log`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub root_dir: PathBuf,
    pub iss: IssConfig,
    pub log: LogConfig,
}

/// MOEX ISS endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssConfig {
    pub base_url: String,
    /// Trading board used for the full share list.
    pub board: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            iss: IssConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for IssConfig {
    fn default() -> Self {
        Self {
            base_url: "https://iss.moex.com/iss".into(),
            board: "TQBR".into(),
            timeout_secs: 30,
            user_agent: concat!("moexdl/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Config {
    /// Looked up in the working directory when no explicit path is given.
    pub const FILE_NAME: &'static str = "moexdl.toml";

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Explicit path if given (must exist), else `moexdl.toml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(Self::FILE_NAME);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        self.root_dir.join("download")
    }

    pub fn list_dir(&self) -> PathBuf {
        self.root_dir.join("list")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root_dir.join("log")
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join("debug.log")
    }
}
