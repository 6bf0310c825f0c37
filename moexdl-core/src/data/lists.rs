//! Named instrument lists.
//!
//! Each list is `{list_dir}/{name}.json`, a pretty-printed array of
//! instruments. The list named `all` holds every share on the board and is
//! bootstrapped from the provider the first time it is needed.

use super::provider::CandleProvider;
use crate::domain::Instrument;
use crate::error::{DataError, StorageError};
use serde::Serialize;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Name of the list holding every share on the board.
pub const ALL_LIST: &str = "all";

/// Persisted instrument lists.
#[derive(Debug, Clone)]
pub struct ListStore {
    dir: PathBuf,
}

impl ListStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    /// Write a list, replacing any existing one. Four-space indent, non-ASCII kept as is.
    pub fn save(&self, name: &str, instruments: &[Instrument]) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(StorageError::io(&self.dir))?;

        let path = self.path_for(name);
        let file = fs::File::create(&path).map_err(StorageError::io(&path))?;
        let mut writer = BufWriter::new(file);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
        instruments
            .serialize(&mut ser)
            .map_err(StorageError::json(&path))?;
        writer.flush().map_err(StorageError::io(&path))?;

        log::debug!("saved list '{name}' ({} instruments)", instruments.len());
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<Vec<Instrument>, StorageError> {
        let path = self.path_for(name);
        let content = fs::read_to_string(&path).map_err(StorageError::io(&path))?;
        serde_json::from_str(&content).map_err(StorageError::json(&path))
    }

    /// Names of all stored lists, sorted. A missing directory has none.
    pub fn names(&self) -> Result<Vec<String>, StorageError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.dir)(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(StorageError::io(&self.dir))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Create the `all` list from the provider if it does not exist yet.
    /// Returns whether it was created. An existing list is never overwritten.
    pub fn ensure_all(&self, provider: &dyn CandleProvider) -> Result<bool, DataError> {
        if self.exists(ALL_LIST) {
            return Ok(false);
        }
        log::info!("list '{ALL_LIST}' not found, fetching shares from {}", provider.name());
        let instruments = provider.list_all_instruments()?;
        self.save(ALL_LIST, &instruments)?;
        log::info!("list '{ALL_LIST}' created with {} shares", instruments.len());
        Ok(true)
    }

    /// Append instruments not already in the list (matched by SECID),
    /// creating the list if needed. Returns how many were added.
    pub fn add(&self, name: &str, instruments: &[Instrument]) -> Result<usize, StorageError> {
        let mut list = if self.exists(name) {
            self.load(name)?
        } else {
            Vec::new()
        };

        let before = list.len();
        for inst in instruments {
            if !list.iter().any(|i| i.secid == inst.secid) {
                list.push(inst.clone());
            }
        }
        let added = list.len() - before;
        self.save(name, &list)?;
        Ok(added)
    }

    /// Drop instruments whose SECID is in `secids`. Returns how many were removed.
    pub fn remove(&self, name: &str, secids: &[String]) -> Result<usize, StorageError> {
        let mut list = self.load(name)?;
        let before = list.len();
        list.retain(|i| !secids.contains(&i.secid));
        let removed = before - list.len();
        self.save(name, &list)?;
        Ok(removed)
    }
}
