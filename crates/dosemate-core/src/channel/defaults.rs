//! File-backed key-value suite
//!
//! A namespaced preferences file both processes can open. Writes are held
//! in memory until [`Defaults::synchronize`] merges them into the file with
//! an atomic replace; reads always consult the file, so values written by
//! another process become visible without reopening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::ChannelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum DefaultsValue {
    Data(Vec<u8>),
    Date(DateTime<Utc>),
    Bool(bool),
    Int(i64),
    String(String),
}

pub struct Defaults {
    path: PathBuf,
    /// `None` marks a removal
    pending: Mutex<BTreeMap<String, Option<DefaultsValue>>>,
}

impl Defaults {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn pending(&self) -> MutexGuard<'_, BTreeMap<String, Option<DefaultsValue>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current file contents; a missing or unreadable file reads as empty
    fn load(&self) -> BTreeMap<String, DefaultsValue> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                tracing::warn!(file = %self.path.display(), error = %e, "Failed to read defaults");
                return BTreeMap::new();
            }
        };
        serde_json::from_slice(&raw).unwrap_or_else(|e| {
            tracing::warn!(file = %self.path.display(), error = %e, "Ignoring corrupt defaults file");
            BTreeMap::new()
        })
    }

    pub fn get(&self, key: &str) -> Option<DefaultsValue> {
        if let Some(staged) = self.pending().get(key) {
            return staged.clone();
        }
        self.load().remove(key)
    }

    pub fn set(&self, key: impl Into<String>, value: DefaultsValue) {
        self.pending().insert(key.into(), Some(value));
    }

    pub fn remove(&self, key: impl Into<String>) {
        self.pending().insert(key.into(), None);
    }

    pub fn data(&self, key: &str) -> Option<Vec<u8>> {
        match self.get(key)? {
            DefaultsValue::Data(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn date(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.get(key)? {
            DefaultsValue::Date(at) => Some(at),
            _ => None,
        }
    }

    /// Missing or non-boolean values read as false
    pub fn bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some(DefaultsValue::Bool(true)))
    }

    /// Flush staged writes to the file
    pub fn synchronize(&self) -> Result<(), ChannelError> {
        let mut pending = self.pending();
        if pending.is_empty() {
            return Ok(());
        }

        let mut merged = self.load();
        for (key, value) in pending.iter() {
            match value {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }

        let parent = self.path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)?;
        let mut staged = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer(staged.as_file_mut(), &merged)?;
        staged.as_file_mut().flush()?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|e| ChannelError::Io(e.error))?;

        tracing::debug!(keys = pending.len(), "Defaults synchronized");
        pending.clear();
        Ok(())
    }
}
