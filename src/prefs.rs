//! Durable client-side preferences (last chosen provider and model).

use crate::error::PersistenceError;
use crate::paths;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const SELECTED_PROVIDER: &str = "selectedProvider";
pub const SELECTED_MODEL: &str = "selectedModel";

pub trait PreferenceStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// JSON object of string values, rewritten atomically on every set.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<BTreeMap<String, String>, PersistenceError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(PersistenceError::Unavailable(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            PersistenceError::Unavailable(format!("failed to parse {}: {e}", self.path.display()))
        })
    }
}

impl PreferenceStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut values = self.load().unwrap_or_else(|e| {
            tracing::warn!("{e}; starting a fresh preferences file");
            BTreeMap::new()
        });
        values.insert(key.to_string(), value.to_string());
        paths::write_json_atomic(&self.path, &values)
            .map_err(|e| PersistenceError::Unavailable(format!("{e:#}")))
    }
}

/// Preferences that live only as long as the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
