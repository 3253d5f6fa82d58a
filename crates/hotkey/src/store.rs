//! Persisted hotkey record

use crate::{HotkeyConfig, HotkeyError, HotkeyResult};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Key the record is stored under
pub const HOTKEY_KEY: &str = "hotkey";

pub trait HotkeyStore: Send {
    fn load(&self) -> HotkeyResult<Option<HotkeyConfig>>;
    fn save(&self, config: &HotkeyConfig) -> HotkeyResult<()>;
}

/// Stored value, or the built-in chord if absent or unreadable
pub fn load_or_default(store: &dyn HotkeyStore) -> HotkeyConfig {
    match store.load() {
        Ok(Some(config)) if !config.modifiers.tracked().is_empty() => config,
        Ok(Some(config)) => {
            warn!(event = "hotkey.store.rejected_unmodified", key_code = config.key_code);
            HotkeyConfig::default()
        }
        Ok(None) => HotkeyConfig::default(),
        Err(e) => {
            warn!(event = "hotkey.store.load_failed", error = %e);
            HotkeyConfig::default()
        }
    }
}

/// `"hotkey"` entry of a JSON settings file; other keys are preserved
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> HotkeyResult<Map<String, Value>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => Ok(map),
            _ => Err(HotkeyError::Corrupt(format!(
                "{} is not a JSON object",
                self.path.display()
            ))),
        }
    }
}

impl HotkeyStore for JsonFileStore {
    fn load(&self) -> HotkeyResult<Option<HotkeyConfig>> {
        let document = self.read_document()?;
        match document.get(HOTKEY_KEY) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    fn save(&self, config: &HotkeyConfig) -> HotkeyResult<()> {
        let mut document = match self.read_document() {
            Ok(document) => document,
            // an unreadable file may still hold settings we must not clobber
            Err(HotkeyError::Io(e)) => return Err(e.into()),
            Err(e) => {
                warn!(
                    event = "hotkey.store.replacing_corrupt",
                    path = %self.path.display(),
                    error = %e
                );
                Map::new()
            }
        };
        document.insert(HOTKEY_KEY.to_string(), serde_json::to_value(config)?);

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&Value::Object(document))?)?;
        fs::rename(&tmp, &self.path)?;

        debug!(
            event = "hotkey.store.saved",
            path = %self.path.display(),
            chord = %config
        );
        Ok(())
    }
}

/// In-process store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    value: Arc<Mutex<Option<HotkeyConfig>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(config: HotkeyConfig) -> Self {
        Self {
            value: Arc::new(Mutex::new(Some(config))),
        }
    }

    pub fn get(&self) -> Option<HotkeyConfig> {
        *self.value.lock()
    }
}

impl HotkeyStore for MemoryStore {
    fn load(&self) -> HotkeyResult<Option<HotkeyConfig>> {
        Ok(self.get())
    }

    fn save(&self, config: &HotkeyConfig) -> HotkeyResult<()> {
        *self.value.lock() = Some(*config);
        Ok(())
    }
}
