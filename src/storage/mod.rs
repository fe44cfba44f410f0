//! Persistence layer.
//!
//! Every persisted resource sits behind the narrow `DocumentStore`
//! interface (`load`/`save` of one JSON document). `JsonFileStore` writes
//! to disk atomically; `MemoryStore` backs tests. On top of it:
//! - `WatermarkStore` — last delivered notification key
//! - `SettingsStore` — notification toggles
//! - `BumpRegistry` — auto-bump schedule (see `registry`)

pub mod registry;

pub use registry::{BumpRegistry, RegistryTxn};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::types::{BotError, Settings};

pub const SETTINGS_FILE: &str = "settings.json";
pub const WATERMARK_FILE: &str = "watermark.json";
pub const BUMPS_FILE: &str = "bumps.json";

/// Load/save of a single document.
pub trait DocumentStore<T>: Send + Sync {
    /// `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<T>>;
    fn save(&self, value: &T) -> Result<()>;
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> DocumentStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No saved document, starting fresh");
            return Ok(None);
        }
        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let value = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(Some(value))
    }

    /// Write to a sibling temp file then rename over the target, so a crash
    /// never leaves a half-written document.
    fn save(&self, value: &T) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(value).context("Failed to serialise document")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Document saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

pub struct MemoryStore<T> {
    value: Mutex<Option<T>>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }
}

impl<T: Clone> MemoryStore<T> {
    pub fn with_value(value: T) -> Self {
        Self {
            value: Mutex::new(Some(value)),
        }
    }
}

impl<T: Clone + Send> DocumentStore<T> for MemoryStore<T> {
    fn load(&self) -> Result<Option<T>> {
        let guard = self
            .value
            .lock()
            .map_err(|_| BotError::Storage("memory store poisoned".into()))?;
        Ok(guard.clone())
    }

    fn save(&self, value: &T) -> Result<()> {
        let mut guard = self
            .value
            .lock()
            .map_err(|_| BotError::Storage("memory store poisoned".into()))?;
        *guard = Some(value.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Watermark
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkDoc {
    pub last_key: String,
}

/// Key of the newest notification already handled. The poller is the only
/// writer.
#[derive(Clone)]
pub struct WatermarkStore {
    store: Arc<dyn DocumentStore<WatermarkDoc>>,
}

impl WatermarkStore {
    pub fn new(store: Arc<dyn DocumentStore<WatermarkDoc>>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::<WatermarkDoc>::default()))
    }

    pub fn get(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .load()?
            .map(|doc| doc.last_key)
            .filter(|k| !k.is_empty()))
    }

    pub fn set(&self, key: &str) -> Result<()> {
        self.store.save(&WatermarkDoc {
            last_key: key.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Read-modify-write access to `Settings`, serialized by an internal lock.
pub struct SettingsStore {
    store: Arc<dyn DocumentStore<Settings>>,
    lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn DocumentStore<Settings>>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::<Settings>::default()))
    }

    /// Current settings; defaults when nothing was saved yet.
    pub fn get(&self) -> Result<Settings> {
        Ok(self.store.load()?.unwrap_or_default())
    }

    pub fn set(&self, key: &str, value: bool) -> Result<Settings> {
        self.update(key, |_| value)
    }

    /// Flip a flag and return its new value.
    pub fn toggle(&self, key: &str) -> Result<bool> {
        let settings = self.update(key, |current| !current)?;
        Ok(settings.get(key).unwrap_or_default())
    }

    fn update(&self, key: &str, f: impl FnOnce(bool) -> bool) -> Result<Settings> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| BotError::Storage("settings lock poisoned".into()))?;
        let mut settings = self.get()?;
        let current = settings
            .get(key)
            .ok_or_else(|| BotError::UnknownSetting(key.to_string()))?;
        let next = f(current);
        settings.set(key, next);
        self.store.save(&settings)?;
        info!(key, enabled = next, "Setting updated");
        Ok(settings)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
