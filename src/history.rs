use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;

/// Key the history list is stored under.
pub const HISTORY_KEY: &str = "caption-studio.history";

/// Most records kept; older ones are dropped silently.
pub const MAX_HISTORY: usize = 10;

/// One finished caption, as shown in the history list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionRecord {
    pub image_data: String,
    pub caption: String,
    pub timestamp: String,
    pub inference_time_seconds: f64,
    pub prompt: Option<String>,
    pub file_name: String,
}

impl CaptionRecord {
    pub fn prompt_label(&self) -> &str {
        self.prompt.as_deref().unwrap_or("No prompt")
    }

    /// Splits `image_data` back into its content type and raw bytes.
    pub fn decode_image(&self) -> Option<(String, Vec<u8>)> {
        let (header, payload) = self.image_data.strip_prefix("data:")?.split_once(',')?;
        let content_type = header.strip_suffix(";base64")?;
        let bytes = general_purpose::STANDARD.decode(payload).ok()?;
        Some((content_type.to_string(), bytes))
    }
}

/// Durable string key-value storage.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// All entries live in one JSON object file. A missing file reads as empty.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        // A file that is not valid JSON is replaced; I/O failures are not.
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(StoreError::Json(e)) => {
                warn!("discarding unreadable store {}: {}", self.path.display(), e);
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(StoreError::Json(_)) => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        entries.remove(key);
        self.write_entries(&entries)
    }
}

/// Newest-first caption history backed by a [`KeyValueStore`].
pub struct HistoryStore {
    store: Box<dyn KeyValueStore>,
    records: Vec<CaptionRecord>,
}

impl HistoryStore {
    /// Wraps `store` and loads whatever history it already holds.
    pub fn open(store: impl KeyValueStore + 'static) -> Self {
        let mut history = Self {
            store: Box::new(store),
            records: Vec::new(),
        };
        history.load();
        history
    }

    /// Re-reads the stored list. Missing or corrupt data yields an empty list.
    pub fn load(&mut self) -> &[CaptionRecord] {
        self.records = match self.store.get(HISTORY_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<CaptionRecord>>(&raw) {
                Ok(mut records) => {
                    records.truncate(MAX_HISTORY);
                    records
                }
                Err(e) => {
                    warn!("ignoring corrupt caption history: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("could not read caption history: {}", e);
                Vec::new()
            }
        };
        debug!("loaded {} history records", self.records.len());
        &self.records
    }

    /// Replaces the whole list, keeping at most [`MAX_HISTORY`] entries.
    pub fn save(&mut self, mut records: Vec<CaptionRecord>) -> Result<(), StoreError> {
        records.truncate(MAX_HISTORY);
        self.records = records;
        self.persist()
    }

    /// Puts `record` first and evicts the oldest past the cap.
    ///
    /// The in-memory list is updated even when persisting fails.
    pub fn append(&mut self, record: CaptionRecord) -> Result<(), StoreError> {
        self.records.insert(0, record);
        self.records.truncate(MAX_HISTORY);
        self.persist()
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.records.clear();
        self.store.remove(HISTORY_KEY)
    }

    pub fn records(&self) -> &[CaptionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&self.records)?;
        self.store.set(HISTORY_KEY, &raw)
    }
}
