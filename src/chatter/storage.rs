//! Durable storage for chatter records.
//!
//! Storage calls block. Providers run them on the blocking pool, never on
//! the task handling chat events.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::debug;
use uuid::Uuid;

use super::ChatterRecord;
use crate::Result;

/// Backend holding one record per user.
pub trait ChatterStorage: Send + Sync + 'static {
    /// Read a record. `Ok(None)` when nothing was stored for the id.
    fn read(&self, id: Uuid) -> Result<Option<ChatterRecord>>;

    /// Write a record, replacing any previous one for the same id.
    fn write(&self, record: &ChatterRecord) -> Result<()>;
}

/// Stores each chatter as a pretty-printed JSON file named by its id.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    /// Use `dir` for records. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `id`.
    pub fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl ChatterStorage for JsonFileStorage {
    fn read(&self, id: Uuid) -> Result<Option<ChatterRecord>> {
        let path = self.path_for(id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "Read chatter record");
        Ok(Some(record))
    }

    fn write(&self, record: &ChatterRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(record.id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(record)?;

        // Write then rename so a crash never leaves a truncated record
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), "Wrote chatter record");
        Ok(())
    }
}

/// Keeps records in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<Uuid, ChatterRecord>>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChatterStorage for MemoryStorage {
    fn read(&self, id: Uuid) -> Result<Option<ChatterRecord>> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }

    fn write(&self, record: &ChatterRecord) -> Result<()> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id, record.clone());
        Ok(())
    }
}
