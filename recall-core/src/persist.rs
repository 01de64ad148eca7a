//! Durability collaborator behind the record store.
//!
//! The engine treats durability as an external concern behind the
//! [`PersistenceBackend`] trait: a disk file, an embedded database, or a
//! remote store can all sit here. Writes fail fast with
//! `PersistenceUnavailable` when the collaborator is down; reads keep
//! serving from the in-memory store.

use crate::error::{MemoryError, Result};
use crate::record::{MemoryRecord, RecordId};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Trait for durability backends.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Persists a single record.
    async fn persist(&self, record: &MemoryRecord) -> Result<()>;

    /// Loads a record by id, or `NotFound`.
    async fn load(&self, id: RecordId) -> Result<MemoryRecord>;

    /// Removes a record. Idempotent.
    async fn delete(&self, id: RecordId) -> Result<()>;

    /// Removes every record belonging to a session.
    async fn delete_all(&self, session_id: &str) -> Result<()>;

    /// Checks whether the backend is reachable.
    async fn health_check(&self) -> Result<bool>;
}

/// In-memory persistence backend.
///
/// The default backend for tests and for deployments that accept
/// process-lifetime durability. The health toggle lets tests exercise the
/// fail-fast write path.
#[derive(Debug)]
pub struct InMemoryPersistence {
    records: DashMap<RecordId, MemoryRecord>,
    healthy: AtomicBool,
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPersistence {
    /// Creates an empty, healthy backend.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            healthy: AtomicBool::new(true),
        }
    }

    /// Marks the backend up or down. While down, every operation fails
    /// with `PersistenceUnavailable`.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of persisted records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is persisted.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn check(&self) -> Result<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MemoryError::persistence("backend marked unavailable"))
        }
    }
}

#[async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn persist(&self, record: &MemoryRecord) -> Result<()> {
        self.check()?;
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, id: RecordId) -> Result<MemoryRecord> {
        self.check()?;
        self.records
            .get(&id)
            .map(|r| r.clone())
            .ok_or(MemoryError::NotFound(id))
    }

    async fn delete(&self, id: RecordId) -> Result<()> {
        self.check()?;
        self.records.remove(&id);
        Ok(())
    }

    async fn delete_all(&self, session_id: &str) -> Result<()> {
        self.check()?;
        self.records.retain(|_, r| r.session_id != session_id);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.healthy.load(Ordering::SeqCst))
    }
}

/// One line of the JSONL operation log.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Put { record: MemoryRecord },
    Delete { id: RecordId },
    Clear { session_id: String },
}

#[derive(Debug, Default)]
struct JsonlState {
    cache: HashMap<RecordId, MemoryRecord>,
}

/// File-backed persistence: an append-only JSON-lines operation log with
/// an in-memory read cache, compacted whenever a session is cleared.
#[derive(Debug)]
pub struct JsonlPersistence {
    path: PathBuf,
    state: Mutex<JsonlState>,
}

impl JsonlPersistence {
    /// Opens (or creates) the log at `path` and replays it into the cache.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut state = JsonlState::default();

        if path.exists() {
            let file = File::open(&path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogEntry>(&line)? {
                    LogEntry::Put { record } => {
                        state.cache.insert(record.id, record);
                    }
                    LogEntry::Delete { id } => {
                        state.cache.remove(&id);
                    }
                    LogEntry::Clear { session_id } => {
                        state.cache.retain(|_, r| r.session_id != session_id);
                    }
                }
            }
        }

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Number of live records in the log.
    pub fn len(&self) -> usize {
        self.state.lock().cache.len()
    }

    /// Returns true if the log holds no live records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append(&self, entry: &LogEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Rewrites the log from the live cache, dropping superseded entries.
    fn compact(&self, state: &JsonlState) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            for record in state.cache.values() {
                let line = serde_json::to_string(&LogEntry::Put {
                    record: record.clone(),
                })?;
                writeln!(file, "{line}")?;
            }
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceBackend for JsonlPersistence {
    async fn persist(&self, record: &MemoryRecord) -> Result<()> {
        let mut state = self.state.lock();
        self.append(&LogEntry::Put {
            record: record.clone(),
        })?;
        state.cache.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, id: RecordId) -> Result<MemoryRecord> {
        self.state
            .lock()
            .cache
            .get(&id)
            .cloned()
            .ok_or(MemoryError::NotFound(id))
    }

    async fn delete(&self, id: RecordId) -> Result<()> {
        let mut state = self.state.lock();
        if state.cache.remove(&id).is_some() {
            self.append(&LogEntry::Delete { id })?;
        }
        Ok(())
    }

    async fn delete_all(&self, session_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.cache.retain(|_, r| r.session_id != session_id);
        self.compact(&state)?;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        Ok(true)
    }
}
