//! In-memory record store.
//!
//! Owns the raw content and metadata of every live record, keyed by id,
//! with an ordered per-session view for enumeration. Individual operations
//! are atomic with respect to a single record; the batch swap used by
//! summarization is all-or-nothing.

use crate::error::{MemoryError, Result};
use crate::record::{MemoryRecord, RecordId};
use dashmap::DashMap;
use std::collections::BTreeSet;

/// Durable keyed storage of live memory records.
///
/// Thread-safe by construction; per-session mutation ordering is the
/// engine's responsibility (it serializes writers within a session).
#[derive(Debug, Default)]
pub struct RecordStore {
    records: DashMap<RecordId, MemoryRecord>,
    // (created_at, id) gives a stable creation-time ordering per session.
    by_session: DashMap<String, BTreeSet<(i64, RecordId)>>,
}

impl RecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a record by id.
    pub fn put(&self, record: MemoryRecord) {
        if let Some(old) = self.records.get(&record.id).map(|r| r.clone()) {
            if let Some(mut set) = self.by_session.get_mut(&old.session_id) {
                set.remove(&(old.created_at, old.id));
            }
        }

        self.by_session
            .entry(record.session_id.clone())
            .or_default()
            .insert((record.created_at, record.id));
        self.records.insert(record.id, record);
    }

    /// Returns a copy of the record, or `NotFound`.
    pub fn get(&self, id: RecordId) -> Result<MemoryRecord> {
        self.records
            .get(&id)
            .map(|r| r.clone())
            .ok_or(MemoryError::NotFound(id))
    }

    /// Returns true if a record with this id is live.
    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    /// Applies a mutation to the record in place and returns the updated
    /// copy, or `NotFound`.
    pub fn update<F>(&self, id: RecordId, f: F) -> Result<MemoryRecord>
    where
        F: FnOnce(&mut MemoryRecord),
    {
        let mut entry = self.records.get_mut(&id).ok_or(MemoryError::NotFound(id))?;
        f(entry.value_mut());
        Ok(entry.clone())
    }

    /// Deletes a record. Idempotent: deleting an absent id is a no-op and
    /// returns false.
    pub fn delete(&self, id: RecordId) -> bool {
        match self.records.remove(&id) {
            Some((_, record)) => {
                if let Some(mut set) = self.by_session.get_mut(&record.session_id) {
                    set.remove(&(record.created_at, record.id));
                }
                true
            }
            None => false,
        }
    }

    /// Returns the session's records ordered by creation time. The
    /// sequence is finite and restartable: call again to re-enumerate.
    pub fn list_by_session(&self, session_id: &str) -> Vec<MemoryRecord> {
        self.session_ids(session_id)
            .into_iter()
            .filter_map(|id| self.records.get(&id).map(|r| r.clone()))
            .collect()
    }

    /// Returns the session's record ids in creation order.
    pub fn session_ids(&self, session_id: &str) -> Vec<RecordId> {
        self.by_session
            .get(session_id)
            .map(|set| set.iter().map(|(_, id)| *id).collect())
            .unwrap_or_default()
    }

    /// Number of live records in a session.
    pub fn len_session(&self, session_id: &str) -> usize {
        self.by_session
            .get(session_id)
            .map(|set| set.len())
            .unwrap_or(0)
    }

    /// Removes every record in a session, returning the removed ids.
    pub fn clear_session(&self, session_id: &str) -> Vec<RecordId> {
        let ids: Vec<RecordId> = self
            .by_session
            .remove(session_id)
            .map(|(_, set)| set.into_iter().map(|(_, id)| id).collect())
            .unwrap_or_default();

        for id in &ids {
            self.records.remove(id);
        }
        ids
    }

    /// Atomically replaces a batch of source records with one summary:
    /// either every source is removed and the summary inserted, or the
    /// store is left unchanged and the error surfaces.
    pub fn replace_batch(
        &self,
        source_ids: &BTreeSet<RecordId>,
        summary: MemoryRecord,
    ) -> Result<()> {
        if source_ids.is_empty() {
            return Err(MemoryError::EmptyBatch);
        }

        // Validate everything before touching anything.
        for id in source_ids {
            let record = self
                .records
                .get(id)
                .ok_or_else(|| MemoryError::summarization(format!("source {id} is not live")))?;
            if record.session_id != summary.session_id {
                return Err(MemoryError::cross_session(
                    summary.session_id.clone(),
                    record.session_id.clone(),
                ));
            }
        }

        for id in source_ids {
            self.delete(*id);
        }
        self.put(summary);
        Ok(())
    }
}
