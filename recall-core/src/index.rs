//! Retrieval index: ordered, sub-linear lookup over live records.
//!
//! Each session owns a shard holding its records in retention-priority
//! order (importance × recency at last rescore). Insert, remove, and
//! rescore are logarithmic; queries draw a bounded candidate set from the
//! top of the order instead of scanning the session, and maintenance draws
//! its batches from the bottom. No operation rebuilds the structure.

use crate::record::RecordId;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};

/// Priority resolution. Quantizing to integer keys keeps the ordered set
/// key `Ord` without pulling float-ordering wrappers into the tree.
const PRIORITY_SCALE: f64 = 1_000_000_000.0;

fn quantize(priority: f64) -> u64 {
    (priority.clamp(0.0, 1.0) * PRIORITY_SCALE) as u64
}

#[derive(Debug, Default)]
struct Shard {
    // Ascending priority; ties resolved by id so entries are unique.
    by_priority: BTreeSet<(u64, RecordId)>,
    keys: HashMap<RecordId, u64>,
}

impl Shard {
    fn upsert(&mut self, id: RecordId, priority: f64) {
        let key = quantize(priority);
        if let Some(old) = self.keys.insert(id, key) {
            self.by_priority.remove(&(old, id));
        }
        self.by_priority.insert((key, id));
    }

    fn remove(&mut self, id: RecordId) -> bool {
        match self.keys.remove(&id) {
            Some(key) => {
                self.by_priority.remove(&(key, id));
                true
            }
            None => false,
        }
    }
}

/// Ordered retrieval structure over all sessions.
#[derive(Debug, Default)]
pub struct RetrievalIndex {
    shards: DashMap<String, Shard>,
}

impl RetrievalIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record or repositions it after a rescore.
    /// `priority` is the record's retention priority in `[0, 1]`.
    pub fn upsert(&self, session_id: &str, id: RecordId, priority: f64) {
        self.shards
            .entry(session_id.to_string())
            .or_default()
            .upsert(id, priority);
    }

    /// Removes a record from its session shard. Idempotent.
    pub fn remove(&self, session_id: &str, id: RecordId) -> bool {
        self.shards
            .get_mut(session_id)
            .map(|mut shard| shard.remove(id))
            .unwrap_or(false)
    }

    /// Drops a session's entire shard.
    pub fn clear_session(&self, session_id: &str) {
        self.shards.remove(session_id);
    }

    /// Returns up to `n` record ids from the top of the priority order
    /// (highest retention priority first). This is the bounded candidate
    /// set for ranked queries.
    pub fn top_candidates(&self, session_id: &str, n: usize) -> Vec<RecordId> {
        self.shards
            .get(session_id)
            .map(|shard| {
                shard
                    .by_priority
                    .iter()
                    .rev()
                    .take(n)
                    .map(|(_, id)| *id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns up to `n` record ids from the bottom of the priority order
    /// (lowest retention priority first). Maintenance selects its batches
    /// here.
    pub fn bottom_candidates(&self, session_id: &str, n: usize) -> Vec<RecordId> {
        self.shards
            .get(session_id)
            .map(|shard| {
                shard
                    .by_priority
                    .iter()
                    .take(n)
                    .map(|(_, id)| *id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns every indexed id for a session, in priority order.
    pub fn ids(&self, session_id: &str) -> Vec<RecordId> {
        self.shards
            .get(session_id)
            .map(|shard| shard.by_priority.iter().map(|(_, id)| *id).collect())
            .unwrap_or_default()
    }

    /// Number of indexed records in a session.
    pub fn len(&self, session_id: &str) -> usize {
        self.shards
            .get(session_id)
            .map(|shard| shard.keys.len())
            .unwrap_or(0)
    }

    /// Returns true if the session shard is empty or absent.
    pub fn is_empty(&self, session_id: &str) -> bool {
        self.len(session_id) == 0
    }

    /// Returns true if the record is indexed under the session.
    pub fn contains(&self, session_id: &str, id: RecordId) -> bool {
        self.shards
            .get(session_id)
            .map(|shard| shard.keys.contains_key(&id))
            .unwrap_or(false)
    }
}
