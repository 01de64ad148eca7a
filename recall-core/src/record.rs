//! Memory record types stored and indexed by the engine.
//!
//! Records are immutable once created except for the access-tracking fields
//! (`importance`, `last_accessed_at`, `access_count`), which only the engine
//! mutates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Unique identifier for a memory record.
///
/// Ids are assigned from a monotonic counter for the lifetime of an engine
/// instance and are never reused, even after deletion. The total order on
/// ids doubles as creation order, which is what the retrieval tie-break and
/// the summary acyclicity check rely on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct RecordId(
    /// Raw numeric value.
    pub u64,
);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rec-{}", self.0)
    }
}

/// Caller-supplied salience hint attached to a record at write time.
///
/// The hint feeds the explicit-signal component of importance scoring and
/// carries the highest fixed weight, so a `Critical` record resists eviction
/// far longer than an ordinary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalienceHint {
    /// Ordinary conversational content.
    Routine,
    /// Worth keeping around longer than average.
    Notable,
    /// User-critical content that must never be silently discarded.
    Critical,
}

impl SalienceHint {
    /// Returns the explicit-signal value in `[0, 1]` for this hint.
    pub fn signal(self) -> f64 {
        match self {
            SalienceHint::Routine => 0.2,
            SalienceHint::Notable => 0.6,
            SalienceHint::Critical => 1.0,
        }
    }
}

/// Discriminates raw interaction records from synthetic summaries.
///
/// The kind is fixed at creation. A Summary's `source_ids` is a
/// back-reference to the records it replaced, not an ownership link; the
/// sources are deleted when the summary is installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordKind {
    /// A record written directly by a caller.
    Raw,
    /// A synthetic record produced by summarizing a batch of sources.
    Summary {
        /// Ids of the records this summary replaced. Every source id
        /// strictly predates the summary's own id.
        source_ids: BTreeSet<RecordId>,
    },
}

/// A unit of stored conversational memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique, immutable identifier assigned at creation.
    pub id: RecordId,

    /// Conversation this record belongs to. Never reassigned.
    pub session_id: String,

    /// Opaque text payload.
    pub content: String,

    /// Unix timestamp of creation.
    pub created_at: i64,

    /// Unix timestamp of the most recent retrieval hit.
    pub last_accessed_at: i64,

    /// Derived retention score in `[0, 1]`, recomputed by the scorer.
    /// Never set directly by callers.
    pub importance: f64,

    /// Number of retrieval hits. Monotonically non-decreasing.
    pub access_count: u64,

    /// Raw or Summary. Fixed at creation.
    #[serde(flatten)]
    pub kind: RecordKind,

    /// Salience hint supplied at write time, folded into every rescore.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<SalienceHint>,
}

impl MemoryRecord {
    /// Creates a new raw record.
    pub fn raw(
        id: RecordId,
        session_id: impl Into<String>,
        content: impl Into<String>,
        hint: Option<SalienceHint>,
        now: i64,
    ) -> Self {
        Self {
            id,
            session_id: session_id.into(),
            content: content.into(),
            created_at: now,
            last_accessed_at: now,
            importance: 0.0,
            access_count: 0,
            kind: RecordKind::Raw,
            hint,
        }
    }

    /// Creates a summary record replacing the given sources.
    pub fn summary(
        id: RecordId,
        session_id: impl Into<String>,
        content: impl Into<String>,
        source_ids: BTreeSet<RecordId>,
        importance: f64,
        now: i64,
    ) -> Self {
        Self {
            id,
            session_id: session_id.into(),
            content: content.into(),
            created_at: now,
            last_accessed_at: now,
            importance,
            access_count: 0,
            kind: RecordKind::Summary { source_ids },
            hint: None,
        }
    }

    /// Returns true if this is a summary record.
    pub fn is_summary(&self) -> bool {
        matches!(self.kind, RecordKind::Summary { .. })
    }

    /// Age of the record in seconds at the given instant.
    pub fn age_secs(&self, now: i64) -> i64 {
        (now - self.created_at).max(0)
    }

    /// Seconds since the last retrieval hit at the given instant.
    pub fn idle_secs(&self, now: i64) -> i64 {
        (now - self.last_accessed_at).max(0)
    }

    /// Records a retrieval hit: bumps the access count and refreshes the
    /// last-accessed timestamp. Content, kind, and sources are untouched.
    pub fn touch(&mut self, now: i64) {
        self.access_count += 1;
        self.last_accessed_at = now;
    }
}
