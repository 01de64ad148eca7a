//! Summarization: lossy compression of a batch of records into one.
//!
//! The engine triggers summarization during maintenance; the summarizer
//! never schedules itself. The text-compression strategy is a capability
//! interface so an LLM-backed implementation can replace the extractive
//! default via configuration.

use crate::error::{MemoryError, Result};
use crate::record::{MemoryRecord, RecordId};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Capability interface for compressing record contents into one text.
pub trait SummaryStrategy: Send + Sync {
    /// Produces a compressed representation of the batch contents,
    /// preserving salient information.
    fn condense(&self, records: &[MemoryRecord]) -> Result<String>;
}

/// Default extractive strategy: one fragment per record, first sentence
/// plus last sentence when the content is long. For production-grade
/// compression, plug in an abstractive (LLM-backed) strategy instead.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    /// Content length above which both first and last sentence are kept.
    long_content_threshold: usize,
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self {
            long_content_threshold: 500,
        }
    }
}

impl ExtractiveSummarizer {
    /// Creates a strategy with a custom long-content threshold.
    pub fn new(long_content_threshold: usize) -> Self {
        Self {
            long_content_threshold,
        }
    }

    fn fragment(&self, content: &str) -> String {
        let sentences: Vec<&str> = content
            .split(['.', '!', '?'])
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        match sentences.len() {
            0 => content.chars().take(80).collect(),
            1 => sentences[0].to_string(),
            _ if content.len() > self.long_content_threshold => {
                format!("{} ... {}", sentences[0], sentences[sentences.len() - 1])
            }
            _ => sentences[0].to_string(),
        }
    }
}

impl SummaryStrategy for ExtractiveSummarizer {
    fn condense(&self, records: &[MemoryRecord]) -> Result<String> {
        let fragments: Vec<String> = records
            .iter()
            .map(|r| self.fragment(&r.content))
            .filter(|f| !f.is_empty())
            .collect();

        if fragments.is_empty() {
            return Err(MemoryError::summarization(
                "batch contents condensed to nothing",
            ));
        }

        Ok(fragments.join("; "))
    }
}

/// Builds summary records from maintenance batches.
pub struct Summarizer {
    strategy: Arc<dyn SummaryStrategy>,
}

impl Summarizer {
    /// Creates a summarizer using the given compression strategy.
    pub fn new(strategy: Arc<dyn SummaryStrategy>) -> Self {
        Self { strategy }
    }

    /// Compresses a non-empty, same-session batch into exactly one
    /// Summary record.
    ///
    /// The summary's importance starts at the maximum importance among
    /// its inputs, so a summary is never forgotten faster than its most
    /// important source. `source_ids` is the input id set; every source
    /// must predate `summary_id` (cycles are rejected).
    pub fn summarize(
        &self,
        records: &[MemoryRecord],
        summary_id: RecordId,
        now: i64,
    ) -> Result<MemoryRecord> {
        let first = records.first().ok_or(MemoryError::EmptyBatch)?;

        for record in records {
            if record.session_id != first.session_id {
                return Err(MemoryError::cross_session(
                    first.session_id.clone(),
                    record.session_id.clone(),
                ));
            }
            if record.id >= summary_id {
                return Err(MemoryError::summarization(format!(
                    "source {} postdates summary {summary_id}",
                    record.id
                )));
            }
        }

        let content = self.strategy.condense(records)?;
        let importance = records.iter().map(|r| r.importance).fold(0.0, f64::max);
        let source_ids: BTreeSet<RecordId> = records.iter().map(|r| r.id).collect();

        Ok(MemoryRecord::summary(
            summary_id,
            first.session_id.clone(),
            content,
            source_ids,
            importance,
            now,
        ))
    }
}
