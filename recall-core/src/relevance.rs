//! Pluggable relevance scoring for retrieval queries.
//!
//! The retrieval index is agnostic to how relevance is computed: anything
//! implementing [`RelevanceEstimator`] can be plugged in, from the built-in
//! bag-of-terms overlap to an external embedding similarity provider.

use crate::record::MemoryRecord;
use std::collections::HashSet;

/// Context for querying memory.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    /// The search query text
    pub query: String,
}

impl QueryContext {
    /// Creates a new QueryContext with a query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

/// Capability interface for relevance scoring.
///
/// Implementations return a score in `[0, 1]`: 0.0 means unrelated, 1.0
/// means a perfect match. No latency bound is assumed beyond "fast enough
/// for interactive reads".
pub trait RelevanceEstimator: Send + Sync {
    /// Scores how relevant a record is to the query context.
    fn relevance(&self, record: &MemoryRecord, ctx: &QueryContext) -> f64;
}

/// Default relevance estimator: bag-of-terms overlap.
///
/// Both the query and the record content are lowercased and split into
/// alphanumeric terms; the score is the Jaccard index of the two term sets,
/// boosted to at least 0.5 when every query term appears in the record so
/// exact matches always rank.
#[derive(Debug, Clone, Default)]
pub struct TermOverlapRelevance;

impl TermOverlapRelevance {
    /// Splits text into lowercased alphanumeric terms.
    fn terms(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }
}

impl RelevanceEstimator for TermOverlapRelevance {
    fn relevance(&self, record: &MemoryRecord, ctx: &QueryContext) -> f64 {
        let query_terms = Self::terms(&ctx.query);
        let content_terms = Self::terms(&record.content);

        if query_terms.is_empty() || content_terms.is_empty() {
            return 0.0;
        }

        let intersection = query_terms.intersection(&content_terms).count();
        if intersection == 0 {
            return 0.0;
        }

        let union = query_terms.union(&content_terms).count();
        let jaccard = intersection as f64 / union as f64;

        // A record containing every query term is an exact match for
        // retrieval purposes even when its content has many other terms.
        if intersection == query_terms.len() {
            jaccard.max(0.5)
        } else {
            jaccard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordId;

    fn record(content: &str) -> MemoryRecord {
        MemoryRecord::raw(RecordId(1), "s", content, None, 0)
    }

    #[test]
    fn test_no_overlap_scores_zero() {
        let est = TermOverlapRelevance;
        let rec = record("the deploy failed on staging");
        let ctx = QueryContext::new("database migration");

        assert_eq!(est.relevance(&rec, &ctx), 0.0);
    }

    #[test]
    fn test_identical_text_scores_one() {
        let est = TermOverlapRelevance;
        let rec = record("rotate the api keys");
        let ctx = QueryContext::new("rotate the api keys");

        assert_eq!(est.relevance(&rec, &ctx), 1.0);
    }

    #[test]
    fn test_partial_overlap_is_jaccard() {
        let est = TermOverlapRelevance;
        // query = {deploy, staging}, content = {deploy, failed}
        // intersection = 1, union = 3 -> 1/3
        let rec = record("deploy failed");
        let ctx = QueryContext::new("deploy staging");

        let score = est.relevance(&rec, &ctx);
        assert!((score - 1.0 / 3.0).abs() < 0.001);
    }

    #[test]
    fn test_all_query_terms_present_gets_floor() {
        let est = TermOverlapRelevance;
        let rec = record(
            "we talked about api keys and then about staging deploys and the incident runbook",
        );
        let ctx = QueryContext::new("api keys");

        // Raw Jaccard would be tiny; containment boosts to at least 0.5
        assert!(est.relevance(&rec, &ctx) >= 0.5);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let est = TermOverlapRelevance;
        let rec = record("Rotate the API keys!");
        let ctx = QueryContext::new("rotate api KEYS");

        assert!(est.relevance(&rec, &ctx) >= 0.5);
    }

    #[test]
    fn test_empty_query_scores_zero() {
        let est = TermOverlapRelevance;
        let rec = record("anything");
        let ctx = QueryContext::new("");

        assert_eq!(est.relevance(&rec, &ctx), 0.0);
    }
}
