//! Importance scoring for memory records.
//!
//! Importance is a weighted combination of:
//! - Recency decay (exponential, configurable half-life)
//! - Access frequency (saturating logarithmic growth)
//! - Explicit salience signal (caller-supplied hint, highest fixed weight)
//!
//! Callers never set importance directly; the engine recomputes it on
//! write, on read hits, and periodically for idle records.

use crate::error::{MemoryError, Result};
use crate::record::{MemoryRecord, SalienceHint};

/// Access count at which the frequency component saturates at 1.0.
const FREQUENCY_SATURATION: u64 = 64;

/// Configuration for importance-scoring weights.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Weight for recency decay (0.0-1.0)
    pub recency_weight: f64,

    /// Weight for access frequency (0.0-1.0)
    pub frequency_weight: f64,

    /// Weight for the explicit salience hint (0.0-1.0). Fixed highest of
    /// the three by default so user-critical content dominates retention.
    pub explicit_weight: f64,

    /// Half-life for recency decay, in seconds (age for the recency
    /// component to drop to ~37%).
    pub recency_half_life_secs: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            recency_weight: 0.3,
            frequency_weight: 0.2,
            explicit_weight: 0.5,
            recency_half_life_secs: 86_400.0,
        }
    }
}

impl ScoringConfig {
    /// Creates a config with custom weights.
    ///
    /// # Panics
    /// Panics if weights don't sum to approximately 1.0 (within 0.01
    /// tolerance).
    pub fn with_weights(recency: f64, frequency: f64, explicit: f64) -> Self {
        let sum = recency + frequency + explicit;
        assert!(
            (sum - 1.0).abs() < 0.01,
            "Weights must sum to 1.0, got {sum}"
        );

        Self {
            recency_weight: recency,
            frequency_weight: frequency,
            explicit_weight: explicit,
            ..Default::default()
        }
    }

    /// Sets the recency half-life in seconds.
    pub fn with_half_life_secs(mut self, secs: f64) -> Self {
        self.recency_half_life_secs = secs;
        self
    }

    /// Returns the total of all weights (should be 1.0).
    pub fn total_weight(&self) -> f64 {
        self.recency_weight + self.frequency_weight + self.explicit_weight
    }

    /// Validates the configuration without panicking.
    pub fn validate(&self) -> Result<()> {
        if (self.total_weight() - 1.0).abs() >= 0.01 {
            return Err(MemoryError::Config(format!(
                "scoring weights must sum to 1.0, got {}",
                self.total_weight()
            )));
        }
        if self.recency_half_life_secs <= 0.0 {
            return Err(MemoryError::Config(
                "recency_half_life_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Computes importance scores for memory records.
#[derive(Debug, Clone)]
pub struct ImportanceScorer {
    config: ScoringConfig,
}

impl Default for ImportanceScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl ImportanceScorer {
    /// Creates a new ImportanceScorer with the given configuration.
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Computes the recency component with exponential decay.
    ///
    /// Formula: e^(-age / half_life)
    ///
    /// With the default 24h half-life:
    /// - 1h ago: ~0.96
    /// - 24h ago: ~0.37
    /// - 72h ago: ~0.05
    pub fn recency_score(&self, age_secs: i64) -> f64 {
        if age_secs < 0 {
            return 1.0;
        }

        (-(age_secs as f64) / self.config.recency_half_life_secs).exp()
    }

    /// Computes the frequency component with saturating logarithmic growth,
    /// so frequent access cannot dominate indefinitely.
    ///
    /// Formula: ln(1 + n) / ln(1 + saturation), capped at 1.0.
    pub fn frequency_score(&self, access_count: u64) -> f64 {
        let n = access_count.min(FREQUENCY_SATURATION) as f64;
        (1.0 + n).ln() / (1.0 + FREQUENCY_SATURATION as f64).ln()
    }

    /// Computes the explicit-signal component from the salience hint.
    /// Records written without a hint contribute zero here.
    pub fn explicit_score(&self, hint: Option<SalienceHint>) -> f64 {
        hint.map(SalienceHint::signal).unwrap_or(0.0)
    }

    /// Computes the full importance for a record at the given instant.
    ///
    /// The result is a weighted sum normalized to `[0, 1]`. Kind, source
    /// ids, and content never influence the computation and are never
    /// mutated by it.
    pub fn score(&self, record: &MemoryRecord, now: i64) -> f64 {
        let recency = self.recency_score(record.age_secs(now));
        let frequency = self.frequency_score(record.access_count);
        let explicit = self.explicit_score(record.hint);

        let total = recency * self.config.recency_weight
            + frequency * self.config.frequency_weight
            + explicit * self.config.explicit_weight;

        total.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordId;

    #[test]
    fn test_scoring_config_default() {
        let config = ScoringConfig::default();

        assert!((config.total_weight() - 1.0).abs() < 0.001);
        assert_eq!(config.recency_weight, 0.3);
        assert_eq!(config.frequency_weight, 0.2);
        assert_eq!(config.explicit_weight, 0.5);
    }

    #[test]
    fn test_scoring_config_custom_weights() {
        let config = ScoringConfig::with_weights(0.4, 0.2, 0.4);

        assert_eq!(config.recency_weight, 0.4);
        assert_eq!(config.explicit_weight, 0.4);
    }

    #[test]
    #[should_panic(expected = "Weights must sum to 1.0")]
    fn test_scoring_config_invalid_weights() {
        ScoringConfig::with_weights(0.5, 0.5, 0.5); // Sum = 1.5
    }

    #[test]
    fn test_scoring_config_validate() {
        assert!(ScoringConfig::default().validate().is_ok());

        let bad = ScoringConfig {
            recency_weight: 0.9,
            frequency_weight: 0.9,
            explicit_weight: 0.9,
            recency_half_life_secs: 3600.0,
        };
        assert!(bad.validate().is_err());

        let zero_half_life = ScoringConfig::default().with_half_life_secs(0.0);
        assert!(zero_half_life.validate().is_err());
    }

    #[test]
    fn test_recency_score_decay() {
        let scorer = ImportanceScorer::default();

        // 0 seconds = 1.0
        let score_0 = scorer.recency_score(0);
        assert!((score_0 - 1.0).abs() < 0.001);

        // 1 hour ≈ 0.959 (e^(-3600/86400))
        let score_1h = scorer.recency_score(3600);
        assert!((score_1h - 0.959).abs() < 0.01);

        // 24 hours ≈ 0.368 (e^(-1))
        let score_24h = scorer.recency_score(86_400);
        assert!((score_24h - 0.368).abs() < 0.01);

        // 72 hours ≈ 0.050 (e^(-3))
        let score_72h = scorer.recency_score(259_200);
        assert!((score_72h - 0.050).abs() < 0.01);
    }

    #[test]
    fn test_recency_score_future() {
        let scorer = ImportanceScorer::default();
        assert_eq!(scorer.recency_score(-10), 1.0);
    }

    #[test]
    fn test_frequency_score_saturates() {
        let scorer = ImportanceScorer::default();

        assert_eq!(scorer.frequency_score(0), 0.0);
        assert!(scorer.frequency_score(1) > 0.0);
        assert!(scorer.frequency_score(10) > scorer.frequency_score(1));

        // Saturation: growth stops at the cap
        let at_cap = scorer.frequency_score(FREQUENCY_SATURATION);
        assert!((at_cap - 1.0).abs() < 0.001);
        assert_eq!(scorer.frequency_score(10_000), at_cap);
    }

    #[test]
    fn test_frequency_score_is_sublinear() {
        let scorer = ImportanceScorer::default();

        // Doubling the count must not double the score
        let s8 = scorer.frequency_score(8);
        let s16 = scorer.frequency_score(16);
        assert!(s16 < 2.0 * s8);
    }

    #[test]
    fn test_explicit_score() {
        let scorer = ImportanceScorer::default();

        assert_eq!(scorer.explicit_score(None), 0.0);
        assert_eq!(scorer.explicit_score(Some(SalienceHint::Critical)), 1.0);
        assert!(
            scorer.explicit_score(Some(SalienceHint::Notable))
                > scorer.explicit_score(Some(SalienceHint::Routine))
        );
    }

    #[test]
    fn test_score_combined_fresh_critical() {
        let scorer = ImportanceScorer::default();
        let now = 1_700_000_000;
        let rec = MemoryRecord::raw(RecordId(1), "s", "x", Some(SalienceHint::Critical), now);

        // recency 1.0 * 0.3 + frequency 0.0 * 0.2 + explicit 1.0 * 0.5 = 0.8
        let score = scorer.score(&rec, now);
        assert!((score - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_score_ordinary_record_decays() {
        let scorer = ImportanceScorer::default();
        let now = 1_700_000_000;
        let rec = MemoryRecord::raw(RecordId(1), "s", "x", None, now);

        let fresh = scorer.score(&rec, now);
        let aged = scorer.score(&rec, now + 7 * 86_400);

        assert!((fresh - 0.3).abs() < 0.001);
        assert!(aged < fresh);
        assert!(aged < 0.01);
    }

    #[test]
    fn test_score_stays_in_unit_interval() {
        let scorer = ImportanceScorer::default();
        let now = 1_700_000_000;
        let mut rec = MemoryRecord::raw(RecordId(1), "s", "x", Some(SalienceHint::Critical), now);
        rec.access_count = 1_000_000;

        let score = scorer.score(&rec, now);
        assert!((0.0..=1.0).contains(&score));
    }
}
