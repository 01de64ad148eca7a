//! Engine configuration.

use crate::error::{MemoryError, Result};
use crate::scoring::ScoringConfig;
use std::time::Duration;

/// Configuration for retry logic used by maintenance cycles.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0) to add randomness to delays
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Returns the delay to sleep before the given retry attempt
    /// (0-based), with exponential backoff and jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let base = base.min(self.max_delay.as_secs_f64());

        let jitter = if self.jitter_factor > 0.0 {
            let jitter_range = base * self.jitter_factor;
            (rand::random::<f64>() * jitter_range - (jitter_range / 2.0)).abs()
        } else {
            0.0
        };

        Duration::from_secs_f64(base + jitter)
    }
}

/// Configuration for the memory engine.
///
/// All thresholds are per-session; there is no global capacity limit.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Soft record-count threshold per session. A session whose live count
    /// exceeds this goes over capacity and triggers maintenance.
    pub session_capacity_threshold: usize,

    /// Number of records selected per maintenance cycle.
    pub maintenance_batch_size: usize,

    /// Records younger than this are never selected for maintenance, so
    /// fresh context is never lost to summarization.
    pub min_age_for_summarization_secs: i64,

    /// A batch whose most important member scores below this floor is
    /// evicted outright instead of summarized.
    pub eviction_importance_floor: f64,

    /// Records at or above this importance are never auto-removed, neither
    /// evicted nor summarized.
    pub retention_importance_ceiling: f64,

    /// Importance-scoring weights and recency half-life.
    pub scoring: ScoringConfig,

    /// Maintenance deferral bound: forced after this many writes while over
    /// capacity, even if the staleness window has not elapsed.
    pub maintenance_max_deferred_writes: usize,

    /// Maintenance deferral bound: forced after this much wall time over
    /// capacity, even if few writes arrived.
    pub maintenance_max_staleness: Duration,

    /// Period of the background idle-record rescoring task.
    pub rescore_interval: Duration,

    /// Backoff policy for transient maintenance failures.
    pub retry: RetryConfig,

    /// Optional character budget for `read` results (~4 chars per token).
    /// When set, results are trimmed to the budget but at least one hit is
    /// always returned.
    pub context_char_budget: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_capacity_threshold: 100,
            maintenance_batch_size: 10,
            min_age_for_summarization_secs: 60,
            eviction_importance_floor: 0.2,
            retention_importance_ceiling: 0.8,
            scoring: ScoringConfig::default(),
            maintenance_max_deferred_writes: 25,
            maintenance_max_staleness: Duration::from_secs(2),
            rescore_interval: Duration::from_secs(60),
            retry: RetryConfig::default(),
            context_char_budget: None,
        }
    }
}

impl EngineConfig {
    /// Sets the per-session capacity threshold.
    pub fn with_capacity_threshold(mut self, threshold: usize) -> Self {
        self.session_capacity_threshold = threshold;
        self
    }

    /// Sets the maintenance batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.maintenance_batch_size = size;
        self
    }

    /// Sets the minimum age before a record becomes eligible for
    /// maintenance.
    pub fn with_min_age_secs(mut self, secs: i64) -> Self {
        self.min_age_for_summarization_secs = secs;
        self
    }

    /// Sets the eviction importance floor.
    pub fn with_eviction_floor(mut self, floor: f64) -> Self {
        self.eviction_importance_floor = floor;
        self
    }

    /// Sets the retention importance ceiling.
    pub fn with_retention_ceiling(mut self, ceiling: f64) -> Self {
        self.retention_importance_ceiling = ceiling;
        self
    }

    /// Sets the scoring configuration.
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    /// Sets the maintenance fairness bounds (N writes, T staleness).
    pub fn with_maintenance_bounds(mut self, max_writes: usize, max_staleness: Duration) -> Self {
        self.maintenance_max_deferred_writes = max_writes;
        self.maintenance_max_staleness = max_staleness;
        self
    }

    /// Sets the background rescoring interval.
    pub fn with_rescore_interval(mut self, interval: Duration) -> Self {
        self.rescore_interval = interval;
        self
    }

    /// Sets the character budget applied to `read` results.
    pub fn with_context_char_budget(mut self, budget: usize) -> Self {
        self.context_char_budget = Some(budget);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.session_capacity_threshold == 0 {
            return Err(MemoryError::Config(
                "session_capacity_threshold must be positive".into(),
            ));
        }
        if self.maintenance_batch_size == 0 {
            return Err(MemoryError::Config(
                "maintenance_batch_size must be positive".into(),
            ));
        }
        if self.eviction_importance_floor > self.retention_importance_ceiling {
            return Err(MemoryError::Config(format!(
                "eviction floor {} exceeds retention ceiling {}",
                self.eviction_importance_floor, self.retention_importance_ceiling
            )));
        }
        if !(0.0..=1.0).contains(&self.eviction_importance_floor)
            || !(0.0..=1.0).contains(&self.retention_importance_ceiling)
        {
            return Err(MemoryError::Config(
                "importance thresholds must be in [0, 1]".into(),
            ));
        }
        self.scoring.validate()?;
        Ok(())
    }
}
