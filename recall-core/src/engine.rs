//! Memory engine: orchestrates the store, scorer, index, and summarizer.
//!
//! One engine instance owns all per-process memory state with an explicit
//! `open`/`close` lifecycle; collaborators hold a reference to it rather
//! than a process-wide singleton. Sessions are serviced concurrently:
//! each session has its own lock, so writers to different sessions never
//! contend, while operations within a session are serialized.
//!
//! Capacity maintenance is the adaptive core. A session whose live record
//! count exceeds the configured threshold goes over capacity; a deferred
//! maintenance task then selects the lowest-priority eligible batch and
//! either evicts it outright (uniformly cheap content) or compresses it
//! into a single summary record. Deferral is bounded: maintenance runs
//! within N writes or a staleness window, whichever comes first.

use crate::config::EngineConfig;
use crate::error::{MemoryError, Result};
use crate::index::RetrievalIndex;
use crate::persist::{InMemoryPersistence, PersistenceBackend};
use crate::record::{MemoryRecord, RecordId, SalienceHint};
use crate::relevance::{QueryContext, RelevanceEstimator, TermOverlapRelevance};
use crate::scoring::ImportanceScorer;
use crate::store::RecordStore;
use crate::summarize::{ExtractiveSummarizer, Summarizer, SummaryStrategy};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Operation counters for one engine instance.
#[derive(Debug, Default, Clone)]
pub struct EngineMetrics {
    /// Total accepted writes
    pub writes: u64,
    /// Total served read queries
    pub reads: u64,
    /// Records deleted outright by maintenance
    pub records_evicted: u64,
    /// Summary records created by maintenance
    pub summaries_created: u64,
    /// Maintenance cycles started
    pub maintenance_cycles: u64,
    /// Maintenance cycles that failed (including retried attempts)
    pub maintenance_failures: u64,
}

/// Per-session concurrency control.
#[derive(Debug, Default)]
struct SessionCtl {
    // Serializes write, read, and maintenance within the session.
    lock: Mutex<()>,
    maintenance_scheduled: AtomicBool,
    deferred_writes: AtomicUsize,
    maintenance_wakeup: Notify,
}

struct Inner {
    config: EngineConfig,
    scorer: ImportanceScorer,
    store: RecordStore,
    index: RetrievalIndex,
    persistence: Arc<dyn PersistenceBackend>,
    relevance: Arc<dyn RelevanceEstimator>,
    summarizer: Summarizer,
    sessions: DashMap<String, Arc<SessionCtl>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    metrics: SyncMutex<EngineMetrics>,
}

impl Inner {
    fn now() -> i64 {
        Utc::now().timestamp()
    }

    fn allocate_id(&self) -> RecordId {
        RecordId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(MemoryError::Closed)
        } else {
            Ok(())
        }
    }

    fn session_ctl(&self, session_id: &str) -> Arc<SessionCtl> {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Retention priority used for index ordering: importance weighted by
    /// age recency, so stale low-value records sink to the bottom.
    fn priority_of(&self, record: &MemoryRecord, now: i64) -> f64 {
        record.importance * self.scorer.recency_score(record.age_secs(now))
    }

    async fn write(
        self: &Arc<Self>,
        session_id: &str,
        content: &str,
        hint: Option<SalienceHint>,
    ) -> Result<RecordId> {
        self.ensure_open()?;

        let now = Self::now();
        let id = self.allocate_id();
        let mut record = MemoryRecord::raw(id, session_id, content, hint, now);
        record.importance = self.scorer.score(&record, now);

        // Durability first: a write that cannot be persisted fails fast
        // and leaves no in-memory trace.
        self.persistence.persist(&record).await?;

        let ctl = self.session_ctl(session_id);
        {
            let _guard = ctl.lock.lock().await;
            let priority = self.priority_of(&record, now);
            self.store.put(record);
            self.index.upsert(session_id, id, priority);
        }
        self.metrics.lock().writes += 1;
        debug!(session = session_id, %id, "stored record");

        self.check_capacity(session_id, &ctl);
        Ok(id)
    }

    /// Schedules or nudges deferred maintenance when a session is over
    /// capacity.
    fn check_capacity(self: &Arc<Self>, session_id: &str, ctl: &Arc<SessionCtl>) {
        let count = self.store.len_session(session_id);
        if count <= self.config.session_capacity_threshold {
            return;
        }

        let deferred = ctl.deferred_writes.fetch_add(1, Ordering::SeqCst) + 1;
        if !ctl.maintenance_scheduled.swap(true, Ordering::SeqCst) {
            debug!(session = session_id, count, "session over capacity, scheduling maintenance");
            let inner = Arc::clone(self);
            let ctl = Arc::clone(ctl);
            let session = session_id.to_string();
            tokio::spawn(async move {
                Inner::maintenance_task(inner, session, ctl).await;
            });
        } else if deferred >= self.config.maintenance_max_deferred_writes {
            // Fairness bound: enough writes piled up, stop deferring.
            ctl.maintenance_wakeup.notify_one();
        }
    }

    /// Deferred maintenance driver. Waits out the batching window (cut
    /// short by the write-count bound), then runs cycles until the session
    /// is back under capacity, retrying transient failures with backoff.
    async fn maintenance_task(inner: Arc<Inner>, session_id: String, ctl: Arc<SessionCtl>) {
        tokio::select! {
            _ = sleep(inner.config.maintenance_max_staleness) => {}
            _ = ctl.maintenance_wakeup.notified() => {}
        }

        let mut attempt = 0u32;
        loop {
            if inner.closed.load(Ordering::SeqCst) {
                break;
            }

            match inner.maintenance_cycle(&session_id).await {
                Ok(true) => {
                    attempt = 0;
                    if inner.store.len_session(&session_id)
                        <= inner.config.session_capacity_threshold
                    {
                        break;
                    }
                }
                Ok(false) => break,
                Err(e) if e.is_recoverable() && attempt < inner.config.retry.max_retries => {
                    inner.metrics.lock().maintenance_failures += 1;
                    let delay = inner.config.retry.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        session = session_id.as_str(),
                        "maintenance attempt {attempt} failed, retrying in {delay:?}: {e}"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    // Batch errors get a fresh selection next cycle; other
                    // failures wait for the next over-capacity trigger.
                    inner.metrics.lock().maintenance_failures += 1;
                    warn!(session = session_id.as_str(), "maintenance cycle aborted: {e}");
                    break;
                }
            }
        }

        ctl.deferred_writes.store(0, Ordering::SeqCst);
        ctl.maintenance_scheduled.store(false, Ordering::SeqCst);
    }

    /// Runs one maintenance cycle under the session lock. Returns true if
    /// a batch was evicted or summarized, false if nothing was eligible.
    async fn maintenance_cycle(self: &Arc<Self>, session_id: &str) -> Result<bool> {
        let ctl = self.session_ctl(session_id);
        let _guard = ctl.lock.lock().await;

        let now = Self::now();
        if self.store.len_session(session_id) <= self.config.session_capacity_threshold {
            return Ok(false);
        }
        self.metrics.lock().maintenance_cycles += 1;

        let batch = self.select_batch(session_id, now);
        if batch.is_empty() {
            debug!(session = session_id, "over capacity but no eligible maintenance batch");
            return Ok(false);
        }

        let max_importance = batch.iter().map(|r| r.importance).fold(0.0, f64::max);
        if max_importance < self.config.eviction_importance_floor {
            self.evict_batch(session_id, &batch).await?;
        } else {
            self.summarize_batch(session_id, &batch, now).await?;
        }
        Ok(true)
    }

    /// Selects the lowest-priority batch of raw records eligible for
    /// maintenance: older than the age floor and below the retention
    /// ceiling. Probes a bounded slice from the bottom of the index.
    fn select_batch(&self, session_id: &str, now: i64) -> Vec<MemoryRecord> {
        let batch_size = self.config.maintenance_batch_size;
        let probe = (batch_size * 4).max(batch_size);
        let mut batch = Vec::with_capacity(batch_size);

        for id in self.index.bottom_candidates(session_id, probe) {
            let Ok(record) = self.store.get(id) else {
                continue;
            };
            if record.is_summary() {
                continue;
            }
            if record.age_secs(now) < self.config.min_age_for_summarization_secs {
                continue;
            }
            if record.importance >= self.config.retention_importance_ceiling {
                continue;
            }
            batch.push(record);
            if batch.len() == batch_size {
                break;
            }
        }
        batch
    }

    /// Permanently deletes a uniformly low-importance batch.
    async fn evict_batch(&self, session_id: &str, batch: &[MemoryRecord]) -> Result<()> {
        futures::future::try_join_all(batch.iter().map(|r| self.persistence.delete(r.id)))
            .await?;
        for record in batch {
            self.store.delete(record.id);
            self.index.remove(session_id, record.id);
        }
        self.metrics.lock().records_evicted += batch.len() as u64;
        debug!(session = session_id, count = batch.len(), "evicted low-importance batch");
        Ok(())
    }

    /// Replaces a batch with one summary record. The in-memory swap is
    /// atomic under the session lock; the summary is made durable before
    /// anything is removed, so a failure at any step leaves the live state
    /// unchanged.
    async fn summarize_batch(
        &self,
        session_id: &str,
        batch: &[MemoryRecord],
        now: i64,
    ) -> Result<()> {
        let summary_id = self.allocate_id();
        let summary = self.summarizer.summarize(batch, summary_id, now)?;

        self.persistence.persist(&summary).await?;

        let source_ids: BTreeSet<RecordId> = batch.iter().map(|r| r.id).collect();
        self.store.replace_batch(&source_ids, summary.clone())?;
        for id in &source_ids {
            self.index.remove(session_id, *id);
        }
        self.index
            .upsert(session_id, summary_id, self.priority_of(&summary, now));

        // The summary is durable and live; stale sources in the backend
        // are an oplog hygiene concern, not a consistency one.
        for id in &source_ids {
            if let Err(e) = self.persistence.delete(*id).await {
                warn!(%id, "failed to delete summarized source from persistence: {e}");
            }
        }

        self.metrics.lock().summaries_created += 1;
        debug!(
            session = session_id,
            %summary_id,
            sources = batch.len(),
            "replaced batch with summary"
        );
        Ok(())
    }

    async fn read(
        &self,
        session_id: &str,
        ctx: &QueryContext,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        self.ensure_open()?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let ctl = self.session_ctl(session_id);
        let _guard = ctl.lock.lock().await;
        let now = Self::now();

        // Bounded candidate set: the top of the retention order, unioned
        // with the newest records by creation so a just-written record is
        // always considered even when older accessed records outrank it.
        let candidate_n = (limit * 4).max(64);
        let mut candidates = self.index.top_candidates(session_id, candidate_n);
        let mut seen: HashSet<RecordId> = candidates.iter().copied().collect();
        for id in self
            .store
            .session_ids(session_id)
            .into_iter()
            .rev()
            .take(candidate_n)
        {
            if seen.insert(id) {
                candidates.push(id);
            }
        }

        let mut scored: Vec<(f64, MemoryRecord)> = Vec::new();
        for id in candidates {
            let Ok(record) = self.store.get(id) else {
                continue;
            };
            let rel = self.relevance.relevance(&record, ctx).clamp(0.0, 1.0);
            if rel <= 0.0 {
                continue;
            }
            let composite =
                rel * record.importance * self.scorer.recency_score(record.age_secs(now));
            if composite > 0.0 {
                scored.push((composite, record));
            }
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.access_count.cmp(&a.1.access_count))
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        let hits: Vec<MemoryRecord> = scored.into_iter().take(limit).map(|(_, r)| r).collect();
        let hits = self.apply_char_budget(hits);

        // Every hit is an access: bump the counters and reposition.
        let scorer = &self.scorer;
        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            let updated = self.store.update(hit.id, |rec| {
                rec.touch(now);
                rec.importance = scorer.score(rec, now);
            })?;
            self.index
                .upsert(session_id, updated.id, self.priority_of(&updated, now));
            out.push(updated);
        }

        self.metrics.lock().reads += 1;
        Ok(out)
    }

    /// Trims results to the configured character budget, always keeping at
    /// least the top hit. The cut is a prefix of the ranking: the first
    /// over-budget hit ends selection, so a lower-ranked hit never displaces
    /// a higher-ranked one.
    fn apply_char_budget(&self, hits: Vec<MemoryRecord>) -> Vec<MemoryRecord> {
        let Some(budget) = self.config.context_char_budget else {
            return hits;
        };

        let mut remaining = budget;
        let mut selected = Vec::new();
        for hit in hits {
            let len = hit.content.len();
            if len > remaining {
                if selected.is_empty() {
                    selected.push(hit);
                }
                break;
            }
            remaining -= len;
            selected.push(hit);
        }
        selected
    }

    async fn forget(&self, session_id: &str) -> Result<()> {
        self.ensure_open()?;

        let ctl = self.session_ctl(session_id);
        let _guard = ctl.lock.lock().await;

        // The ack must mean durably gone, so the backend clears first.
        self.persistence.delete_all(session_id).await?;
        self.store.clear_session(session_id);
        self.index.clear_session(session_id);

        info!(session = session_id, "forgot session");
        Ok(())
    }

    /// Background pass recomputing importance for records that have not
    /// been touched recently, so idle-but-aging records keep decaying.
    /// Skips any session whose lock is held: foreground traffic wins.
    async fn rescore_idle(&self) {
        let now = Self::now();
        let idle_floor = self.config.rescore_interval.as_secs() as i64;

        let sessions: Vec<(String, Arc<SessionCtl>)> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        for (session_id, ctl) in sessions {
            let Ok(_guard) = ctl.lock.try_lock() else {
                continue;
            };
            for id in self.store.session_ids(&session_id) {
                let Ok(record) = self.store.get(id) else {
                    continue;
                };
                if record.idle_secs(now) < idle_floor {
                    continue;
                }
                let importance = self.scorer.score(&record, now);
                if let Ok(updated) = self.store.update(id, |r| r.importance = importance) {
                    self.index
                        .upsert(&session_id, id, self.priority_of(&updated, now));
                }
            }
        }
    }
}

/// Conversational-memory engine.
///
/// Cheap to share behind an `Arc`; all operations take `&self`.
pub struct MemoryEngine {
    inner: Arc<Inner>,
    rescore_task: SyncMutex<Option<JoinHandle<()>>>,
}

impl MemoryEngine {
    /// Opens an engine with the given configuration and default
    /// collaborators (in-memory persistence, term-overlap relevance,
    /// extractive summarization).
    pub async fn open(config: EngineConfig) -> Result<Self> {
        Self::builder().config(config).build().await
    }

    /// Returns a builder for customizing collaborators.
    pub fn builder() -> MemoryEngineBuilder {
        MemoryEngineBuilder::new()
    }

    /// Writes a record to a session and returns its id. Returns only
    /// after the record is durable and indexed. May schedule deferred
    /// maintenance, but never blocks the caller on it.
    pub async fn write(
        &self,
        session_id: &str,
        content: &str,
        hint: Option<SalienceHint>,
    ) -> Result<RecordId> {
        self.inner.write(session_id, content, hint).await
    }

    /// Retrieves the top-`limit` records for a query, ranked by
    /// relevance × importance × recency. Ties break by higher access
    /// count, then lower id. Each hit counts as an access. An unknown
    /// session yields an empty result, not an error.
    pub async fn read(
        &self,
        session_id: &str,
        ctx: &QueryContext,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        self.inner.read(session_id, ctx, limit).await
    }

    /// Fetches a record by id without counting an access.
    pub async fn get(&self, id: RecordId) -> Result<MemoryRecord> {
        self.inner.ensure_open()?;
        self.inner.store.get(id)
    }

    /// Clears a session from the store, the index, and the persistence
    /// backend. Acks only once all three are done.
    pub async fn forget(&self, session_id: &str) -> Result<()> {
        self.inner.forget(session_id).await
    }

    /// Runs maintenance cycles for a session until it is back under
    /// capacity or nothing is eligible. Maintenance normally runs on its
    /// own deferred schedule; this is the synchronous path for callers
    /// that need a deterministic settle point.
    pub async fn run_maintenance(&self, session_id: &str) -> Result<()> {
        self.inner.ensure_open()?;
        loop {
            match self.inner.maintenance_cycle(session_id).await? {
                true => {
                    if self.inner.store.len_session(session_id)
                        <= self.inner.config.session_capacity_threshold
                    {
                        return Ok(());
                    }
                }
                false => return Ok(()),
            }
        }
    }

    /// Number of live records in a session.
    pub fn session_len(&self, session_id: &str) -> usize {
        self.inner.store.len_session(session_id)
    }

    /// Returns a snapshot of the operation counters.
    pub fn metrics(&self) -> EngineMetrics {
        self.inner.metrics.lock().clone()
    }

    /// Returns true once the engine has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Closes the engine: stops background rescoring and rejects further
    /// operations with `Closed`. Derived state only is discarded.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.rescore_task.lock().take() {
            task.abort();
        }
        info!("memory engine closed");
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builder for [`MemoryEngine`].
pub struct MemoryEngineBuilder {
    config: EngineConfig,
    persistence: Option<Arc<dyn PersistenceBackend>>,
    relevance: Option<Arc<dyn RelevanceEstimator>>,
    strategy: Option<Arc<dyn SummaryStrategy>>,
}

impl MemoryEngineBuilder {
    /// Creates a builder with default config and collaborators.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            persistence: None,
            relevance: None,
            strategy: None,
        }
    }

    /// Sets the engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the durability backend.
    pub fn persistence(mut self, backend: Arc<dyn PersistenceBackend>) -> Self {
        self.persistence = Some(backend);
        self
    }

    /// Sets the relevance estimator.
    pub fn relevance(mut self, estimator: Arc<dyn RelevanceEstimator>) -> Self {
        self.relevance = Some(estimator);
        self
    }

    /// Sets the summary-compression strategy.
    pub fn summary_strategy(mut self, strategy: Arc<dyn SummaryStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Validates the configuration and opens the engine, spawning the
    /// background rescoring task.
    pub async fn build(self) -> Result<MemoryEngine> {
        self.config.validate()?;

        let persistence = self
            .persistence
            .unwrap_or_else(|| Arc::new(InMemoryPersistence::new()));
        let relevance = self
            .relevance
            .unwrap_or_else(|| Arc::new(TermOverlapRelevance));
        let strategy = self
            .strategy
            .unwrap_or_else(|| Arc::new(ExtractiveSummarizer::default()));

        let inner = Arc::new(Inner {
            scorer: ImportanceScorer::new(self.config.scoring.clone()),
            summarizer: Summarizer::new(strategy),
            config: self.config,
            store: RecordStore::new(),
            index: RetrievalIndex::new(),
            persistence,
            relevance,
            sessions: DashMap::new(),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            metrics: SyncMutex::new(EngineMetrics::default()),
        });

        let rescore = {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(inner.config.rescore_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                interval.tick().await; // immediate first tick
                loop {
                    interval.tick().await;
                    if inner.closed.load(Ordering::SeqCst) {
                        break;
                    }
                    inner.rescore_idle().await;
                }
            })
        };

        info!("memory engine opened");
        Ok(MemoryEngine {
            inner,
            rescore_task: SyncMutex::new(Some(rescore)),
        })
    }
}

impl Default for MemoryEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
