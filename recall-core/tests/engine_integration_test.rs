//! Integration tests for the memory engine.
//!
//! These exercise the public surface end to end: capacity settling,
//! retention of critical content, session isolation, and durability
//! through the JSONL persistence backend.

use recall_core::{
    ContextFormatter, EngineConfig, JsonlPersistence, MemoryEngine, PersistenceBackend,
    QueryContext, SalienceHint,
};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Maintenance-friendly config: records are eligible immediately.
fn capacity_config(threshold: usize) -> EngineConfig {
    EngineConfig::default()
        .with_capacity_threshold(threshold)
        .with_batch_size(10)
        .with_min_age_secs(0)
}

#[tokio::test]
async fn test_capacity_policy_settles_session() {
    init_tracing();
    let engine = MemoryEngine::open(capacity_config(100)).await.unwrap();

    for i in 0..150 {
        engine
            .write("sess", &format!("routine exchange number {i}"), None)
            .await
            .unwrap();
    }
    engine.run_maintenance("sess").await.unwrap();

    // The session settles at or under the threshold.
    assert!(engine.session_len("sess") <= 100);

    // Ordinary fresh records score well above the eviction floor, so the
    // two-tier policy must have compressed rather than discarded.
    let metrics = engine.metrics();
    assert_eq!(metrics.records_evicted, 0);
    assert!(metrics.summaries_created > 0);
    assert_eq!(metrics.writes, 150);
}

#[tokio::test]
async fn test_critical_record_survives_capacity_pressure() {
    init_tracing();
    let engine = MemoryEngine::open(capacity_config(100)).await.unwrap();

    let critical_id = engine
        .write(
            "sess",
            "the production master key is rotated on the first monday",
            Some(SalienceHint::Critical),
        )
        .await
        .unwrap();
    for i in 0..99 {
        engine
            .write("sess", &format!("ordinary chatter {i}"), None)
            .await
            .unwrap();
    }

    // Push past the threshold and settle.
    for i in 0..20 {
        engine
            .write("sess", &format!("overflow chatter {i}"), None)
            .await
            .unwrap();
    }
    engine.run_maintenance("sess").await.unwrap();

    assert!(engine.session_len("sess") <= 100);

    // The critical record was never selected for eviction or
    // summarization: it is still retrievable by id, as itself.
    let record = engine.get(critical_id).await.unwrap();
    assert!(record.content.contains("master key"));
    assert!(!record.is_summary());
}

#[tokio::test]
async fn test_written_record_is_immediately_retrievable() {
    init_tracing();
    let engine = MemoryEngine::open(EngineConfig::default()).await.unwrap();

    // Fill the session to capacity with unrelated, repeatedly accessed
    // records so the fresh write sits at the bottom of the retention order.
    for i in 0..99 {
        engine
            .write("sess", &format!("background chatter {i}"), None)
            .await
            .unwrap();
    }
    for _ in 0..3 {
        engine
            .read("sess", &QueryContext::new("background chatter"), 99)
            .await
            .unwrap();
    }

    let id = engine
        .write("sess", "the incident postmortem is scheduled thursday", None)
        .await
        .unwrap();

    // Exact-term query: no false negatives, even in a full session.
    let hits = engine
        .read("sess", &QueryContext::new("incident postmortem"), 5)
        .await
        .unwrap();
    assert!(hits.iter().any(|r| r.id == id));

    // And the by-id round trip preserves content and session.
    let record = engine.get(id).await.unwrap();
    assert_eq!(record.content, "the incident postmortem is scheduled thursday");
    assert_eq!(record.session_id, "sess");
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    init_tracing();
    let engine = MemoryEngine::open(EngineConfig::default()).await.unwrap();

    engine.write("alpha", "shared word payload", None).await.unwrap();
    engine.write("beta", "shared word payload", None).await.unwrap();

    let alpha_hits = engine
        .read("alpha", &QueryContext::new("shared word payload"), 10)
        .await
        .unwrap();

    assert_eq!(alpha_hits.len(), 1);
    assert_eq!(alpha_hits[0].session_id, "alpha");

    engine.forget("beta").await.unwrap();
    assert_eq!(engine.session_len("beta"), 0);
    assert_eq!(engine.session_len("alpha"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_do_not_block_each_other() {
    init_tracing();
    let engine = Arc::new(
        MemoryEngine::open(
            capacity_config(30).with_maintenance_bounds(5, Duration::from_millis(10)),
        )
        .await
        .unwrap(),
    );

    let mut tasks = Vec::new();
    for session in ["one", "two", "three", "four"] {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            for i in 0..50 {
                engine
                    .write(session, &format!("{session} message {i}"), None)
                    .await
                    .unwrap();
            }
            engine
                .read(session, &QueryContext::new(format!("{session} message")), 5)
                .await
                .unwrap()
        }));
    }

    for task in tasks {
        let hits = task.await.unwrap();
        assert!(!hits.is_empty());
    }

    // All writes landed despite concurrent maintenance.
    assert_eq!(engine.metrics().writes, 200);
    for session in ["one", "two", "three", "four"] {
        // Background maintenance settles each session independently.
        for _ in 0..100 {
            if engine.session_len(session) <= 30 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(engine.session_len(session) <= 30, "session {session} never settled");
    }
}

#[tokio::test]
async fn test_jsonl_persistence_survives_engine_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.jsonl");

    let written_id = {
        let backend = Arc::new(JsonlPersistence::open(&path).unwrap());
        let engine = MemoryEngine::builder()
            .persistence(backend)
            .build()
            .await
            .unwrap();

        let id = engine
            .write("sess", "durable across restarts", None)
            .await
            .unwrap();
        engine.close();
        id
    };

    // A fresh backend replays the log and still holds the record.
    let reopened = JsonlPersistence::open(&path).unwrap();
    assert_eq!(reopened.len(), 1);
    let loaded = reopened.load(written_id).await.unwrap();
    assert_eq!(loaded.content, "durable across restarts");
}

#[tokio::test]
async fn test_forget_clears_persistence_too() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.jsonl");

    let backend = Arc::new(JsonlPersistence::open(&path).unwrap());
    let engine = MemoryEngine::builder()
        .persistence(Arc::clone(&backend) as Arc<dyn PersistenceBackend>)
        .build()
        .await
        .unwrap();

    engine.write("gone", "first", None).await.unwrap();
    engine.write("gone", "second", None).await.unwrap();
    engine.write("kept", "third", None).await.unwrap();

    engine.forget("gone").await.unwrap();

    assert_eq!(engine.session_len("gone"), 0);
    assert_eq!(backend.len(), 1);
}

#[tokio::test]
async fn test_formatted_context_from_read_results() {
    init_tracing();
    let engine = MemoryEngine::open(EngineConfig::default()).await.unwrap();

    engine
        .write("sess", "the deploy window opens friday afternoon", None)
        .await
        .unwrap();

    let hits = engine
        .read("sess", &QueryContext::new("deploy window"), 3)
        .await
        .unwrap();
    let block = ContextFormatter::format_for_prompt(&hits);

    assert!(block.contains("Relevant memory"));
    assert!(block.contains("deploy window opens friday"));
    assert!(block.contains("Current exchange"));
}

#[tokio::test]
async fn test_repeated_reads_rank_hot_records_higher() {
    init_tracing();
    let engine = MemoryEngine::open(EngineConfig::default()).await.unwrap();

    engine.write("sess", "database tuning notes", None).await.unwrap();
    let hot = engine.write("sess", "database backup schedule", None).await.unwrap();

    // Touch the backup record repeatedly.
    for _ in 0..5 {
        let hits = engine
            .read("sess", &QueryContext::new("database backup schedule"), 1)
            .await
            .unwrap();
        assert_eq!(hits[0].id, hot);
    }

    let record = engine.get(hot).await.unwrap();
    assert_eq!(record.access_count, 5);
    // Frequency feeds importance, so the hot record outranks the idle one.
    let other = engine
        .read("sess", &QueryContext::new("database"), 2)
        .await
        .unwrap();
    assert_eq!(other[0].id, hot);
}
