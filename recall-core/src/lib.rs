//! # recall-core
//!
//! A conversational-memory persistence engine: stores interaction records,
//! scores them by importance, compresses aged low-value content into
//! summaries, and serves ranked context retrieval to a downstream
//! reasoning component.
//!
//! ## Features
//!
//! - **Per-session capacity policy**: over-capacity sessions are settled by
//!   evicting cheap content and summarizing the rest
//! - **Importance scoring**: recency decay, access frequency, and explicit
//!   salience hints combined under configurable weights
//! - **Sub-linear retrieval**: an ordered per-session index serves bounded
//!   candidate sets instead of scanning
//! - **Pluggable seams**: relevance estimation, summary compression, and
//!   durability are trait-backed collaborators
//! - **Concurrent sessions**: per-session locking, no global lock
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recall_core::{EngineConfig, MemoryEngine, QueryContext, Result, SalienceHint};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let engine = MemoryEngine::open(EngineConfig::default()).await?;
//!
//!     engine
//!         .write("session-1", "the deploy window opens friday", None)
//!         .await?;
//!     engine
//!         .write(
//!             "session-1",
//!             "master key rotation is due",
//!             Some(SalienceHint::Critical),
//!         )
//!         .await?;
//!
//!     let context = engine
//!         .read("session-1", &QueryContext::new("deploy window"), 5)
//!         .await?;
//!     for record in context {
//!         println!("{}: {}", record.id, record.content);
//!     }
//!
//!     engine.close();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod config;
mod engine;
mod error;
mod format;
mod index;
mod persist;
mod record;
mod relevance;
mod scoring;
mod store;
mod summarize;

pub use config::{EngineConfig, RetryConfig};
pub use engine::{EngineMetrics, MemoryEngine, MemoryEngineBuilder};
pub use error::{MemoryError, Result};
pub use format::ContextFormatter;
pub use index::RetrievalIndex;
pub use persist::{InMemoryPersistence, JsonlPersistence, PersistenceBackend};
pub use record::{MemoryRecord, RecordId, RecordKind, SalienceHint};
pub use relevance::{QueryContext, RelevanceEstimator, TermOverlapRelevance};
pub use scoring::{ImportanceScorer, ScoringConfig};
pub use store::RecordStore;
pub use summarize::{ExtractiveSummarizer, SummaryStrategy, Summarizer};
