//! sift-core - Core library for sift.
//!
//! Embedding-based deduplication, grouping, region-difference analysis and
//! priority scoring for batches of news articles.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sift_core::{Pipeline, RunContext, SiftConfig, SqliteEmbeddingStore};
//!
//! let config = SiftConfig::from_env()?;
//! let store = Arc::new(SqliteEmbeddingStore::new(&config.store.path)?);
//! let pipeline = Pipeline::new(config, store);
//!
//! let run = RunContext::generate();
//! let output = pipeline.process(articles, &run).await?;
//! let merged = pipeline.apply_merges(&output.survivors, &output.groups).await;
//! pipeline.record_history(&merged.articles, &run)?;
//! ```

pub mod config;
pub mod dedup;
pub mod diff;
pub mod error;
pub mod import;
pub mod pipeline;
pub mod priority;
pub mod store;
pub mod traits;
pub mod types;
pub mod vector;

// Re-export commonly used types
pub use config::{RegionThresholds, SiftConfig};
pub use dedup::{CrossRunDeduplicator, DedupOutcome, WithinRunGrouper};
pub use diff::{DiffReport, RegionDiffAnalyzer};
pub use error::{ErrorCode, SiftError, SiftResult};
pub use pipeline::{MergeOutcome, Pipeline, RunOutput, RunReport, RunStatus};
pub use priority::{PriorityScorer, RankedArticle};
pub use store::{InMemoryEmbeddingStore, SqliteEmbeddingStore};
pub use traits::{Embedder, EmbedderConfig, EmbeddingStore, MergeDecider, MergeDecision};
pub use types::{
    Article, ArticleError, Category, DedupLogEntry, EmbeddingRecord, Group, PriorityScoreRecord,
    Region, RunContext, Sport, UniqueArticle,
};
