//! Merge decision trait.
//!
//! Deciding whether near-duplicate articles describe the same story is done
//! by an external text-generation service. The engine only consumes the
//! verdict.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SiftResult;
use crate::types::Article;

/// Verdict for one group of near-duplicate articles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeDecision {
    /// Every member becomes one article built around `primary_id`.
    Merge { primary_id: String },
    /// Only `merged_ids` are folded into `primary_id`; the rest stay separate.
    PartialMerge {
        primary_id: String,
        merged_ids: Vec<String>,
    },
    /// The members are different stories.
    KeepSeparate,
}

/// External service that judges a merge-candidate group.
#[async_trait]
pub trait MergeDecider: Send + Sync {
    /// Decide what to do with `members` (two or more articles, input order).
    async fn decide(&self, members: &[Article]) -> SiftResult<MergeDecision>;
}

/// Decider that never merges. Useful when no merge service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepSeparateDecider;

#[async_trait]
impl MergeDecider for KeepSeparateDecider {
    async fn decide(&self, _members: &[Article]) -> SiftResult<MergeDecision> {
        Ok(MergeDecision::KeepSeparate)
    }
}
