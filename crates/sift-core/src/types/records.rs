//! Records produced and consumed by the engine.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::article::Article;
use super::category::Sport;
use super::region::Region;

/// Identity of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    /// Opaque per-execution token.
    pub run_id: String,
    /// Calendar day (UTC) the run belongs to.
    pub date: NaiveDate,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            run_id: run_id.into(),
            date,
        }
    }

    /// A fresh run for today (UTC) with a random run id.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string(), Utc::now().date_naive())
    }

    /// Inclusive date window `[date - lookback_days, date]`.
    pub fn window(&self, lookback_days: u32) -> (NaiveDate, NaiveDate) {
        let from = self
            .date
            .checked_sub_days(chrono::Days::new(u64::from(lookback_days)))
            .unwrap_or(NaiveDate::MIN);
        (from, self.date)
    }
}

/// One article embedding persisted for a run.
///
/// The historical store is an append-only multiset of these, keyed by
/// `(article_id, run_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub article_id: String,
    pub region: Region,
    pub date: NaiveDate,
    pub run_id: String,
    pub embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Body length of the source article, when it was known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
}

impl EmbeddingRecord {
    pub fn new(
        article_id: impl Into<String>,
        region: Region,
        date: NaiveDate,
        run_id: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            article_id: article_id.into(),
            region,
            date,
            run_id: run_id.into(),
            embedding,
            title: None,
            url: None,
            content_length: None,
        }
    }

    /// Build the record for an article in the given run.
    pub fn from_article(article: &Article, run: &RunContext) -> Self {
        Self {
            article_id: article.id.clone(),
            region: article.region.clone(),
            date: run.date,
            run_id: run.run_id.clone(),
            embedding: article.embedding.clone(),
            title: Some(article.title.clone()),
            url: article.url.clone(),
            content_length: article.content_length(),
        }
    }

    pub fn with_content_length(mut self, content_length: usize) -> Self {
        self.content_length = Some(content_length);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// A set of near-duplicate articles from one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: usize,
    /// Member ids in input order.
    pub member_article_ids: Vec<String>,
    /// Positions of the members in the grouped input.
    pub member_indices: Vec<usize>,
    /// Highest pairwise similarity inside the group; 1.0 for singletons.
    pub max_similarity: f32,
}

impl Group {
    pub fn size(&self) -> usize {
        self.member_indices.len()
    }

    pub fn is_singleton(&self) -> bool {
        self.size() == 1
    }

    /// Groups with two or more members go to the merge decision.
    pub fn is_merge_candidate(&self) -> bool {
        self.size() >= 2
    }
}

/// Why an article was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DedupReason {
    CrossRunDuplicate,
}

/// Audit entry for an article dropped by cross-run dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupLogEntry {
    pub article_id: String,
    pub matched_article_id: String,
    pub region: Region,
    pub max_similarity: f32,
    pub threshold_used: f32,
    pub reason: DedupReason,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_url: Option<String>,
}

/// Engine stage an article error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Embedding,
    Validation,
    Dedup,
    Grouping,
    Merge,
}

/// Per-run error log entry. The article was excluded from later stages,
/// except for merge failures, which keep the group's articles unmerged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleError {
    pub article_id: String,
    pub stage: Stage,
    /// Stable error code, e.g. `VEC_001`.
    pub code: String,
    pub message: String,
}

impl ArticleError {
    pub fn new(article_id: impl Into<String>, stage: Stage, error: &crate::error::SiftError) -> Self {
        Self {
            article_id: article_id.into(),
            stage,
            code: error.code().as_str().to_string(),
            message: error.to_string(),
        }
    }
}

/// Score breakdown for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityScoreRecord {
    pub article_id: String,
    pub category_score: f32,
    pub sport: Sport,
    pub sport_multiplier: f32,
    pub is_derby: bool,
    pub derby_bonus: f32,
    /// `category_score * sport_multiplier + derby_bonus`.
    pub final_score: f32,
}

/// An article found in one population with no close counterpart in another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueArticle {
    pub article: Article,
    /// Highest similarity against the other population (0.0 when it was empty).
    pub max_similarity: f32,
    /// Closest, but insufficiently similar, counterpart for human review.
    pub closest_match: Option<ClosestMatch>,
}

/// Reference to the nearest record in the compared population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosestMatch {
    pub article_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub similarity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_inclusive() {
        let run = RunContext::new("r1", NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        let (from, to) = run.window(2);
        assert_eq!(from, NaiveDate::from_ymd_opt(2025, 2, 27).unwrap());
        assert_eq!(to, run.date);
        assert_eq!(run.window(0), (run.date, run.date));
    }

    #[test]
    fn test_dedup_reason_serializes_snake_case() {
        let json = serde_json::to_string(&DedupReason::CrossRunDuplicate).unwrap();
        assert_eq!(json, "\"cross_run_duplicate\"");
        assert_eq!(DedupReason::CrossRunDuplicate.to_string(), "cross_run_duplicate");
    }

    #[test]
    fn test_record_from_article() {
        let run = RunContext::new("r1", NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        let article = Article::new("a1", "Title", Region::tr())
            .with_body("body text")
            .with_embedding(vec![0.5, 0.5]);
        let record = EmbeddingRecord::from_article(&article, &run);
        assert_eq!(record.run_id, "r1");
        assert_eq!(record.content_length, Some(9));
        assert_eq!(record.title.as_deref(), Some("Title"));
    }
}
