//! Article type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::category::Category;
use super::region::Region;

/// A news article as seen by the engine.
///
/// Articles are treated as immutable values: a merge produces a new
/// article (see [`Article::merge`]) and never edits its sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Stable opaque identifier.
    #[serde(alias = "article_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub region: Region,
    #[serde(default)]
    pub language: String,
    /// Publication time. Articles without one rank after dated ones on ties.
    #[serde(default, alias = "publish_date", skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Ordered `(tag, confidence)` pairs from enrichment.
    #[serde(default)]
    pub categories: Vec<Category>,
    /// Dense semantic vector. Empty until embedded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    #[serde(default, alias = "original_url", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, alias = "content", skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Ids of the articles this one was merged from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_from: Vec<String>,
}

impl Article {
    /// Create a new article with no embedding, categories or metadata.
    pub fn new(id: impl Into<String>, title: impl Into<String>, region: Region) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            region,
            language: String::new(),
            published_at: None,
            categories: Vec::new(),
            embedding: Vec::new(),
            url: None,
            summary: None,
            body: None,
            merged_from: Vec::new(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    pub fn with_category(mut self, tag: impl Into<String>, confidence: f32) -> Self {
        self.categories.push(Category::new(tag, confidence));
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }

    /// Fill in the region from the language when none was supplied.
    pub fn with_region_fallback(mut self) -> Self {
        if self.region.is_unset() {
            self.region = Region::from_language(&self.language);
        }
        self
    }

    /// Length of the article body in characters, if a body is present.
    pub fn content_length(&self) -> Option<usize> {
        self.body.as_ref().map(|b| b.chars().count())
    }

    /// Text handed to the embedding provider: the full title followed by
    /// the body (or summary), truncated to `max_chars` characters overall.
    pub fn embedding_text(&self, max_chars: usize) -> String {
        let body = self
            .body
            .as_deref()
            .or(self.summary.as_deref())
            .unwrap_or_default();
        let combined = format!("{} {}", self.title, body);
        combined.trim().chars().take(max_chars).collect()
    }

    /// Lower-cased title and summary, used for keyword evidence.
    pub fn headline_text(&self) -> String {
        let summary = self.summary.as_deref().unwrap_or_default();
        format!("{} {}", self.title, summary).to_lowercase()
    }

    /// Build a new article from a primary source and the sources merged into it.
    ///
    /// Identity, title, region, language, url, summary, body and embedding come
    /// from `primary`. `published_at` is the earliest among all sources.
    /// Categories are unioned keeping the highest confidence per tag, ordered by
    /// confidence descending (ties by tag). `merged_from` lists every source id,
    /// primary first, without repeats.
    pub fn merge(primary: &Article, others: &[&Article]) -> Article {
        let sources: Vec<&Article> = std::iter::once(primary).chain(others.iter().copied()).collect();

        let published_at = sources.iter().filter_map(|a| a.published_at).min();

        let mut best: HashMap<&str, f32> = HashMap::new();
        for category in sources.iter().flat_map(|a| a.categories.iter()) {
            let entry = best.entry(category.tag.as_str()).or_insert(f32::MIN);
            *entry = entry.max(category.clamped_confidence());
        }
        let mut categories: Vec<Category> = best
            .into_iter()
            .map(|(tag, confidence)| Category::new(tag, confidence))
            .collect();
        categories.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.tag.cmp(&b.tag))
        });

        let mut merged_from: Vec<String> = Vec::with_capacity(sources.len());
        for source in &sources {
            let ids = std::iter::once(&source.id).chain(source.merged_from.iter());
            for id in ids {
                if !merged_from.contains(id) {
                    merged_from.push(id.clone());
                }
            }
        }

        Article {
            id: primary.id.clone(),
            title: primary.title.clone(),
            region: primary.region.clone(),
            language: primary.language.clone(),
            published_at,
            categories,
            embedding: primary.embedding.clone(),
            url: primary.url.clone(),
            summary: primary.summary.clone(),
            body: primary.body.clone(),
            merged_from,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_deserialize_pipeline_field_names() {
        let json = r#"{
            "article_id": "a1",
            "title": "Derby day",
            "region": "TR",
            "original_url": "https://example.com/a1",
            "publish_date": "2025-12-22T08:00:00Z",
            "categories": [{"tag": "team_rivalry", "confidence": 0.9}]
        }"#;
        let article: Article = serde_json::from_str(json).unwrap();
        assert_eq!(article.id, "a1");
        assert_eq!(article.region, Region::tr());
        assert_eq!(article.url.as_deref(), Some("https://example.com/a1"));
        assert!(article.published_at.is_some());
        assert!(!article.has_embedding());
    }

    #[test]
    fn test_region_fallback_from_language() {
        let article = Article::new("a", "t", Region::default())
            .with_language("tr")
            .with_region_fallback();
        assert_eq!(article.region, Region::tr());

        let kept = Article::new("b", "t", Region::eu())
            .with_language("tr")
            .with_region_fallback();
        assert_eq!(kept.region, Region::eu());
    }

    #[test]
    fn test_embedding_text_truncates() {
        let article = Article::new("a", "Title", Region::eu()).with_body("x".repeat(50));
        let text = article.embedding_text(10);
        assert_eq!(text.chars().count(), 10);
        assert!(text.starts_with("Title "));
    }

    #[test]
    fn test_merge_builds_new_article() {
        let early = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();

        let primary = Article::new("p", "Primary", Region::tr())
            .with_published_at(late)
            .with_category("transfers_rumors", 0.6)
            .with_embedding(vec![1.0, 0.0]);
        let other = Article::new("o", "Other", Region::eu())
            .with_published_at(early)
            .with_category("transfers_rumors", 0.9)
            .with_category("injury_news", 0.3);

        let merged = Article::merge(&primary, &[&other]);

        assert_eq!(merged.id, "p");
        assert_eq!(merged.region, Region::tr());
        assert_eq!(merged.published_at, Some(early));
        assert_eq!(merged.embedding, vec![1.0, 0.0]);
        assert_eq!(merged.merged_from, vec!["p".to_string(), "o".to_string()]);
        assert_eq!(merged.categories[0], Category::new("transfers_rumors", 0.9));
        assert_eq!(merged.categories[1], Category::new("injury_news", 0.3));

        // sources untouched
        assert_eq!(primary.categories.len(), 1);
        assert!(primary.merged_from.is_empty());
    }
}
