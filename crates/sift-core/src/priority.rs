//! Deterministic priority scoring for publication selection.
//!
//! `final_score = category_score * sport_multiplier + derby_bonus`, where
//! `category_score` is the best `base_points * confidence` over the article's
//! categories.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::PriorityConfig;
use crate::types::{Article, PriorityScoreRecord, Sport};

/// An article with its score breakdown and 1-based rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedArticle {
    pub rank: usize,
    pub article: Article,
    pub score: PriorityScoreRecord,
}

/// Scores and ranks enriched articles.
#[derive(Debug, Clone)]
pub struct PriorityScorer {
    config: PriorityConfig,
    basketball_tags: HashSet<String>,
    derby_tags: HashSet<String>,
    basketball_keywords: Vec<String>,
    other_sport_keywords: Vec<String>,
    derby_keywords: Vec<String>,
}

fn lowercase_all(words: &[String]) -> Vec<String> {
    words.iter().map(|w| w.to_lowercase()).collect()
}

fn contains_any(text: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| !k.is_empty() && text.contains(k.as_str()))
}

impl Default for PriorityScorer {
    fn default() -> Self {
        Self::new(PriorityConfig::default())
    }
}

impl PriorityScorer {
    pub fn new(config: PriorityConfig) -> Self {
        Self {
            basketball_tags: config.basketball_tags.iter().cloned().collect(),
            derby_tags: config.derby_tags.iter().cloned().collect(),
            basketball_keywords: lowercase_all(&config.basketball_keywords),
            other_sport_keywords: lowercase_all(&config.other_sport_keywords),
            derby_keywords: lowercase_all(&config.derby_keywords),
            config,
        }
    }

    fn base_points(&self, tag: &str) -> f32 {
        self.config
            .category_points
            .get(tag)
            .copied()
            .unwrap_or(self.config.default_category_points)
    }

    /// Best `base_points * confidence` among the article's categories; 0 without categories.
    pub fn category_score(&self, article: &Article) -> f32 {
        article
            .categories
            .iter()
            .map(|c| self.base_points(&c.tag) * c.clamped_confidence())
            .fold(None, |best: Option<f32>, s| Some(best.map_or(s, |b| b.max(s))))
            .unwrap_or(0.0)
    }

    /// Basketball by tag or keyword, then other sports by keyword, else football.
    pub fn detect_sport(&self, article: &Article) -> Sport {
        if article.categories.iter().any(|c| self.basketball_tags.contains(&c.tag)) {
            return Sport::Basketball;
        }
        let text = article.headline_text();
        if contains_any(&text, &self.basketball_keywords) {
            Sport::Basketball
        } else if contains_any(&text, &self.other_sport_keywords) {
            Sport::Other
        } else {
            Sport::Football
        }
    }

    pub fn is_derby(&self, article: &Article) -> bool {
        article.categories.iter().any(|c| self.derby_tags.contains(&c.tag))
            || contains_any(&article.headline_text(), &self.derby_keywords)
    }

    /// Score breakdown for one article.
    ///
    /// An article without categories has a category score of 0 but still
    /// earns the derby bonus when its title or summary names a derby.
    pub fn score(&self, article: &Article) -> PriorityScoreRecord {
        let category_score = self.category_score(article);
        let sport = self.detect_sport(article);
        let sport_multiplier = self.config.sport_multipliers.for_sport(sport);
        let is_derby = self.is_derby(article);
        let derby_bonus = if is_derby { self.config.derby_bonus } else { 0.0 };

        PriorityScoreRecord {
            article_id: article.id.clone(),
            category_score,
            sport,
            sport_multiplier,
            is_derby,
            derby_bonus,
            final_score: category_score * sport_multiplier + derby_bonus,
        }
    }

    /// The `n` best articles, highest score first.
    ///
    /// Ties go to the earliest `published_at` (undated last), then to the
    /// smaller id, so the order is total and repeatable.
    pub fn top_n(&self, articles: &[Article], n: usize) -> Vec<RankedArticle> {
        let mut scored: Vec<(PriorityScoreRecord, &Article)> =
            articles.iter().map(|a| (self.score(a), a)).collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            OrderedFloat(sb.final_score)
                .cmp(&OrderedFloat(sa.final_score))
                .then_with(|| match (a.published_at, b.published_at) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                })
                .then_with(|| a.id.cmp(&b.id))
        });

        let ranked: Vec<RankedArticle> = scored
            .into_iter()
            .take(n)
            .enumerate()
            .map(|(i, (score, article))| RankedArticle {
                rank: i + 1,
                article: article.clone(),
                score,
            })
            .collect();

        info!(input = articles.len(), selected = ranked.len(), "Prioritized articles");
        for r in ranked.iter().take(5) {
            debug!(
                rank = r.rank,
                article_id = %r.article.id,
                score = r.score.final_score,
                sport = %r.score.sport,
                "Top article"
            );
        }
        ranked
    }
}
