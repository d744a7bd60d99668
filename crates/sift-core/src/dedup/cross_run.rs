//! Cross-run deduplication against the embedding history.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RegionThresholds;
use crate::error::SiftResult;
use crate::traits::EmbeddingStore;
use crate::types::{
    Article, ArticleError, DedupLogEntry, DedupReason, EmbeddingRecord, Region, RunContext, Stage,
};
use crate::vector::{similarity_matrix, validate_vector};

const LOG_TITLE_CHARS: usize = 100;

/// Kept/dropped counts for one region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionDedupStats {
    pub threshold: f32,
    /// True when the region had no configured threshold.
    pub fallback: bool,
    pub history_size: usize,
    pub kept: usize,
    pub dropped: usize,
}

/// Result of [`CrossRunDeduplicator::filter`].
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Articles with no close match in history, in input order.
    pub survivors: Vec<Article>,
    /// One entry per dropped article, in input order.
    pub dropped: Vec<DedupLogEntry>,
    /// Articles that could not be compared (unusable vectors).
    pub excluded: Vec<ArticleError>,
    pub region_stats: BTreeMap<Region, RegionDedupStats>,
}

/// Drops articles that are too close to something seen in a recent run.
pub struct CrossRunDeduplicator {
    store: Arc<dyn EmbeddingStore>,
    min_content_length: usize,
}

impl CrossRunDeduplicator {
    pub fn new(store: Arc<dyn EmbeddingStore>) -> Self {
        Self {
            store,
            min_content_length: 0,
        }
    }

    /// Ignore history records whose known body length is below `min`.
    pub fn with_min_content_length(mut self, min: usize) -> Self {
        self.min_content_length = min;
        self
    }

    /// Split `articles` into survivors and duplicates of history.
    ///
    /// Each article is compared with every history record of its own region
    /// dated within `run.window(lookback_days)`, excluding the current run.
    /// An article whose best similarity is at or above its region's threshold
    /// is dropped. Store failures abort the call; unusable article vectors
    /// only exclude that article.
    pub fn filter(
        &self,
        articles: Vec<Article>,
        run: &RunContext,
        lookback_days: u32,
        thresholds: &RegionThresholds,
    ) -> SiftResult<DedupOutcome> {
        let (date_from, date_to) = run.window(lookback_days);
        let mut outcome = DedupOutcome::default();

        // Bucket comparable articles by region and dimension, keeping input positions.
        let mut buckets: BTreeMap<(Region, usize), Vec<usize>> = BTreeMap::new();
        let mut slots: Vec<Option<Article>> = Vec::with_capacity(articles.len());
        for (idx, article) in articles.into_iter().enumerate() {
            match validate_vector(&article.embedding, None) {
                Ok(()) => {
                    buckets
                        .entry((article.region.clone(), article.embedding.len()))
                        .or_default()
                        .push(idx);
                    slots.push(Some(article));
                }
                Err(e) => {
                    let e = e.for_article(&article.id);
                    warn!(article_id = %article.id, error = %e, "Excluding article from dedup");
                    outcome.excluded.push(ArticleError::new(&article.id, Stage::Dedup, &e));
                    slots.push(None);
                }
            }
        }

        let mut history_cache: HashMap<Region, Vec<EmbeddingRecord>> = HashMap::new();
        let mut verdicts: HashMap<usize, DedupLogEntry> = HashMap::new();

        for ((region, dim), members) in &buckets {
            let (threshold, fallback) = thresholds.resolve(region);
            if fallback {
                warn!(
                    region = %region,
                    threshold,
                    "No dedup threshold for region, using default"
                );
            }

            if !history_cache.contains_key(region) {
                let records = self.load_history(region, date_from, date_to, &run.run_id)?;
                history_cache.insert(region.clone(), records);
            }
            let history: Vec<&EmbeddingRecord> = history_cache
                .get(region)
                .map(|records| records.iter().filter(|r| r.embedding.len() == *dim).collect())
                .unwrap_or_default();
            let total_history = history_cache.get(region).map_or(0, Vec::len);
            if history.len() < total_history {
                warn!(
                    region = %region,
                    skipped = total_history - history.len(),
                    expected_dim = dim,
                    "Skipping history records with a different embedding dimension"
                );
            }

            let current: Vec<&[f32]> = members
                .iter()
                .filter_map(|&i| slots[i].as_ref().map(|a| a.embedding.as_slice()))
                .collect();
            let past: Vec<&[f32]> = history.iter().map(|r| r.embedding.as_slice()).collect();
            let matrix = similarity_matrix(&current, &past)?;

            let stats = outcome.region_stats.entry(region.clone()).or_insert(RegionDedupStats {
                threshold,
                fallback,
                ..Default::default()
            });
            stats.history_size += history.len();

            for (row, &idx) in members.iter().enumerate() {
                let Some(article) = slots[idx].as_ref() else { continue };
                match matrix.row_max(row) {
                    Some((col, sim)) if sim >= threshold => {
                        let matched = history[col];
                        debug!(
                            article_id = %article.id,
                            matched_article_id = %matched.article_id,
                            similarity = sim,
                            threshold,
                            "Dropping cross-run duplicate"
                        );
                        verdicts.insert(
                            idx,
                            DedupLogEntry {
                                article_id: article.id.clone(),
                                matched_article_id: matched.article_id.clone(),
                                region: region.clone(),
                                max_similarity: sim,
                                threshold_used: threshold,
                                reason: DedupReason::CrossRunDuplicate,
                                title: article.title.chars().take(LOG_TITLE_CHARS).collect(),
                                matched_url: matched.url.clone(),
                            },
                        );
                        stats.dropped += 1;
                    }
                    _ => stats.kept += 1,
                }
            }
        }

        for (idx, slot) in slots.into_iter().enumerate() {
            let Some(article) = slot else { continue };
            match verdicts.remove(&idx) {
                Some(entry) => outcome.dropped.push(entry),
                None => outcome.survivors.push(article),
            }
        }

        for (region, stats) in &outcome.region_stats {
            info!(
                region = %region,
                threshold = stats.threshold,
                history = stats.history_size,
                kept = stats.kept,
                dropped = stats.dropped,
                "Cross-run dedup by region"
            );
        }
        info!(
            survivors = outcome.survivors.len(),
            dropped = outcome.dropped.len(),
            excluded = outcome.excluded.len(),
            lookback_days,
            "Cross-run dedup complete"
        );

        Ok(outcome)
    }

    fn load_history(
        &self,
        region: &Region,
        date_from: chrono::NaiveDate,
        date_to: chrono::NaiveDate,
        run_id: &str,
    ) -> SiftResult<Vec<EmbeddingRecord>> {
        let records = self.store.query(region, date_from, date_to, Some(run_id))?;
        let total = records.len();
        let usable: Vec<EmbeddingRecord> = records
            .into_iter()
            .filter(|r| r.content_length.map_or(true, |len| len >= self.min_content_length))
            .filter(|r| validate_vector(&r.embedding, None).is_ok())
            .collect();
        debug!(
            region = %region,
            %date_from,
            %date_to,
            loaded = total,
            usable = usable.len(),
            "Loaded dedup history"
        );
        Ok(usable)
    }
}
