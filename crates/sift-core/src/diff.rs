//! Region difference analysis: stories one region covers and another does not.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::DiffConfig;
use crate::error::SiftResult;
use crate::traits::EmbeddingStore;
use crate::types::{Article, ClosestMatch, EmbeddingRecord, Region, RunContext, UniqueArticle};
use crate::vector::{similarity_matrix, validate_vector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffMetadata {
    pub region_a: Region,
    pub region_b: Region,
    pub threshold: f32,
    pub lookback_days: u32,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Comparable articles in population A.
    pub total_a: usize,
    /// Distinct history records gathered for population B.
    pub total_b: usize,
    pub unique_to_a: usize,
}

/// Articles of population A with no close counterpart in population B.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    pub metadata: DiffMetadata,
    pub summary: DiffSummary,
    pub unique_articles: Vec<UniqueArticle>,
}

/// Reports population-A articles missing from population B's recent history.
///
/// One-directional: `A vs B` and `B vs A` answer different questions and
/// need not agree. Nothing is dropped or modified.
pub struct RegionDiffAnalyzer {
    store: Arc<dyn EmbeddingStore>,
}

impl RegionDiffAnalyzer {
    pub fn new(store: Arc<dyn EmbeddingStore>) -> Self {
        Self { store }
    }

    /// Compare `population_a` with `region_b`'s history over
    /// `run.window(config.lookback_days)`.
    ///
    /// The window includes the run's own records. Population B is
    /// deduplicated by article id, first occurrence wins. An empty population
    /// on either side yields an empty report.
    pub fn find_unique(
        &self,
        population_a: &[Article],
        region_b: &Region,
        run: &RunContext,
        config: &DiffConfig,
    ) -> SiftResult<DiffReport> {
        let (date_from, date_to) = run.window(config.lookback_days);
        let history = self.store.query(region_b, date_from, date_to, None)?;

        let mut seen = HashSet::new();
        let population_b: Vec<EmbeddingRecord> = history
            .into_iter()
            .filter(|r| seen.insert(r.article_id.clone()))
            .collect();

        let region_a = population_a
            .first()
            .map(|a| a.region.clone())
            .unwrap_or_default();

        let (comparable, unique_articles) = compare_populations(population_a, &population_b, config.threshold)?;

        let report = DiffReport {
            metadata: DiffMetadata {
                region_a,
                region_b: region_b.clone(),
                threshold: config.threshold,
                lookback_days: config.lookback_days,
                date_from,
                date_to,
                generated_at: Utc::now(),
            },
            summary: DiffSummary {
                total_a: comparable,
                total_b: population_b.len(),
                unique_to_a: unique_articles.len(),
            },
            unique_articles,
        };

        info!(
            region_a = %report.metadata.region_a,
            region_b = %region_b,
            total_a = report.summary.total_a,
            total_b = report.summary.total_b,
            unique = report.summary.unique_to_a,
            threshold = config.threshold,
            "Region diff complete"
        );
        Ok(report)
    }
}

/// Core comparison: every article whose best match in `population_b` is
/// strictly below `threshold`. Returns the number of comparable A articles
/// alongside the unique ones (input order).
pub fn compare_populations(
    population_a: &[Article],
    population_b: &[EmbeddingRecord],
    threshold: f32,
) -> SiftResult<(usize, Vec<UniqueArticle>)> {
    let dim = population_a
        .iter()
        .find(|a| validate_vector(&a.embedding, None).is_ok())
        .map(|a| a.embedding.len());
    let Some(dim) = dim else {
        info!("Population A has no comparable articles");
        return Ok((0, Vec::new()));
    };

    let comparable: Vec<&Article> = population_a
        .iter()
        .filter(|a| match validate_vector(&a.embedding, Some(dim)) {
            Ok(()) => true,
            Err(e) => {
                warn!(article_id = %a.id, error = %e, "Skipping article in region diff");
                false
            }
        })
        .collect();

    let others: Vec<&EmbeddingRecord> = population_b
        .iter()
        .filter(|r| validate_vector(&r.embedding, Some(dim)).is_ok())
        .collect();
    if others.len() < population_b.len() {
        warn!(
            skipped = population_b.len() - others.len(),
            expected_dim = dim,
            "Skipping unusable population B records"
        );
    }
    if others.is_empty() {
        info!("Population B is empty; nothing to compare");
        return Ok((comparable.len(), Vec::new()));
    }

    let a_vectors: Vec<&[f32]> = comparable.iter().map(|a| a.embedding.as_slice()).collect();
    let b_vectors: Vec<&[f32]> = others.iter().map(|r| r.embedding.as_slice()).collect();
    let matrix = similarity_matrix(&a_vectors, &b_vectors)?;

    let mut unique = Vec::new();
    for (row, article) in comparable.iter().enumerate() {
        let Some((col, max_similarity)) = matrix.row_max(row) else { continue };
        if max_similarity < threshold {
            let closest = others[col];
            unique.push(UniqueArticle {
                article: (*article).clone(),
                max_similarity,
                closest_match: Some(ClosestMatch {
                    article_id: closest.article_id.clone(),
                    title: closest.title.clone(),
                    url: closest.url.clone(),
                    similarity: max_similarity,
                }),
            });
        }
    }
    Ok((comparable.len(), unique))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryEmbeddingStore;

    fn run() -> RunContext {
        RunContext::new("r-today", NaiveDate::from_ymd_opt(2025, 6, 10).unwrap())
    }

    fn days_ago(n: u64) -> NaiveDate {
        run().date.checked_sub_days(chrono::Days::new(n)).unwrap()
    }

    fn article(id: &str, region: Region, v: Vec<f32>) -> Article {
        Article::new(id, id, region).with_embedding(v)
    }

    fn record(id: &str, region: Region, date: NaiveDate, v: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord::new(id, region, date, format!("run-{}", date), v).with_title(id)
    }

    #[test]
    fn test_reports_unmatched_articles() {
        let store = Arc::new(InMemoryEmbeddingStore::with_records(vec![
            record("eu1", Region::eu(), days_ago(2), vec![1.0, 0.0]),
        ]));
        let analyzer = RegionDiffAnalyzer::new(store);
        let a = vec![
            article("tr1", Region::tr(), vec![1.0, 0.05]),
            article("tr2", Region::tr(), vec![0.0, 1.0]),
        ];
        let report = analyzer
            .find_unique(&a, &Region::eu(), &run(), &DiffConfig::default())
            .unwrap();

        assert_eq!(report.summary.total_a, 2);
        assert_eq!(report.summary.total_b, 1);
        assert_eq!(report.unique_articles.len(), 1);
        let unique = &report.unique_articles[0];
        assert_eq!(unique.article.id, "tr2");
        assert_eq!(unique.max_similarity, 0.0);
        let closest = unique.closest_match.as_ref().unwrap();
        assert_eq!(closest.article_id, "eu1");
        assert_eq!(closest.title.as_deref(), Some("eu1"));
        assert_eq!(report.metadata.region_a, Region::tr());
    }

    #[test]
    fn test_window_limits_history() {
        let store = Arc::new(InMemoryEmbeddingStore::with_records(vec![
            record("eu-old", Region::eu(), days_ago(4), vec![1.0, 0.0]),
        ]));
        let analyzer = RegionDiffAnalyzer::new(store);
        let a = vec![article("tr1", Region::tr(), vec![1.0, 0.0])];
        let report = analyzer
            .find_unique(&a, &Region::eu(), &run(), &DiffConfig::default())
            .unwrap();
        // Nothing in the default window: population B is empty.
        assert_eq!(report.summary.total_b, 0);
        assert!(report.unique_articles.is_empty());
    }

    #[test]
    fn test_population_b_deduplicated_by_id() {
        let mut again = record("eu1", Region::eu(), days_ago(0), vec![1.0, 0.0]);
        again.run_id = "another".to_string();
        let store = Arc::new(InMemoryEmbeddingStore::with_records(vec![
            record("eu1", Region::eu(), days_ago(1), vec![1.0, 0.0]),
            again,
        ]));
        let analyzer = RegionDiffAnalyzer::new(store);
        let a = vec![article("tr1", Region::tr(), vec![0.0, 1.0])];
        let report = analyzer
            .find_unique(&a, &Region::eu(), &run(), &DiffConfig::default())
            .unwrap();
        assert_eq!(report.summary.total_b, 1);
    }

    #[test]
    fn test_not_symmetric() {
        // A has a broad story set, B covers only one of them.
        let a = vec![
            article("a1", Region::tr(), vec![1.0, 0.0]),
            article("a2", Region::tr(), vec![0.0, 1.0]),
        ];
        let b = vec![article("b1", Region::eu(), vec![1.0, 0.0])];
        let day = run().date;
        let as_records = |xs: &[Article]| -> Vec<EmbeddingRecord> {
            xs.iter()
                .map(|x| EmbeddingRecord::new(&x.id, x.region.clone(), day, "r", x.embedding.clone()))
                .collect()
        };

        let (_, a_vs_b) = compare_populations(&a, &as_records(&b), 0.75).unwrap();
        let (_, b_vs_a) = compare_populations(&b, &as_records(&a), 0.75).unwrap();
        assert_eq!(a_vs_b.len(), 1);
        assert!(b_vs_a.is_empty());
    }

    #[test]
    fn test_empty_population_a() {
        let (total, unique) = compare_populations(&[], &[], 0.75).unwrap();
        assert_eq!(total, 0);
        assert!(unique.is_empty());
    }

    #[test]
    fn test_threshold_is_strict() {
        let a = vec![article("a1", Region::tr(), vec![0.0, 4.0])];
        let b = vec![EmbeddingRecord::new("b1", Region::eu(), run().date, "r", vec![0.0, 1.0])];
        let (_, unique) = compare_populations(&a, &b, 1.0).unwrap();
        assert!(unique.is_empty());
    }
}
