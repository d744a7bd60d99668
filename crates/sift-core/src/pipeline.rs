//! One batch run: embed, validate, dedup against history, group.
//!
//! The pipeline owns no state across runs besides the injected store. Merge
//! decisions and enrichment happen between [`Pipeline::process`] and
//! [`Pipeline::record_history`], usually in an external service.

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{error, info, warn};

use crate::config::SiftConfig;
use crate::dedup::{CrossRunDeduplicator, RegionDedupStats, WithinRunGrouper};
use crate::diff::{DiffReport, RegionDiffAnalyzer};
use crate::error::{SiftError, SiftResult};
use crate::priority::{PriorityScorer, RankedArticle};
use crate::traits::{
    embed_checked, Embedder, EmbeddingStore, KeepSeparateDecider, MergeDecider, MergeDecision,
};
use crate::types::{
    Article, ArticleError, DedupLogEntry, EmbeddingRecord, Group, Region, RunContext, Stage,
};
use crate::vector::validate_vector;

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// No input articles.
    Empty,
    /// Every article was excluded before dedup.
    AllExcluded,
    /// Every comparable article duplicated history.
    AllDuplicates,
}

/// Article counts into and out of each stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub input: usize,
    /// Articles that needed a provider embedding.
    pub embedded: usize,
    /// Articles dropped for embedding or vector errors.
    pub excluded: usize,
    pub dropped_by_dedup: usize,
    pub survivors: usize,
    /// Groups with two or more members.
    pub group_count: usize,
    pub grouped_article_count: usize,
    pub singleton_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsUsed {
    pub dedup_default: f32,
    pub dedup_lookback_days: u32,
    pub grouping: f32,
}

/// Processing metadata written alongside every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub date: NaiveDate,
    pub status: RunStatus,
    pub counts: StageCounts,
    pub thresholds: ThresholdsUsed,
    pub region_stats: BTreeMap<Region, RegionDedupStats>,
    pub created_at: DateTime<Utc>,
}

/// Everything [`Pipeline::process`] produces.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: RunReport,
    /// Articles that survived dedup, in input order. Group indices point here.
    pub survivors: Vec<Article>,
    pub groups: Vec<Group>,
    pub dedup_log: Vec<DedupLogEntry>,
    /// Per-article failures; none of them aborted the run.
    pub errors: Vec<ArticleError>,
}

/// Result of [`Pipeline::apply_merges`].
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub articles: Vec<Article>,
    /// Groups collapsed fully or partially.
    pub merged_groups: usize,
    pub errors: Vec<ArticleError>,
}

/// Batch engine for one run at a time.
pub struct Pipeline {
    config: SiftConfig,
    store: Arc<dyn EmbeddingStore>,
    embedder: Option<Arc<dyn Embedder>>,
    merge_decider: Arc<dyn MergeDecider>,
}

impl Pipeline {
    pub fn new(config: SiftConfig, store: Arc<dyn EmbeddingStore>) -> Self {
        Self {
            config,
            store,
            embedder: None,
            merge_decider: Arc::new(KeepSeparateDecider),
        }
    }

    /// Provider used for articles that arrive without an embedding.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_merge_decider(mut self, decider: Arc<dyn MergeDecider>) -> Self {
        self.merge_decider = decider;
        self
    }

    pub fn config(&self) -> &SiftConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn EmbeddingStore> {
        &self.store
    }

    /// Run dedup and grouping over one run's articles.
    ///
    /// Only store failures are returned as errors. Embedding and vector
    /// problems exclude the affected articles and are listed in
    /// [`RunOutput::errors`].
    pub async fn process(&self, articles: Vec<Article>, run: &RunContext) -> SiftResult<RunOutput> {
        let mut counts = StageCounts {
            input: articles.len(),
            ..Default::default()
        };
        let mut errors = Vec::new();
        info!(run_id = %run.run_id, date = %run.date, input = counts.input, "Starting run");

        let articles: Vec<Article> = articles.into_iter().map(Article::with_region_fallback).collect();
        let (articles, embedded) = self.embed_missing(articles, &mut errors).await;
        counts.embedded = embedded;

        let expected_dim = self.config.embedder.config.embedding_dims;
        let mut valid = Vec::with_capacity(articles.len());
        for article in articles {
            match validate_vector(&article.embedding, Some(expected_dim)) {
                Ok(()) => valid.push(article),
                Err(e) => {
                    let e = e.for_article(&article.id);
                    warn!(article_id = %article.id, error = %e, "Excluding article with invalid embedding");
                    // embedding failures are already logged
                    if !errors.iter().any(|logged| logged.article_id == article.id) {
                        errors.push(ArticleError::new(&article.id, Stage::Validation, &e));
                    }
                }
            }
        }

        let dedup = CrossRunDeduplicator::new(Arc::clone(&self.store))
            .with_min_content_length(self.config.dedup.min_content_length);
        let thresholds = self.config.dedup.thresholds();
        let comparable = valid.len();
        let outcome = dedup.filter(valid, run, self.config.dedup.lookback_days, &thresholds)?;
        counts.excluded = counts.input - comparable + outcome.excluded.len();
        errors.extend(outcome.excluded);
        counts.dropped_by_dedup = outcome.dropped.len();
        counts.survivors = outcome.survivors.len();

        let groups = if outcome.survivors.is_empty() {
            Vec::new()
        } else {
            WithinRunGrouper::new().group(&outcome.survivors, self.config.grouping.threshold)?
        };
        for g in &groups {
            if g.is_merge_candidate() {
                counts.group_count += 1;
                counts.grouped_article_count += g.size();
            } else {
                counts.singleton_count += 1;
            }
        }

        let status = if counts.input == 0 {
            RunStatus::Empty
        } else if comparable == 0 {
            RunStatus::AllExcluded
        } else if counts.survivors == 0 {
            RunStatus::AllDuplicates
        } else {
            RunStatus::Success
        };

        let report = RunReport {
            run_id: run.run_id.clone(),
            date: run.date,
            status,
            counts,
            thresholds: ThresholdsUsed {
                dedup_default: thresholds.default_threshold(),
                dedup_lookback_days: self.config.dedup.lookback_days,
                grouping: self.config.grouping.threshold,
            },
            region_stats: outcome.region_stats,
            created_at: Utc::now(),
        };

        info!(
            run_id = %run.run_id,
            status = %report.status,
            input = report.counts.input,
            excluded = report.counts.excluded,
            dropped = report.counts.dropped_by_dedup,
            survivors = report.counts.survivors,
            groups = report.counts.group_count,
            singletons = report.counts.singleton_count,
            "Run complete"
        );

        Ok(RunOutput {
            report,
            survivors: outcome.survivors,
            groups,
            dedup_log: outcome.dropped,
            errors,
        })
    }

    /// Fill in embeddings for articles that lack one. Articles of a failed
    /// batch come back unembedded and are excluded by validation later.
    async fn embed_missing(
        &self,
        mut articles: Vec<Article>,
        errors: &mut Vec<ArticleError>,
    ) -> (Vec<Article>, usize) {
        let missing: Vec<usize> = articles
            .iter()
            .enumerate()
            .filter(|(_, a)| !a.has_embedding())
            .map(|(i, _)| i)
            .collect();
        if missing.is_empty() {
            return (articles, 0);
        }

        let Some(embedder) = &self.embedder else {
            warn!(count = missing.len(), "Articles without embeddings and no embedder configured");
            return (articles, 0);
        };

        let cfg = &self.config.embedder.config;
        let batch_size = cfg.batch_size.max(1);
        let total_batches = missing.len().div_ceil(batch_size);
        let mut embedded = 0;
        for (batch_num, chunk) in missing.chunks(batch_size).enumerate() {
            let texts: Vec<String> = chunk
                .iter()
                .map(|&i| articles[i].embedding_text(cfg.max_text_chars))
                .collect();
            info!(
                batch = batch_num + 1,
                total_batches,
                size = chunk.len(),
                model = embedder.model_name(),
                "Requesting embedding batch"
            );
            match embed_checked(&**embedder, &texts).await {
                Ok(vectors) => {
                    for (&i, vector) in chunk.iter().zip(vectors) {
                        articles[i].embedding = vector;
                        embedded += 1;
                    }
                }
                Err(e) => {
                    error!(batch = batch_num + 1, size = chunk.len(), error = %e, "Embedding batch failed");
                    for &i in chunk {
                        errors.push(ArticleError::new(&articles[i].id, Stage::Embedding, &e));
                    }
                }
            }
        }
        info!(embedded, requested = missing.len(), model = embedder.model_name(), "Embedded articles");
        (articles, embedded)
    }

    /// Ask the merge decider about every merge-candidate group and build the
    /// final article set.
    ///
    /// Output follows group id order; a merged article takes the place of its
    /// group's first member. A failing or inconsistent verdict keeps the
    /// group's articles separate and is recorded.
    pub async fn apply_merges(&self, survivors: &[Article], groups: &[Group]) -> MergeOutcome {
        let mut ordered: Vec<&Group> = groups.iter().collect();
        ordered.sort_by_key(|g| g.group_id);

        let members: Vec<Vec<Article>> = ordered
            .iter()
            .map(|g| {
                g.member_indices
                    .iter()
                    .filter_map(|&i| survivors.get(i).cloned())
                    .collect()
            })
            .collect();

        // Decisions are independent; ask for all of them at once.
        let decisions = join_all(ordered.iter().zip(&members).map(|(group, m)| async move {
            if group.is_merge_candidate() {
                Some(self.merge_decider.decide(m).await)
            } else {
                None
            }
        }))
        .await;

        let mut outcome = MergeOutcome::default();
        for ((group, owned), decision) in ordered.into_iter().zip(members).zip(decisions) {
            let Some(decision) = decision else {
                outcome.articles.extend(owned);
                continue;
            };

            let resolved = {
                let refs: Vec<&Article> = owned.iter().collect();
                decision.and_then(|d| resolve_merge(&refs, &d))
            };
            match resolved {
                Ok(Some((merged, kept))) => {
                    info!(
                        group_id = group.group_id,
                        primary = %merged.id,
                        merged = merged.merged_from.len(),
                        "Merged group"
                    );
                    outcome.merged_groups += 1;
                    outcome.articles.push(merged);
                    outcome.articles.extend(kept);
                }
                Ok(None) => outcome.articles.extend(owned),
                Err(e) => {
                    warn!(group_id = group.group_id, error = %e, "Merge decision failed, keeping articles separate");
                    let first = owned.first().map(|a| a.id.clone()).unwrap_or_default();
                    outcome.errors.push(ArticleError::new(first, Stage::Merge, &e));
                    outcome.articles.extend(owned);
                }
            }
        }
        info!(
            groups = groups.len(),
            merged_groups = outcome.merged_groups,
            articles = outcome.articles.len(),
            "Applied merge decisions"
        );
        outcome
    }

    /// Append `articles` to the embedding history under `run`.
    ///
    /// Articles without a usable embedding are skipped. Returns the number
    /// of newly stored records.
    pub fn record_history(&self, articles: &[Article], run: &RunContext) -> SiftResult<usize> {
        let records: Vec<EmbeddingRecord> = articles
            .iter()
            .filter(|a| {
                let usable = validate_vector(&a.embedding, None).is_ok();
                if !usable {
                    warn!(article_id = %a.id, "Not recording article without a usable embedding");
                }
                usable
            })
            .map(|a| EmbeddingRecord::from_article(&a.clone().with_region_fallback(), run))
            .collect();
        let added = self.store.append(&run.run_id, &records)?;
        info!(run_id = %run.run_id, added, offered = articles.len(), "Recorded embedding history");
        Ok(added)
    }

    /// Region diff with the configured window and threshold.
    pub fn diff(&self, population_a: &[Article], region_b: &Region, run: &RunContext) -> SiftResult<DiffReport> {
        RegionDiffAnalyzer::new(Arc::clone(&self.store)).find_unique(population_a, region_b, run, &self.config.diff)
    }

    /// Top articles by priority; `n` defaults to the configured `top_n`.
    pub fn prioritize(&self, articles: &[Article], n: Option<usize>) -> Vec<RankedArticle> {
        PriorityScorer::new(self.config.priority.clone()).top_n(articles, n.unwrap_or(self.config.priority.top_n))
    }
}

/// Turn a verdict into `(merged article, members left separate)`, or `None`
/// when nothing is merged.
fn resolve_merge(members: &[&Article], decision: &MergeDecision) -> SiftResult<Option<(Article, Vec<Article>)>> {
    let by_id: HashMap<&str, &Article> = members.iter().map(|a| (a.id.as_str(), *a)).collect();

    let (primary_id, folded): (&str, Vec<&str>) = match decision {
        MergeDecision::KeepSeparate => return Ok(None),
        MergeDecision::Merge { primary_id } => (
            primary_id.as_str(),
            members
                .iter()
                .map(|a| a.id.as_str())
                .filter(|id| *id != primary_id.as_str())
                .collect(),
        ),
        MergeDecision::PartialMerge { primary_id, merged_ids } => {
            let mut folded = Vec::new();
            for id in merged_ids {
                if !by_id.contains_key(id.as_str()) {
                    return Err(SiftError::merge_decision(format!("'{}' is not a member of the group", id)));
                }
                if id != primary_id && !folded.contains(&id.as_str()) {
                    folded.push(id.as_str());
                }
            }
            (primary_id.as_str(), folded)
        }
    };

    let primary = by_id
        .get(primary_id)
        .ok_or_else(|| SiftError::merge_decision(format!("primary '{}' is not a member of the group", primary_id)))?;
    if folded.is_empty() {
        return Ok(None);
    }

    let others: Vec<&Article> = folded.iter().filter_map(|id| by_id.get(id).copied()).collect();
    let merged = Article::merge(primary, &others);
    let kept = members
        .iter()
        .filter(|a| a.id != primary_id && !folded.contains(&a.id.as_str()))
        .map(|a| (*a).clone())
        .collect();
    Ok(Some((merged, kept)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryEmbeddingStore;
    use async_trait::async_trait;

    struct FixedDecider(MergeDecision);

    #[async_trait]
    impl MergeDecider for FixedDecider {
        async fn decide(&self, _members: &[Article]) -> SiftResult<MergeDecision> {
            Ok(self.0.clone())
        }
    }

    struct FailingDecider;

    #[async_trait]
    impl MergeDecider for FailingDecider {
        async fn decide(&self, _members: &[Article]) -> SiftResult<MergeDecision> {
            Err(SiftError::merge_decision("service unavailable"))
        }
    }

    fn pipeline() -> Pipeline {
        let config = SiftConfig::builder().embedding_dims(2).build();
        Pipeline::new(config, Arc::new(InMemoryEmbeddingStore::new()))
    }

    fn article(id: &str, v: Vec<f32>) -> Article {
        Article::new(id, id, Region::tr()).with_embedding(v)
    }

    fn group(id: usize, indices: Vec<usize>, survivors: &[Article]) -> Group {
        Group {
            group_id: id,
            member_article_ids: indices.iter().map(|&i| survivors[i].id.clone()).collect(),
            max_similarity: 0.9,
            member_indices: indices,
        }
    }

    #[tokio::test]
    async fn test_empty_run() {
        let run = RunContext::generate();
        let out = pipeline().process(Vec::new(), &run).await.unwrap();
        assert_eq!(out.report.status, RunStatus::Empty);
        assert!(out.groups.is_empty());
    }

    /// Fails every request after the first.
    struct FlakyEmbedder {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, _text: &str) -> SiftResult<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> SiftResult<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call > 0 {
                return Err(SiftError::embedding("rate limited"));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_failed_batch_excludes_only_its_articles() {
        let mut config = SiftConfig::builder().embedding_dims(2).build();
        config.embedder.config.batch_size = 2;
        let embedder = Arc::new(FlakyEmbedder {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let pipeline =
            Pipeline::new(config, Arc::new(InMemoryEmbeddingStore::new())).with_embedder(embedder.clone());

        let articles = vec![
            Article::new("a", "a", Region::tr()),
            Article::new("b", "b", Region::tr()),
            Article::new("c", "c", Region::tr()),
        ];
        let out = pipeline.process(articles, &RunContext::generate()).await.unwrap();

        assert_eq!(embedder.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(out.report.counts.embedded, 2);
        assert_eq!(out.report.counts.excluded, 1);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].article_id, "c");
        assert_eq!(out.errors[0].stage, Stage::Embedding);
        assert_eq!(out.survivors.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_vectors_are_reported() {
        let run = RunContext::generate();
        let out = pipeline()
            .process(
                vec![article("bad", vec![1.0, 0.0, 0.0]), article("missing", vec![])],
                &run,
            )
            .await
            .unwrap();
        assert_eq!(out.report.status, RunStatus::AllExcluded);
        assert_eq!(out.report.counts.excluded, 2);
        assert_eq!(out.errors[0].code, "VEC_001");
        assert_eq!(out.errors[0].stage, Stage::Validation);
    }

    #[tokio::test]
    async fn test_apply_merges_full_merge() {
        let survivors = vec![article("a", vec![1.0, 0.0]), article("b", vec![1.0, 0.1]), article("c", vec![0.0, 1.0])];
        let groups = vec![group(0, vec![0, 1], &survivors), group(1, vec![2], &survivors)];
        let p = pipeline().with_merge_decider(Arc::new(FixedDecider(MergeDecision::Merge {
            primary_id: "b".to_string(),
        })));

        let outcome = p.apply_merges(&survivors, &groups).await;
        assert_eq!(outcome.merged_groups, 1);
        let ids: Vec<&str> = outcome.articles.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(outcome.articles[0].merged_from, vec!["b".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn test_apply_merges_partial() {
        let survivors = vec![article("a", vec![1.0, 0.0]), article("b", vec![1.0, 0.1]), article("c", vec![1.0, 0.2])];
        let groups = vec![group(0, vec![0, 1, 2], &survivors)];
        let p = pipeline().with_merge_decider(Arc::new(FixedDecider(MergeDecision::PartialMerge {
            primary_id: "a".to_string(),
            merged_ids: vec!["c".to_string()],
        })));

        let outcome = p.apply_merges(&survivors, &groups).await;
        let ids: Vec<&str> = outcome.articles.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(outcome.articles[0].merged_from, vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn test_decider_failure_keeps_separate() {
        let survivors = vec![article("a", vec![1.0, 0.0]), article("b", vec![1.0, 0.1])];
        let groups = vec![group(0, vec![0, 1], &survivors)];
        let p = pipeline().with_merge_decider(Arc::new(FailingDecider));

        let outcome = p.apply_merges(&survivors, &groups).await;
        assert_eq!(outcome.articles.len(), 2);
        assert_eq!(outcome.merged_groups, 0);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].stage, Stage::Merge);
    }

    #[tokio::test]
    async fn test_unknown_primary_is_an_error() {
        let survivors = vec![article("a", vec![1.0, 0.0]), article("b", vec![1.0, 0.1])];
        let groups = vec![group(0, vec![0, 1], &survivors)];
        let p = pipeline().with_merge_decider(Arc::new(FixedDecider(MergeDecision::Merge {
            primary_id: "zzz".to_string(),
        })));
        let outcome = p.apply_merges(&survivors, &groups).await;
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.articles.len(), 2);
    }

    #[test]
    fn test_record_history_skips_unembedded() {
        let p = pipeline();
        let run = RunContext::generate();
        let added = p
            .record_history(&[article("a", vec![1.0, 0.0]), article("b", vec![])], &run)
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(p.record_history(&[article("a", vec![1.0, 0.0])], &run).unwrap(), 0);
    }
}
