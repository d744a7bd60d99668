//! Within-run grouping of near-duplicate articles.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SiftResult;
use crate::types::{Article, Group};
use crate::vector::{similarity_matrix, validate_vector};

use super::union_find::UnionFind;

/// Two run-mates at or above the grouping threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePair {
    pub article_a: String,
    pub article_b: String,
    pub similarity: f32,
}

/// Partitions a run's surviving articles into groups of near-duplicates.
///
/// Grouping is transitive: if A~B and B~C then A, B and C share a group even
/// when A and C are not similar themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct WithinRunGrouper;

impl WithinRunGrouper {
    pub fn new() -> Self {
        Self
    }

    /// Group `survivors`: every pair with similarity `>= threshold` is joined.
    ///
    /// Every article lands in exactly one group; articles similar to nothing
    /// become singletons with `max_similarity` 1.0. Group ids follow the
    /// position of each group's first member; the returned list is ordered
    /// largest group first, ties by id.
    ///
    /// Articles whose embedding is unusable, or whose dimension differs from
    /// the first usable one, are never joined and come back as singletons.
    pub fn group(&self, survivors: &[Article], threshold: f32) -> SiftResult<Vec<Group>> {
        let edges = similar_pairs(survivors, threshold)?;

        let mut uf = UnionFind::new(survivors.len());
        for &(i, j, _) in &edges {
            uf.union(i, j);
        }

        let sets = uf.sets();
        let mut group_of = vec![0usize; survivors.len()];
        for (group_id, members) in sets.iter().enumerate() {
            for &m in members {
                group_of[m] = group_id;
            }
        }

        let mut max_edge: Vec<Option<f32>> = vec![None; sets.len()];
        for &(i, _, sim) in &edges {
            let slot = &mut max_edge[group_of[i]];
            *slot = Some(slot.map_or(sim, |best| best.max(sim)));
        }

        let mut groups: Vec<Group> = sets
            .into_iter()
            .enumerate()
            .map(|(group_id, members)| Group {
                group_id,
                member_article_ids: members.iter().map(|&m| survivors[m].id.clone()).collect(),
                max_similarity: max_edge[group_id].unwrap_or(1.0),
                member_indices: members,
            })
            .collect();
        groups.sort_by(|a, b| b.size().cmp(&a.size()).then(a.group_id.cmp(&b.group_id)));

        let singletons = groups.iter().filter(|g| g.is_singleton()).count();
        info!(
            articles = survivors.len(),
            groups = groups.len() - singletons,
            singletons,
            threshold,
            "Within-run grouping complete"
        );
        Ok(groups)
    }

    /// All pairs at or above `threshold`, most similar first.
    pub fn candidate_pairs(&self, articles: &[Article], threshold: f32) -> SiftResult<Vec<CandidatePair>> {
        let mut pairs = similar_pairs(articles, threshold)?;
        pairs.sort_by(|a, b| OrderedFloat(b.2).cmp(&OrderedFloat(a.2)));
        Ok(pairs
            .into_iter()
            .map(|(i, j, similarity)| CandidatePair {
                article_a: articles[i].id.clone(),
                article_b: articles[j].id.clone(),
                similarity,
            })
            .collect())
    }
}

/// `(i, j, similarity)` with `i < j` for every comparable pair at or above
/// `threshold`, indexed into `articles`.
fn similar_pairs(articles: &[Article], threshold: f32) -> SiftResult<Vec<(usize, usize, f32)>> {
    let Some(dim) = articles
        .iter()
        .find(|a| validate_vector(&a.embedding, None).is_ok())
        .map(|a| a.embedding.len())
    else {
        if !articles.is_empty() {
            warn!(count = articles.len(), "No usable embeddings to group");
        }
        return Ok(Vec::new());
    };

    let mut comparable = Vec::with_capacity(articles.len());
    for (i, article) in articles.iter().enumerate() {
        match validate_vector(&article.embedding, Some(dim)) {
            Ok(()) => comparable.push(i),
            Err(e) => {
                let e = e.for_article(&article.id);
                warn!(article_id = %article.id, error = %e, "Leaving article ungrouped");
            }
        }
    }

    let vectors: Vec<&[f32]> = comparable.iter().map(|&i| articles[i].embedding.as_slice()).collect();
    let matrix = similarity_matrix(&vectors, &vectors)?;
    Ok(matrix
        .upper_triangle_pairs(threshold)
        .into_iter()
        .map(|(i, j, sim)| (comparable[i], comparable[j], sim))
        .collect())
}
