//! Vector math primitives: cosine similarity, L2 normalization and
//! pairwise similarity matrices.
//!
//! Zero-magnitude vectors compare as 0.0 against everything so batch
//! operations stay total. Dimension mismatches are errors.

use rayon::prelude::*;

use crate::error::{ErrorCode, SiftError, SiftResult};

/// Check that a vector is usable: non-empty, finite, and of the expected dimension.
pub fn validate_vector(v: &[f32], expected_dim: Option<usize>) -> SiftResult<()> {
    if v.is_empty() {
        return Err(SiftError::invalid_vector(ErrorCode::VecEmpty, "embedding is empty"));
    }
    if let Some(dim) = expected_dim {
        if v.len() != dim {
            return Err(SiftError::invalid_vector(
                ErrorCode::VecDimensionMismatch,
                format!("expected dimension {}, got {}", dim, v.len()),
            ));
        }
    }
    if let Some(pos) = v.iter().position(|x| !x.is_finite()) {
        return Err(SiftError::invalid_vector(
            ErrorCode::VecNonFinite,
            format!("non-finite value at position {}", pos),
        ));
    }
    Ok(())
}

/// Euclidean norm.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm > f32::EPSILON {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity in [-1, 1].
///
/// Returns 0.0 if either vector has zero magnitude. Fails with
/// [`SiftError::InvalidVector`] when the dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> SiftResult<f32> {
    if a.len() != b.len() {
        return Err(SiftError::invalid_vector(
            ErrorCode::VecDimensionMismatch,
            format!("cannot compare dimension {} with {}", a.len(), b.len()),
        ));
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a > f32::EPSILON && norm_b > f32::EPSILON {
        Ok((dot(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0))
    } else {
        Ok(0.0)
    }
}

/// Dense row-major matrix of cosine similarities between two vector sets.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl SimilarityMatrix {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.cols + j]
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Highest value in row `i` and its column; the first column wins ties.
    /// `None` when there are no columns.
    pub fn row_max(&self, i: usize) -> Option<(usize, f32)> {
        self.row(i)
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (j, sim)| match best {
                Some((_, best_sim)) if best_sim >= sim => best,
                _ => Some((j, sim)),
            })
    }

    /// Pairs `(i, j, sim)` with `i < j` and `sim >= threshold`, in row-major order.
    ///
    /// Only meaningful for a self-similarity matrix: the diagonal and the
    /// lower triangle are skipped so no article is compared with itself and
    /// no pair is counted twice.
    pub fn upper_triangle_pairs(&self, threshold: f32) -> Vec<(usize, usize, f32)> {
        let n = self.rows.min(self.cols);
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                let sim = self.get(i, j);
                if sim >= threshold {
                    pairs.push((i, j, sim));
                }
            }
        }
        pairs
    }
}

/// All pairwise cosine similarities between `vectors_a` and `vectors_b`.
///
/// Vectors are L2-normalized once, then each cell is a dot product. Rows are
/// computed in parallel; every cell is independent, so the result does not
/// depend on the thread count.
pub fn similarity_matrix<A, B>(vectors_a: &[A], vectors_b: &[B]) -> SiftResult<SimilarityMatrix>
where
    A: AsRef<[f32]> + Sync,
    B: AsRef<[f32]> + Sync,
{
    let dim = vectors_a
        .first()
        .map(|v| v.as_ref().len())
        .or_else(|| vectors_b.first().map(|v| v.as_ref().len()));

    if let Some(dim) = dim {
        for v in vectors_a.iter().map(AsRef::as_ref).chain(vectors_b.iter().map(AsRef::as_ref)) {
            if v.len() != dim {
                return Err(SiftError::invalid_vector(
                    ErrorCode::VecDimensionMismatch,
                    format!("similarity matrix expects dimension {}, got {}", dim, v.len()),
                ));
            }
        }
    }

    let normalized_a: Vec<Vec<f32>> = vectors_a.par_iter().map(|v| l2_normalize(v.as_ref())).collect();
    let normalized_b: Vec<Vec<f32>> = vectors_b.par_iter().map(|v| l2_normalize(v.as_ref())).collect();

    let cols = normalized_b.len();
    let data: Vec<f32> = normalized_a
        .par_iter()
        .flat_map_iter(|a| {
            normalized_b
                .iter()
                .map(move |b| dot(a, b).clamp(-1.0, 1.0))
        })
        .collect();

    Ok(SimilarityMatrix {
        rows: normalized_a.len(),
        cols,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_cosine_similarity() {
        assert!(approx(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap(), 1.0));
        assert!(approx(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap(), 0.0));
        assert!(approx(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap(), -1.0));
    }

    #[test]
    fn test_cosine_is_symmetric() {
        let pairs: [(&[f32], &[f32]); 3] = [
            (&[1.0, 2.0, 3.0], &[-0.5, 4.0, 0.1]),
            (&[0.3, 0.3], &[0.9, -0.2]),
            (&[5.0, 0.0, 1.0], &[0.0, 0.0, 2.0]),
        ];
        for (a, b) in pairs {
            assert_eq!(cosine_similarity(a, b).unwrap(), cosine_similarity(b, a).unwrap());
        }
    }

    #[test]
    fn test_self_similarity_is_one() {
        for v in [vec![3.0, 4.0], vec![0.001, -2.0, 7.5], vec![1e3, 1e3, 1e3, 1e3]] {
            assert!(approx(cosine_similarity(&v, &v).unwrap(), 1.0));
        }
    }

    #[test]
    fn test_zero_magnitude_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::VecDimensionMismatch);
    }

    #[test]
    fn test_validate_vector() {
        assert!(validate_vector(&[1.0, 2.0], Some(2)).is_ok());
        assert_eq!(validate_vector(&[], None).unwrap_err().code(), ErrorCode::VecEmpty);
        assert_eq!(
            validate_vector(&[1.0], Some(2)).unwrap_err().code(),
            ErrorCode::VecDimensionMismatch
        );
        assert_eq!(
            validate_vector(&[1.0, f32::NAN], None).unwrap_err().code(),
            ErrorCode::VecNonFinite
        );
    }

    #[test]
    fn test_l2_normalize() {
        let n = l2_normalize(&[3.0, 4.0]);
        assert!(approx(n[0], 0.6));
        assert!(approx(n[1], 0.8));
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_similarity_matrix_matches_pairwise_cosine() {
        let a = vec![vec![1.0, 0.0], vec![0.6, 0.8]];
        let b = vec![vec![0.0, 2.0], vec![1.0, 1.0], vec![-1.0, 0.0]];
        let m = similarity_matrix(&a, &b).unwrap();
        assert_eq!((m.rows(), m.cols()), (2, 3));
        for i in 0..2 {
            for j in 0..3 {
                assert!(approx(m.get(i, j), cosine_similarity(&a[i], &b[j]).unwrap()));
            }
        }
        assert_eq!(m.row_max(0).map(|(j, _)| j), Some(1));
    }

    #[test]
    fn test_similarity_matrix_rejects_mixed_dimensions() {
        let a = vec![vec![1.0, 0.0]];
        let b = vec![vec![1.0, 0.0, 0.0]];
        assert!(similarity_matrix(&a, &b).is_err());
    }

    #[test]
    fn test_similarity_matrix_empty_side() {
        let a: Vec<Vec<f32>> = vec![vec![1.0, 0.0]];
        let b: Vec<Vec<f32>> = Vec::new();
        let m = similarity_matrix(&a, &b).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.row_max(0), None);
    }

    #[test]
    fn test_upper_triangle_skips_diagonal() {
        let v = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]];
        let m = similarity_matrix(&v, &v).unwrap();
        let pairs = m.upper_triangle_pairs(0.5);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].0, pairs[0].1), (0, 1));
    }
}
