//! Embedding store trait.

use chrono::NaiveDate;

use crate::error::{ErrorCode, SiftError, SiftResult};
use crate::types::{EmbeddingRecord, Region};

/// Append-only history of article embeddings, keyed by region and date.
///
/// Implementations must give read-after-write consistency within a process.
/// Appends are idempotent per `(article_id, run_id)`: a second append of the
/// same key is ignored, never stored twice and never overwritten. That makes
/// concurrent appends from different runs commutative.
pub trait EmbeddingStore: Send + Sync {
    /// Append records for `run_id`. Returns the number of newly stored records.
    ///
    /// Every record's `run_id` must equal `run_id`.
    fn append(&self, run_id: &str, records: &[EmbeddingRecord]) -> SiftResult<usize>;

    /// All records for `region` dated within `[date_from, date_to]` inclusive,
    /// optionally leaving out the records of one run.
    fn query(
        &self,
        region: &Region,
        date_from: NaiveDate,
        date_to: NaiveDate,
        exclude_run_id: Option<&str>,
    ) -> SiftResult<Vec<EmbeddingRecord>>;

    /// Total number of stored records.
    fn count(&self) -> SiftResult<usize>;
}

/// Check that every record belongs to `run_id`.
pub(crate) fn ensure_run(run_id: &str, records: &[EmbeddingRecord]) -> SiftResult<()> {
    if let Some(stray) = records.iter().find(|r| r.run_id != run_id) {
        return Err(SiftError::Validation {
            message: format!(
                "record for article '{}' has run_id '{}', expected '{}'",
                stray.article_id, stray.run_id, run_id
            ),
            code: ErrorCode::ValRunMismatch,
            suggestion: None,
        });
    }
    Ok(())
}
