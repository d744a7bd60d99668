//! In-memory embedding store.

use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::error::{SiftError, SiftResult};
use crate::traits::{ensure_run, EmbeddingStore};
use crate::types::{EmbeddingRecord, Region};

#[derive(Default)]
struct Inner {
    records: Vec<EmbeddingRecord>,
    keys: HashSet<(String, String)>,
}

/// Process-local store. Records keep insertion order.
#[derive(Default)]
pub struct InMemoryEmbeddingStore {
    inner: Mutex<Inner>,
}

impl InMemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `records`, deduplicated per `(article_id, run_id)`.
    pub fn with_records(records: impl IntoIterator<Item = EmbeddingRecord>) -> Self {
        let mut inner = Inner::default();
        for record in records {
            let key = (record.article_id.clone(), record.run_id.clone());
            if inner.keys.insert(key) {
                inner.records.push(record);
            }
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> SiftResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| SiftError::Internal("embedding store lock poisoned".to_string()))
    }
}

impl EmbeddingStore for InMemoryEmbeddingStore {
    fn append(&self, run_id: &str, records: &[EmbeddingRecord]) -> SiftResult<usize> {
        ensure_run(run_id, records)?;
        let mut inner = self.lock()?;
        let mut added = 0;
        for record in records {
            let key = (record.article_id.clone(), record.run_id.clone());
            if inner.keys.insert(key) {
                inner.records.push(record.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    fn query(
        &self,
        region: &Region,
        date_from: NaiveDate,
        date_to: NaiveDate,
        exclude_run_id: Option<&str>,
    ) -> SiftResult<Vec<EmbeddingRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .iter()
            .filter(|r| &r.region == region)
            .filter(|r| r.date >= date_from && r.date <= date_to)
            .filter(|r| exclude_run_id != Some(r.run_id.as_str()))
            .cloned()
            .collect())
    }

    fn count(&self) -> SiftResult<usize> {
        Ok(self.lock()?.records.len())
    }
}
