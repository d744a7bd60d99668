//! SQLite-backed embedding store.

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::error::{ErrorCode, SiftError, SiftResult};
use crate::traits::{ensure_run, EmbeddingStore};
use crate::types::{EmbeddingRecord, Region};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Embedding history in a single SQLite table.
///
/// Vectors are stored as JSON text. Dates are ISO `YYYY-MM-DD` strings, which
/// sort and compare correctly as text.
pub struct SqliteEmbeddingStore {
    conn: Mutex<Connection>,
}

impl SqliteEmbeddingStore {
    /// Open (or create) a store at the given path. `":memory:"` opens a
    /// private in-memory database.
    pub fn new(path: impl AsRef<Path>) -> SiftResult<Self> {
        let path = path.as_ref();
        if path.to_str() == Some(":memory:") {
            return Self::in_memory();
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| SiftError::Database {
            message: format!("cannot open {}: {}", path.display(), e),
            code: ErrorCode::DbConnectionFailed,
            source: Some(Box::new(e)),
        })?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> SiftResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> SiftResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> SiftResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SiftError::Internal("embedding store lock poisoned".to_string()))
    }

    fn init_schema(&self) -> SiftResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                article_id     TEXT NOT NULL,
                run_id         TEXT NOT NULL,
                region         TEXT NOT NULL,
                date           TEXT NOT NULL,
                embedding      TEXT NOT NULL,
                title          TEXT,
                url            TEXT,
                content_length INTEGER,
                PRIMARY KEY (article_id, run_id)
            );

            CREATE INDEX IF NOT EXISTS idx_embeddings_region_date
                ON embeddings(region, date);
            "#,
        )?;
        Ok(())
    }
}

/// Raw row as stored, decoded after the statement is done.
struct StoredRow {
    article_id: String,
    run_id: String,
    region: String,
    date: String,
    embedding: String,
    title: Option<String>,
    url: Option<String>,
    content_length: Option<i64>,
}

impl StoredRow {
    fn decode(self) -> SiftResult<EmbeddingRecord> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT).map_err(|e| SiftError::Parse {
            message: format!("bad date '{}': {}", self.date, e),
            code: ErrorCode::ParseInvalidDate,
        })?;
        let embedding: Vec<f32> = serde_json::from_str(&self.embedding).map_err(|e| SiftError::Database {
            message: format!("bad embedding for article '{}': {}", self.article_id, e),
            code: ErrorCode::DbCorruptRecord,
            source: Some(Box::new(e)),
        })?;

        Ok(EmbeddingRecord {
            article_id: self.article_id,
            region: Region::new(self.region),
            date,
            run_id: self.run_id,
            embedding,
            title: self.title,
            url: self.url,
            content_length: self.content_length.and_then(|n| usize::try_from(n).ok()),
        })
    }
}

impl EmbeddingStore for SqliteEmbeddingStore {
    fn append(&self, run_id: &str, records: &[EmbeddingRecord]) -> SiftResult<usize> {
        ensure_run(run_id, records)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut added = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO embeddings
                    (article_id, run_id, region, date, embedding, title, url, content_length)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )?;
            for record in records {
                let embedding = serde_json::to_string(&record.embedding)?;
                let content_length = record
                    .content_length
                    .and_then(|n| i64::try_from(n).ok());
                added += stmt.execute(params![
                    record.article_id,
                    record.run_id,
                    record.region.as_str(),
                    record.date.format(DATE_FORMAT).to_string(),
                    embedding,
                    record.title,
                    record.url,
                    content_length,
                ])?;
            }
        }
        tx.commit()?;
        Ok(added)
    }

    fn query(
        &self,
        region: &Region,
        date_from: NaiveDate,
        date_to: NaiveDate,
        exclude_run_id: Option<&str>,
    ) -> SiftResult<Vec<EmbeddingRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT article_id, run_id, region, date, embedding, title, url, content_length
            FROM embeddings
            WHERE region = ?1 AND date >= ?2 AND date <= ?3
              AND (?4 IS NULL OR run_id != ?4)
            ORDER BY rowid
            "#,
        )?;

        let rows = stmt
            .query_map(
                params![
                    region.as_str(),
                    date_from.format(DATE_FORMAT).to_string(),
                    date_to.format(DATE_FORMAT).to_string(),
                    exclude_run_id,
                ],
                |row| {
                    Ok(StoredRow {
                        article_id: row.get(0)?,
                        run_id: row.get(1)?,
                        region: row.get(2)?,
                        date: row.get(3)?,
                        embedding: row.get(4)?,
                        title: row.get(5)?,
                        url: row.get(6)?,
                        content_length: row.get(7)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let article_id = row.article_id.clone();
            match row.decode() {
                Ok(record) => records.push(record),
                Err(e) => warn!(article_id = %article_id, error = %e, "Skipping corrupt history record"),
            }
        }
        Ok(records)
    }

    fn count(&self) -> SiftResult<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn record(id: &str, date: NaiveDate, run: &str) -> EmbeddingRecord {
        EmbeddingRecord::new(id, Region::tr(), date, run, vec![0.25, -0.5, 1.0])
            .with_title(format!("title {}", id))
            .with_content_length(120)
    }

    #[test]
    fn test_append_and_query_round_trip() {
        let store = SqliteEmbeddingStore::in_memory().unwrap();
        let rec = record("a", day(2), "r1");
        assert_eq!(store.append("r1", &[rec.clone()]).unwrap(), 1);

        let hits = store.query(&Region::tr(), day(1), day(2), None).unwrap();
        assert_eq!(hits, vec![rec]);
        assert!(store.query(&Region::eu(), day(1), day(2), None).unwrap().is_empty());
    }

    #[test]
    fn test_append_is_idempotent() {
        let store = SqliteEmbeddingStore::in_memory().unwrap();
        let batch = vec![record("a", day(1), "r1"), record("b", day(1), "r1")];
        assert_eq!(store.append("r1", &batch).unwrap(), 2);
        assert_eq!(store.append("r1", &batch).unwrap(), 0);
        assert_eq!(store.query(&Region::tr(), day(1), day(1), None).unwrap().len(), 2);
    }

    #[test]
    fn test_excludes_run_and_respects_window() {
        let store = SqliteEmbeddingStore::in_memory().unwrap();
        store.append("r1", &[record("a", day(1), "r1")]).unwrap();
        store.append("r2", &[record("b", day(2), "r2")]).unwrap();
        store.append("r3", &[record("c", day(4), "r3")]).unwrap();

        let hits = store.query(&Region::tr(), day(1), day(4), Some("r2")).unwrap();
        let ids: Vec<&str> = hits.iter().map(|r| r.article_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        let hits = store.query(&Region::tr(), day(2), day(3), None).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("embeddings.db");
        {
            let store = SqliteEmbeddingStore::new(&path).unwrap();
            store.append("r1", &[record("a", day(1), "r1")]).unwrap();
        }
        let store = SqliteEmbeddingStore::new(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_corrupt_row_is_skipped() {
        let store = SqliteEmbeddingStore::in_memory().unwrap();
        store.append("r1", &[record("a", day(1), "r1")]).unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO embeddings (article_id, run_id, region, date, embedding) VALUES ('b', 'r1', 'tr', '2025-06-01', 'not json')",
                [],
            )
            .unwrap();
        let hits = store.query(&Region::tr(), day(1), day(1), None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].article_id, "a");
    }
}
