//! JSON and JSON Lines article readers.

use serde::Deserialize;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::error::{SiftError, SiftResult};
use crate::types::Article;

/// Statistics from an import operation.
#[derive(Debug, Default, Clone)]
pub struct ImportStats {
    /// Total records seen (non-empty lines for JSON Lines).
    pub total: u64,
    /// Articles successfully parsed.
    pub imported: u64,
    /// Error messages for skipped records.
    pub errors: Vec<String>,
}

impl ImportStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if import completed without errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    List(Vec<Article>),
    Wrapped { articles: Vec<Article> },
}

/// Read articles from JSON Lines. Malformed lines are recorded and skipped.
pub async fn read_articles_jsonl<R>(reader: R) -> SiftResult<(Vec<Article>, ImportStats)>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ImportStats::new();
    let mut articles = Vec::new();
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.total += 1;

        match serde_json::from_str::<Article>(line) {
            Ok(article) => {
                articles.push(article);
                stats.imported += 1;
            }
            Err(e) => stats.errors.push(format!("Parse error at line {}: {}", line_no, e)),
        }
    }

    Ok((articles, stats))
}

/// Read articles from a file, detecting the layout from its first character.
///
/// `[` is a JSON array. `{` is tried as a single document with an `articles`
/// field first and as JSON Lines otherwise. A malformed single document is an
/// error; malformed JSON Lines entries are skipped.
pub async fn read_articles(path: impl AsRef<Path>) -> SiftResult<(Vec<Article>, ImportStats)> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await?;
    let trimmed = content.trim_start();

    if trimmed.starts_with('[') {
        return parse_document(&content, path);
    }
    if trimmed.starts_with('{') {
        if let Ok(Document::Wrapped { articles }) = serde_json::from_str::<Document>(&content) {
            return Ok(with_stats(articles));
        }
    }

    read_articles_jsonl(BufReader::new(content.as_bytes())).await
}

fn parse_document(content: &str, path: &Path) -> SiftResult<(Vec<Article>, ImportStats)> {
    let doc: Document = serde_json::from_str(content)
        .map_err(|e| SiftError::parse(format!("{}: {}", path.display(), e)))?;
    let articles = match doc {
        Document::List(articles) | Document::Wrapped { articles } => articles,
    };
    Ok(with_stats(articles))
}

fn with_stats(articles: Vec<Article>) -> (Vec<Article>, ImportStats) {
    let n = articles.len() as u64;
    let stats = ImportStats {
        total: n,
        imported: n,
        errors: Vec::new(),
    };
    (articles, stats)
}
