//! Embedder trait and related types.
//!
//! The embedding provider is an external service. The engine only batches
//! requests and checks the shape of what comes back; retries and backoff
//! belong to the provider client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ErrorCode, SiftError, SiftResult};

/// Core Embedder trait - all embedding providers implement this.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text.
    async fn embed(&self, text: &str) -> SiftResult<Vec<f32>>;

    /// Generate embeddings for multiple texts (one provider request).
    async fn embed_batch(&self, texts: &[String]) -> SiftResult<Vec<Vec<f32>>> {
        // Default implementation: sequential embedding
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Get the dimension of the embeddings.
    fn dimension(&self) -> usize;

    /// Get the model name.
    fn model_name(&self) -> &str;
}

/// Embed `texts` with a single provider request.
///
/// A provider returning the wrong number of vectors is an error.
pub async fn embed_checked(embedder: &dyn Embedder, texts: &[String]) -> SiftResult<Vec<Vec<f32>>> {
    let batch = embedder.embed_batch(texts).await?;
    if batch.len() != texts.len() {
        return Err(SiftError::Embedding {
            message: format!(
                "provider returned {} embeddings for {} texts",
                batch.len(),
                texts.len()
            ),
            code: ErrorCode::EmbCountMismatch,
            source: None,
        });
    }
    Ok(batch)
}

/// Embed `texts` in consecutive chunks of at most `batch_size`.
///
/// Output order matches input order. Any failed chunk fails the call.
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> SiftResult<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let total_batches = texts.len().div_ceil(batch_size);
    let mut embeddings = Vec::with_capacity(texts.len());

    for (batch_num, chunk) in texts.chunks(batch_size).enumerate() {
        info!(
            batch = batch_num + 1,
            total_batches,
            size = chunk.len(),
            model = embedder.model_name(),
            "Requesting embedding batch"
        );
        embeddings.extend(embed_checked(embedder, chunk).await?);
    }

    Ok(embeddings)
}

/// Embedder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    /// Model name/identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Embedding dimensions. Constant across a deployment.
    #[serde(default = "default_embedding_dims")]
    pub embedding_dims: usize,
    /// API key (if not using environment variable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL for API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum texts per provider request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Characters of title + body sent per article.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dims() -> usize {
    768
}

fn default_batch_size() -> usize {
    100
}

fn default_max_text_chars() -> usize {
    2000
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            embedding_dims: default_embedding_dims(),
            api_key: None,
            base_url: None,
            batch_size: default_batch_size(),
            max_text_chars: default_max_text_chars(),
        }
    }
}

/// Embedder provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderProvider {
    #[default]
    OpenAI,
    Ollama,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
        drop_last: bool,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> SiftResult<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> SiftResult<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out = Vec::new();
            for t in texts {
                out.push(self.embed(t).await?);
            }
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_embed_in_batches_chunks_and_keeps_order() {
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
            drop_last: false,
        };
        let texts: Vec<String> = (1..=5).map(|n| "x".repeat(n)).collect();
        let out = embed_in_batches(&embedder, &texts, 2).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        let lens: Vec<f32> = out.iter().map(|v| v[0]).collect();
        assert_eq!(lens, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[tokio::test]
    async fn test_embed_in_batches_rejects_short_response() {
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
            drop_last: true,
        };
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = embed_in_batches(&embedder, &texts, 10).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmbCountMismatch);
    }

    #[tokio::test]
    async fn test_embed_checked_is_one_request() {
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
            drop_last: false,
        };
        let texts: Vec<String> = (1..=5).map(|n| "x".repeat(n)).collect();
        assert_eq!(embed_checked(&embedder, &texts).await.unwrap().len(), 5);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        let short = CountingEmbedder {
            calls: AtomicUsize::new(0),
            drop_last: true,
        };
        let err = embed_checked(&short, &texts).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmbCountMismatch);
    }

    #[test]
    fn test_config_defaults() {
        let config: EmbedderConfig = serde_json::from_str(r#"{"model": "m"}"#).unwrap();
        assert_eq!(config.embedding_dims, 768);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_text_chars, 2000);
    }
}
