//! sift-embeddings - Embedding provider clients for sift.
//!
//! # Supported Providers
//!
//! - **OpenAI** (feature: `openai`, default) - text-embedding-3-small and friends
//! - **Ollama** (feature: `ollama`) - local models such as nomic-embed-text
//!
//! # Example
//!
//! ```ignore
//! use sift_embeddings::EmbedderFactory;
//!
//! let config = sift_core::SiftConfig::from_env()?;
//! let embedder = EmbedderFactory::from_config(&config.embedder)?;
//! let vectors = embedder.embed_batch(&texts).await?;
//! ```

mod factory;
mod ollama;
mod openai;

pub use factory::EmbedderFactory;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAIEmbedder;

// Re-export core types for convenience
pub use sift_core::traits::{Embedder, EmbedderConfig, EmbedderProvider};
