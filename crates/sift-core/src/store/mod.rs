//! Embedding store backends.

mod memory;
mod sqlite;

pub use memory::InMemoryEmbeddingStore;
pub use sqlite::SqliteEmbeddingStore;
