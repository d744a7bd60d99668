//! Article input readers.
//!
//! Runs hand over articles as a JSON array, an object with an `articles`
//! field, or JSON Lines.
//!
//! # Example
//!
//! ```ignore
//! use sift_core::import::read_articles;
//!
//! let (articles, stats) = read_articles("run/articles.jsonl").await?;
//! println!("Read {}/{}", stats.imported, stats.total);
//! ```

pub mod jsonl;

pub use jsonl::{read_articles, read_articles_jsonl, ImportStats};
