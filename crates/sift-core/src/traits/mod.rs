//! Core traits for sift collaborators.

mod embedder;
mod merge;
mod store;

pub use embedder::*;
pub use merge::*;
pub use store::*;
