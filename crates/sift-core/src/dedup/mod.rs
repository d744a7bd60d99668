//! Near-duplicate detection: against history (cross-run) and within a run.

mod cross_run;
mod grouping;
mod union_find;

pub use cross_run::{CrossRunDeduplicator, DedupOutcome, RegionDedupStats};
pub use grouping::{CandidatePair, WithinRunGrouper};
pub use union_find::UnionFind;
