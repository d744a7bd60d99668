//! Category and sport classification types.
//!
//! Categories arrive from the enrichment service as `(tag, confidence)`
//! pairs. Sports are a coarse classification used by priority scoring.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// A category tag assigned to an article with the assigner's confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Category tag, e.g. `transfers_confirmed`.
    pub tag: String,
    /// Confidence in [0, 1].
    #[serde(default)]
    pub confidence: f32,
}

impl Category {
    pub fn new(tag: impl Into<String>, confidence: f32) -> Self {
        Self {
            tag: tag.into(),
            confidence,
        }
    }

    /// Confidence clamped into [0, 1]; NaN counts as 0.
    pub fn clamped_confidence(&self) -> f32 {
        if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        }
    }
}

/// Coarse sport classification.
///
/// Football is the primary sport, basketball the secondary one, and
/// everything else is discounted.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Sport {
    Football,
    Basketball,
    Other,
}

impl Sport {
    /// All sport names as static strings.
    pub fn all_names() -> Vec<&'static str> {
        Self::iter().map(|s| s.into()).collect()
    }
}
