//! Region identifiers.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Coverage region an article was collected for (e.g. `tr`, `eu`).
///
/// Stored lower-cased so lookups against configured thresholds are
/// case-insensitive. Any value is accepted; regions without a configured
/// threshold fall back to the default one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    /// Create a region, normalizing case and surrounding whitespace.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_lowercase())
    }

    /// Turkish coverage.
    pub fn tr() -> Self {
        Self("tr".to_string())
    }

    /// European coverage.
    pub fn eu() -> Self {
        Self("eu".to_string())
    }

    /// Derive a region from a language code: `tr` maps to `tr`, anything else to `eu`.
    pub fn from_language(language: &str) -> Self {
        if language.trim().eq_ignore_ascii_case("tr") {
            Self::tr()
        } else {
            Self::eu()
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when no region code was supplied.
    pub fn is_unset(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("unknown")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for Region {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<String> for Region {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(Self::new).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_case() {
        assert_eq!(Region::new(" TR "), Region::tr());
        assert_eq!(Region::from("Eu"), Region::eu());
    }

    #[test]
    fn test_from_language() {
        assert_eq!(Region::from_language("tr"), Region::tr());
        assert_eq!(Region::from_language("en"), Region::eu());
        assert_eq!(Region::from_language(""), Region::eu());
    }

    #[test]
    fn test_deserialize_null_is_unset() {
        let region: Region = serde_json::from_str("null").unwrap();
        assert!(region.is_unset());
        assert_eq!(region.to_string(), "unknown");
    }
}
