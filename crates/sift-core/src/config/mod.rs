//! Configuration system for sift.
//!
//! Every engine call takes its settings explicitly; nothing here is read
//! from process-wide state after loading.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{SiftError, SiftResult};
use crate::traits::{EmbedderConfig, EmbedderProvider};
use crate::types::{Region, Sport};

/// Cross-run dedup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Similarity at or above which an article duplicates history, per region.
    pub region_thresholds: BTreeMap<String, f32>,
    /// Used for regions missing from `region_thresholds`.
    pub default_threshold: f32,
    /// Days of history before the run date; the run date itself always
    /// counts, so 0 compares against the same day only.
    pub lookback_days: u32,
    /// History records with a known body shorter than this are ignored.
    pub min_content_length: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            region_thresholds: BTreeMap::from([
                ("tr".to_string(), 0.85),
                ("eu".to_string(), 0.90),
            ]),
            default_threshold: 0.90,
            lookback_days: 0,
            min_content_length: 50,
        }
    }
}

impl DedupConfig {
    /// Threshold mapping handed to the deduplicator.
    pub fn thresholds(&self) -> RegionThresholds {
        RegionThresholds::new(self.default_threshold).with_regions(
            self.region_thresholds
                .iter()
                .map(|(region, threshold)| (Region::new(region), *threshold)),
        )
    }
}

/// Per-region similarity cutoffs with a fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionThresholds {
    by_region: HashMap<Region, f32>,
    default: f32,
}

impl RegionThresholds {
    pub fn new(default: f32) -> Self {
        Self {
            by_region: HashMap::new(),
            default,
        }
    }

    pub fn with_region(mut self, region: impl Into<Region>, threshold: f32) -> Self {
        self.by_region.insert(region.into(), threshold);
        self
    }

    pub fn with_regions(mut self, regions: impl IntoIterator<Item = (Region, f32)>) -> Self {
        self.by_region.extend(regions);
        self
    }

    pub fn default_threshold(&self) -> f32 {
        self.default
    }

    /// Configured threshold for `region`, without falling back.
    pub fn get(&self, region: &Region) -> SiftResult<f32> {
        self.by_region
            .get(region)
            .copied()
            .ok_or_else(|| SiftError::missing_region_threshold(region.to_string()))
    }

    /// Threshold for `region`, falling back to the default. The flag is true
    /// when the fallback was used.
    pub fn resolve(&self, region: &Region) -> (f32, bool) {
        match self.get(region) {
            Ok(threshold) => (threshold, false),
            Err(_) => (self.default, true),
        }
    }

    fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.by_region.values().copied().chain(std::iter::once(self.default))
    }
}

/// Within-run grouping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Pairs at or above this similarity end up in the same group.
    pub threshold: f32,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self { threshold: 0.80 }
    }
}

/// Region diff settings. Independent of the dedup window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Articles whose best match is strictly below this are unique.
    pub threshold: f32,
    /// Days of the other region's history before the run date; 2 covers
    /// the run date and the two days before it.
    pub lookback_days: u32,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            lookback_days: 2,
        }
    }
}

/// Score multiplier per sport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SportMultipliers {
    pub football: f32,
    pub basketball: f32,
    pub other: f32,
}

impl Default for SportMultipliers {
    fn default() -> Self {
        Self {
            football: 1.5,
            basketball: 1.0,
            other: 0.8,
        }
    }
}

impl SportMultipliers {
    pub fn for_sport(&self, sport: Sport) -> f32 {
        match sport {
            Sport::Football => self.football,
            Sport::Basketball => self.basketball,
            Sport::Other => self.other,
        }
    }
}

/// Priority scoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    pub top_n: usize,
    pub derby_bonus: f32,
    /// Base points for tags missing from `category_points`.
    pub default_category_points: f32,
    /// Category tag to base points.
    pub category_points: BTreeMap<String, f32>,
    pub sport_multipliers: SportMultipliers,
    pub basketball_tags: Vec<String>,
    pub basketball_keywords: Vec<String>,
    pub other_sport_keywords: Vec<String>,
    pub derby_tags: Vec<String>,
    pub derby_keywords: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_category_points() -> BTreeMap<String, f32> {
    [
        // transfers
        ("transfers_confirmed", 100.0),
        ("transfers_negotiations", 95.0),
        ("transfers_rumors", 90.0),
        ("transfers_interest", 85.0),
        // scandals and discipline
        ("off_field_scandals", 80.0),
        ("field_incidents", 75.0),
        ("corruption_allegations", 75.0),
        ("disciplinary_actions", 70.0),
        // rivalries
        ("team_rivalry", 85.0),
        ("personal_rivalry", 70.0),
        ("fan_rivalry", 65.0),
        // contracts
        ("contract_disputes", 75.0),
        ("contract_renewals", 70.0),
        ("departures", 80.0),
        // match and analysis
        ("match_results", 50.0),
        ("performance_analysis", 45.0),
        ("tactical_analysis", 40.0),
        ("injury_news", 55.0),
        ("squad_changes", 50.0),
        ("financial_news", 45.0),
        // management and competitions
        ("elections_management", 60.0),
        ("federation_politics", 50.0),
        ("league_standings", 45.0),
        ("european_competitions", 55.0),
        ("domestic_cups", 50.0),
        // lifestyle
        ("personal_life", 20.0),
        ("social_media", 15.0),
        ("lifestyle_news", 10.0),
    ]
    .into_iter()
    .map(|(tag, points)| (tag.to_string(), points))
    .collect()
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            derby_bonus: 20.0,
            default_category_points: 30.0,
            category_points: default_category_points(),
            sport_multipliers: SportMultipliers::default(),
            basketball_tags: strings(&[
                "basketball_news",
                "basketball_transfers",
                "basketball_league_champions",
                "basketball_match_results",
                "basketball_performance_analysis",
            ]),
            basketball_keywords: strings(&["basketball", "basket", "basketbol", "euroleague", "nba"]),
            other_sport_keywords: strings(&[
                "volleyball",
                "voleybol",
                "tennis",
                "tenis",
                "handball",
                "hentbol",
                "formula 1",
            ]),
            derby_tags: strings(&["team_rivalry"]),
            derby_keywords: strings(&["derby", "derbi", "rivalry", "rekabet", "klasico", "el clasico"]),
        }
    }
}

/// Embedder provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderProviderConfig {
    /// Provider type.
    #[serde(default)]
    pub provider: EmbedderProvider,
    /// Provider-specific configuration.
    #[serde(flatten)]
    pub config: EmbedderConfig,
}

impl Default for EmbedderProviderConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderProvider::OpenAI,
            config: EmbedderConfig::default(),
        }
    }
}

/// Embedding history location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path. `":memory:"` keeps history for one process only.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let sift_dir = dirs::home_dir()
            .map(|h| h.join(".sift"))
            .unwrap_or_else(|| PathBuf::from(".sift"));
        Self {
            path: sift_dir.join("embeddings.db"),
        }
    }
}

/// Main sift configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    pub dedup: DedupConfig,
    pub grouping: GroupingConfig,
    pub diff: DiffConfig,
    pub priority: PriorityConfig,
    pub embedder: EmbedderProviderConfig,
    pub store: StoreConfig,
}

fn parse_env<T: FromStr>(name: &str) -> SiftResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| SiftError::Configuration(format!("{}={:?}: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

impl SiftConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> SiftResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => toml::from_str(&content).map_err(|e| SiftError::Configuration(e.to_string()))?,
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| SiftError::Configuration(e.to_string()))?
            }
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| SiftError::Configuration(e.to_string()))?
            }
            _ => {
                return Err(SiftError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables over the defaults.
    pub fn from_env() -> SiftResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `SIFT_*` environment variables (and `OPENAI_API_KEY`).
    pub fn apply_env(&mut self) -> SiftResult<()> {
        if let Some(t) = parse_env::<f32>("SIFT_DEDUP_THRESHOLD_TR")? {
            self.dedup.region_thresholds.insert("tr".to_string(), t);
        }
        if let Some(t) = parse_env::<f32>("SIFT_DEDUP_THRESHOLD_EU")? {
            self.dedup.region_thresholds.insert("eu".to_string(), t);
        }
        if let Some(t) = parse_env("SIFT_DEDUP_DEFAULT_THRESHOLD")? {
            self.dedup.default_threshold = t;
        }
        if let Some(days) = parse_env("SIFT_DEDUP_LOOKBACK_DAYS")? {
            self.dedup.lookback_days = days;
        }
        if let Some(t) = parse_env("SIFT_GROUPING_THRESHOLD")? {
            self.grouping.threshold = t;
        }
        if let Some(t) = parse_env("SIFT_DIFF_THRESHOLD")? {
            self.diff.threshold = t;
        }
        if let Some(days) = parse_env("SIFT_DIFF_LOOKBACK_DAYS")? {
            self.diff.lookback_days = days;
        }
        if let Some(n) = parse_env("SIFT_TOP_N")? {
            self.priority.top_n = n;
        }

        if let Ok(model) = std::env::var("SIFT_EMBEDDING_MODEL") {
            self.embedder.config.model = model;
        }
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            self.embedder.config.api_key = Some(api_key);
        }
        if let Ok(path) = std::env::var("SIFT_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }

        self.validate()
    }

    /// Reject settings no run could use.
    pub fn validate(&self) -> SiftResult<()> {
        let thresholds = self
            .dedup
            .thresholds()
            .values()
            .chain([self.grouping.threshold, self.diff.threshold])
            .collect::<Vec<_>>();
        if let Some(bad) = thresholds.iter().find(|t| !(-1.0..=1.0).contains(*t)) {
            return Err(SiftError::validation_with_suggestion(
                format!("similarity threshold {} is outside [-1, 1]", bad),
                "Cosine similarity thresholds are usually between 0.7 and 0.95",
            ));
        }
        if self.embedder.config.batch_size == 0 {
            return Err(SiftError::validation("embedder.batch_size must be at least 1"));
        }
        if self.embedder.config.embedding_dims == 0 {
            return Err(SiftError::validation("embedder.embedding_dims must be at least 1"));
        }
        let m = &self.priority.sport_multipliers;
        if ![m.football, m.basketball, m.other, self.priority.derby_bonus]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(SiftError::validation("priority multipliers and bonus must be finite"));
        }
        Ok(())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> SiftConfigBuilder {
        SiftConfigBuilder::default()
    }
}

/// Builder for SiftConfig.
#[derive(Default)]
pub struct SiftConfigBuilder {
    config: SiftConfig,
}

impl SiftConfigBuilder {
    /// Set one region's dedup threshold.
    pub fn region_threshold(mut self, region: impl AsRef<str>, threshold: f32) -> Self {
        self.config
            .dedup
            .region_thresholds
            .insert(Region::new(region).as_str().to_string(), threshold);
        self
    }

    pub fn default_threshold(mut self, threshold: f32) -> Self {
        self.config.dedup.default_threshold = threshold;
        self
    }

    pub fn dedup_lookback_days(mut self, days: u32) -> Self {
        self.config.dedup.lookback_days = days;
        self
    }

    pub fn grouping_threshold(mut self, threshold: f32) -> Self {
        self.config.grouping.threshold = threshold;
        self
    }

    pub fn diff(mut self, config: DiffConfig) -> Self {
        self.config.diff = config;
        self
    }

    pub fn priority(mut self, config: PriorityConfig) -> Self {
        self.config.priority = config;
        self
    }

    /// Set embedder configuration.
    pub fn embedder(mut self, config: EmbedderProviderConfig) -> Self {
        self.config.embedder = config;
        self
    }

    pub fn embedding_dims(mut self, dims: usize) -> Self {
        self.config.embedder.config.embedding_dims = dims;
        self
    }

    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store.path = path.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SiftConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SiftConfig::default();
        let thresholds = config.dedup.thresholds();
        assert_eq!(thresholds.get(&Region::tr()).unwrap(), 0.85);
        assert_eq!(thresholds.get(&Region::eu()).unwrap(), 0.90);
        assert_eq!(config.grouping.threshold, 0.80);
        assert_eq!(config.dedup.lookback_days, 0);
        assert_eq!(config.diff.lookback_days, 2);
        assert_eq!(config.priority.category_points["transfers_confirmed"], 100.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_region_falls_back() {
        let thresholds = RegionThresholds::new(0.9).with_region("tr", 0.85);
        assert_eq!(thresholds.resolve(&Region::new("us")), (0.9, true));
        assert_eq!(thresholds.resolve(&Region::new("TR")), (0.85, false));
        assert!(thresholds.get(&Region::new("us")).is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[dedup]
lookback_days = 4

[dedup.region_thresholds]
tr = 0.8
de = 0.95

[priority]
top_n = 5
"#
        )
        .unwrap();

        let config = SiftConfig::from_file(file.path()).unwrap();
        assert_eq!(config.dedup.lookback_days, 4);
        assert_eq!(config.dedup.thresholds().get(&Region::new("de")).unwrap(), 0.95);
        assert!(config.dedup.thresholds().get(&Region::eu()).is_err());
        assert_eq!(config.priority.top_n, 5);
        assert_eq!(config.grouping.threshold, 0.80);
    }

    #[test]
    fn test_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(SiftConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let config = SiftConfig::builder().grouping_threshold(1.5).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = SiftConfig::builder()
            .region_threshold("US", 0.7)
            .dedup_lookback_days(2)
            .embedding_dims(3)
            .build();
        assert_eq!(config.dedup.region_thresholds["us"], 0.7);
        assert_eq!(config.dedup.lookback_days, 2);
        assert_eq!(config.embedder.config.embedding_dims, 3);
    }
}
