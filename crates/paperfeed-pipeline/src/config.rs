//! Configuration loading: environment knobs plus the versioned YAML tables.
//!
//! Scoring weights and feed lists are data, not code. The crate ships a
//! builtin copy of both tables so a bare deployment works, and either file
//! can be overridden by path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use paperfeed_adapters::SourceRegistry;
use serde::Deserialize;

const BUILTIN_INTERESTS: &str = include_str!("../../../config/interests.yaml");
const BUILTIN_SOURCES: &str = include_str!("../../../config/sources.yaml");

/// Environment-derived runtime settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub profile: String,
    pub interests_path: Option<PathBuf>,
    pub sources_path: Option<PathBuf>,
    pub lookback_days: i64,
    pub fetch_delay: Duration,
    pub enrich_enabled: bool,
    pub semantic_scholar_api_key: Option<String>,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("PAPERFEED_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            profile: std::env::var("PAPERFEED_PROFILE").unwrap_or_else(|_| "main".to_string()),
            interests_path: std::env::var("PAPERFEED_INTERESTS").ok().map(PathBuf::from),
            sources_path: std::env::var("PAPERFEED_SOURCES").ok().map(PathBuf::from),
            lookback_days: std::env::var("PAPERFEED_LOOKBACK_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7),
            fetch_delay: Duration::from_millis(
                std::env::var("PAPERFEED_FETCH_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1000),
            ),
            enrich_enabled: std::env::var("PAPERFEED_ENRICH")
                .map(|v| v != "0" && v.to_lowercase() != "false")
                .unwrap_or(true),
            semantic_scholar_api_key: std::env::var("SEMANTIC_SCHOLAR_API_KEY")
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }
}

/// One recency tier: papers newer than `max_days` get `bonus` at ranking.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RecencyTier {
    pub max_days: i64,
    pub bonus: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityWeights {
    pub citation_weight: f64,
    pub citation_cap: f64,
    pub influential_weight: f64,
    pub influential_cap: f64,
    pub prestige_bonus: f64,
    pub social_bonus: f64,
    pub prestige_venues: Vec<String>,
    pub social_sources: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterestCategory {
    pub id: String,
    pub name: String,
    pub keywords: BTreeMap<String, f64>,
}

/// The scoring table: categories, multiplier schedule, ranking bonuses,
/// and quality weights.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    pub version: u32,
    pub multipliers: Vec<f64>,
    pub recency_tiers: Vec<RecencyTier>,
    #[serde(default)]
    pub source_bonuses: BTreeMap<String, f64>,
    pub quality: QualityWeights,
    pub categories: Vec<InterestCategory>,
}

impl ScoringConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("parsing scoring config yaml")?;
        config.validate()?;
        Ok(config)
    }

    /// The table compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_INTERESTS)
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading scoring config {}", path.display()))?;
                Self::from_yaml(&text)
            }
            None => Self::builtin(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.multipliers.is_empty() {
            bail!("scoring config has no multiplier schedule");
        }
        if self.multipliers.windows(2).any(|w| w[1] < w[0]) {
            bail!("multiplier schedule must be non-decreasing");
        }
        if self.categories.is_empty() {
            bail!("scoring config has no categories");
        }
        for category in &self.categories {
            if category.keywords.is_empty() {
                bail!("category {} has no keywords", category.id);
            }
        }
        Ok(())
    }
}

pub fn load_registry(path: Option<&Path>) -> Result<SourceRegistry> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading source registry {}", path.display()))?,
        None => BUILTIN_SOURCES.to_string(),
    };
    serde_yaml::from_str(&text).context("parsing source registry yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_scoring_table_parses_and_validates() {
        let config = ScoringConfig::builtin().expect("builtin table");
        assert_eq!(config.version, 1);
        assert_eq!(config.multipliers, vec![1.0, 1.0, 1.5, 2.0, 3.0, 5.0]);
        assert_eq!(config.categories.len(), 5);
        assert!(config.categories.iter().any(|c| c.id == "privacy"));
    }

    #[test]
    fn builtin_registry_parses_with_three_profiles() {
        let registry = load_registry(None).expect("builtin registry");
        assert_eq!(registry.version, 1);
        assert!(registry.profile("main").is_some());
        assert!(registry.profile("newsletters").is_some());
        assert!(registry.profile("labs").is_some());
    }

    #[test]
    fn decreasing_multipliers_are_rejected() {
        let yaml = r#"
version: 1
multipliers: [1.0, 2.0, 1.5]
recency_tiers: []
quality:
  citation_weight: 2.0
  citation_cap: 8.0
  influential_weight: 3.0
  influential_cap: 6.0
  prestige_bonus: 2.0
  social_bonus: 3.0
  prestige_venues: []
  social_sources: []
categories:
  - id: a
    name: A
    keywords: { x: 1 }
"#;
        assert!(ScoringConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn empty_categories_are_rejected() {
        let yaml = r#"
version: 1
multipliers: [1.0]
recency_tiers: []
quality:
  citation_weight: 2.0
  citation_cap: 8.0
  influential_weight: 3.0
  influential_cap: 6.0
  prestige_bonus: 2.0
  social_bonus: 3.0
  prestige_venues: []
  social_sources: []
categories: []
"#;
        assert!(ScoringConfig::from_yaml(yaml).is_err());
    }
}
