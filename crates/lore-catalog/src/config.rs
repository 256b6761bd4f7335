use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// All tunable thresholds of the catalog. Loaded from a TOML file with
/// `LORE_*` env var overrides; every value has a default so a missing file
/// yields a working configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub matcher: MatcherConfig,
    pub loader: LoaderConfig,
    pub gap: GapConfig,
    pub curator: CuratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Weight for exact trigger-phrase containment.
    pub phrase_weight: u32,
    /// Weight for a glob trigger matching a token or hyphen-joined bigram.
    pub glob_weight: u32,
    /// Weight for a category discovery-pattern match.
    pub category_weight: u32,
    pub stop_words: Vec<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            phrase_weight: 3,
            glob_weight: 2,
            category_weight: 1,
            stop_words: default_stop_words(),
        }
    }
}

fn default_stop_words() -> Vec<String> {
    [
        "a", "an", "the", "and", "or", "to", "of", "in", "on", "for", "with", "is", "are", "it",
        "this", "that", "how", "do", "does", "i", "my", "we", "our", "be", "as", "at", "by",
        "from", "use", "using",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// How many ranked candidates Level 1/2 materialization covers.
    pub top_k: usize,
    /// Maximum unit count for a single Level 3 (full content) call.
    pub max_full_units: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_full_units: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GapConfig {
    /// Worthiness score at or above which a gap becomes create-decided.
    pub create_threshold: u32,
    /// Score below which a gap with enough occurrences is rejected.
    pub reject_threshold: u32,
    /// Occurrences required before a low score can reject.
    pub reject_min_occurrences: usize,
    /// Matcher score at or above which an existing unit counts as already
    /// covering a gap domain.
    pub dedup_threshold: u32,
    /// Occurrence counts at which the frequency band reaches 1, 2 and 3.
    pub frequency_buckets: [usize; 3],
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            create_threshold: 6,
            reject_threshold: 4,
            reject_min_occurrences: 2,
            dedup_threshold: 3,
            frequency_buckets: [1, 2, 3],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CuratorConfig {
    /// Scope band: bodies shorter than this are too narrow to be a unit.
    pub min_body_len: usize,
    /// Scope band: bodies longer than this should be split.
    pub max_body_len: usize,
    /// Size-class boundary between small and medium bodies.
    pub small_max: usize,
    /// Size-class boundary between medium and large bodies.
    pub medium_max: usize,
    /// Matcher score an existing unit must reach on a proposed trigger for
    /// that trigger to count toward subsumption. At the default weights a
    /// phrase or glob trigger hit qualifies; a category discovery hit alone
    /// does not.
    pub coverage_threshold: u32,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            min_body_len: 200,
            max_body_len: 20_000,
            small_max: 2_000,
            medium_max: 8_000,
            coverage_threshold: 2,
        }
    }
}

impl CatalogConfig {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LORE_LOADER_TOP_K") {
            if let Ok(k) = v.parse::<usize>() {
                self.loader.top_k = k;
            } else {
                tracing::warn!("ignoring invalid LORE_LOADER_TOP_K value: {v}");
            }
        }
        if let Ok(v) = std::env::var("LORE_LOADER_MAX_FULL_UNITS") {
            if let Ok(n) = v.parse::<usize>() {
                self.loader.max_full_units = n;
            } else {
                tracing::warn!("ignoring invalid LORE_LOADER_MAX_FULL_UNITS value: {v}");
            }
        }
        if let Ok(v) = std::env::var("LORE_GAP_CREATE_THRESHOLD") {
            if let Ok(n) = v.parse::<u32>() {
                self.gap.create_threshold = n;
            } else {
                tracing::warn!("ignoring invalid LORE_GAP_CREATE_THRESHOLD value: {v}");
            }
        }
        if let Ok(v) = std::env::var("LORE_GAP_DEDUP_THRESHOLD") {
            if let Ok(n) = v.parse::<u32>() {
                self.gap.dedup_threshold = n;
            } else {
                tracing::warn!("ignoring invalid LORE_GAP_DEDUP_THRESHOLD value: {v}");
            }
        }
    }
}
