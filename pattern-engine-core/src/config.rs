//! `CoreConfig`: the single configuration value passed by value into every
//! component. No component reads environment variables or global statics;
//! reloading a configuration is constructing a new value, not mutating one.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Relevance score weights for the retriever. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalWeights {
    pub keyword: f32,
    pub semantic: f32,
    pub applies: f32,
    pub maturity: f32,
    pub effectiveness: f32,
    pub negative_penalty: f32,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            keyword: 0.20,
            semantic: 0.30,
            applies: 0.20,
            maturity: 0.15,
            effectiveness: 0.15,
            negative_penalty: 1.0,
        }
    }
}

impl RetrievalWeights {
    /// Sum of the five additive channels (excludes the penalty term, which
    /// is subtracted rather than blended).
    #[must_use]
    pub fn additive_sum(&self) -> f32 {
        self.keyword + self.semantic + self.applies + self.maturity + self.effectiveness
    }

    /// Re-normalise the additive channels so they still sum to 1 after the
    /// semantic channel is disabled (embedding index unavailable).
    #[must_use]
    pub fn without_semantic(&self) -> Self {
        let remaining = self.keyword + self.applies + self.maturity + self.effectiveness;
        if remaining <= f32::EPSILON {
            return *self;
        }
        let scale = (remaining + self.semantic) / remaining;
        Self {
            keyword: self.keyword * scale,
            semantic: 0.0,
            applies: self.applies * scale,
            maturity: self.maturity * scale,
            effectiveness: self.effectiveness * scale,
            negative_penalty: self.negative_penalty,
        }
    }
}

/// Embedding provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    Local,
    Remote,
    #[default]
    Off,
}

/// Consolidation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutoMergeMode {
    #[default]
    Off,
    KeepBest,
    Manual,
}

/// Minimum trust level a pattern must carry to be eligible for injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Untrusted,
    #[default]
    Community,
    Verified,
    Team,
    Owner,
}

/// Sanitizer action when a deny-pattern is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeAction {
    Reject,
    #[default]
    Warn,
    Strip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    pub store_dir: PathBuf,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("./patterns"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_patterns: usize,
    pub budget_chars: usize,
    pub per_pattern_cap_chars: usize,
    pub weights: RetrievalWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_patterns: 5,
            budget_chars: 8_000,
            per_pattern_cap_chars: 1_000,
            weights: RetrievalWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Off,
            model: "local-default".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    pub decay_half_life_days: f64,
    pub grace_period_days: f64,
    pub merge_threshold: f32,
    pub auto_archive: bool,
    pub auto_merge: AutoMergeMode,
    pub min_patterns_before_run: usize,
    pub retention_days: i64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            decay_half_life_days: 30.0,
            grace_period_days: 7.0,
            merge_threshold: 0.9,
            auto_archive: false,
            auto_merge: AutoMergeMode::Off,
            min_patterns_before_run: 5,
            retention_days: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub trust_default: TrustLevel,
    pub sanitize_on_detect: SanitizeAction,
    pub max_content_chars: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            trust_default: TrustLevel::Community,
            sanitize_on_detect: SanitizeAction::Warn,
            max_content_chars: 50_000,
        }
    }
}

/// Root configuration value for the pattern engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CoreConfig {
    pub patterns: PatternsConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub consolidation: ConsolidationConfig,
    pub security: SecurityConfig,
}

impl CoreConfig {
    /// Validate invariants that must hold before the config is used to
    /// construct components: weights sum to 1 (within epsilon) and no
    /// negative budgets/thresholds.
    pub fn validate(&self) -> Result<()> {
        let w = &self.retrieval.weights;
        let sum = w.additive_sum() + w.negative_penalty - w.negative_penalty; // additive only
        let total = sum;
        if (total - 1.0).abs() > 1e-3 {
            return Err(Error::Configuration(format!(
                "retrieval weights must sum to 1, got {total}"
            )));
        }
        if self.retrieval.budget_chars == 0 {
            return Err(Error::Configuration(
                "retrieval.budget_chars must be positive".into(),
            ));
        }
        if self.consolidation.merge_threshold < 0.0 || self.consolidation.merge_threshold > 1.0 {
            return Err(Error::Configuration(
                "consolidation.merge_threshold must be in [0,1]".into(),
            ));
        }
        Ok(())
    }
}
