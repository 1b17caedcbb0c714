//! Engine configuration
//!
//! Every threshold, boost, timeout and batch size is a tunable value here rather than a
//! constant at its call site. The whole structure is deserialised from TOML once at
//! startup (see `reelcheck_common::config` for file resolution), validated, and then
//! shared immutably.
//!
//! ```toml
//! [consensus]
//! auto_apply_threshold = 0.90
//!
//! [orchestrator]
//! batch_size = 10
//!
//! [[sources]]
//! id = "tmdb"
//! name = "The Movie Database"
//! role = "baseline"
//! trust_weight = 0.9
//! capabilities = ["title", "year", "director", "cast"]
//! ```

use crate::error::{EngineError, EngineResult};
use crate::matching::SimilarityScorer;
use crate::sources::SourceDescriptor;
use reelcheck_common::config::{load_or_default, ConfigFileResolver, LoggingConfig};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Consensus engine tuning
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Confidence at or above which a value is applied without review
    pub auto_apply_threshold: f64,
    /// Confidence at or above which a value is applied but marked for audit
    pub audit_threshold: f64,
    /// Added per independent agreeing origin beyond the first
    pub corroboration_boost: f64,
    pub max_boost: f64,
    /// Confidence never reaches 1.0
    pub confidence_cap: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            auto_apply_threshold: 0.90,
            audit_threshold: 0.70,
            corroboration_boost: 0.03,
            max_boost: 0.15,
            confidence_cap: 0.98,
        }
    }
}

/// Title/name matching thresholds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Similarity needed to call two catalog rows duplicates
    pub duplicate_threshold: f64,
    /// Similarity needed to match a discovered appearance to a catalog row
    pub discovery_threshold: f64,
    pub duplicate_year_tolerance: u32,
    pub discovery_year_tolerance: u32,
    /// Similarity needed for two person names to count as the same person
    pub name_match_threshold: f64,
    /// Titles with this many words weight token overlap over edit distance
    pub long_title_words: usize,
    /// Edit similarity for two words to count as spelling variants
    pub near_token_threshold: f64,
    /// Year buckets larger than this are split by first title token
    pub first_token_bucket_threshold: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: 0.90,
            discovery_threshold: 0.70,
            duplicate_year_tolerance: 0,
            discovery_year_tolerance: 1,
            name_match_threshold: 0.90,
            long_title_words: 3,
            near_token_threshold: 0.80,
            first_token_bucket_threshold: 200,
        }
    }
}

impl MatchingConfig {
    pub fn scorer(&self) -> SimilarityScorer {
        SimilarityScorer::new(self.long_title_words, self.near_token_threshold)
    }
}

/// Source fan-out and batch pacing
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Default per-source timeout
    pub source_timeout_ms: u64,
    /// Overall deadline for one entity's fan-out
    pub deadline_ms: u64,
    pub batch_size: usize,
    /// Pause between batches (never between requests inside a batch)
    pub inter_batch_delay_ms: u64,
    /// Entities evaluated in parallel inside one batch
    pub max_concurrent_entities: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            source_timeout_ms: 8_000,
            deadline_ms: 15_000,
            batch_size: 10,
            inter_batch_delay_ms: 1_000,
            max_concurrent_entities: 4,
        }
    }
}

impl OrchestratorConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

/// Ghost re-attribution decision tree
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GhostConfig {
    /// Independent origins agreeing on one alternative for a strong re-attribution
    pub strong_agreement_sources: usize,
    pub strong_agreement_confidence: f64,
    pub moderate_agreement_sources: usize,
    pub moderate_agreement_confidence: f64,
    /// Review confidence = scale × share of origins that dispute the claim
    pub review_confidence_scale: f64,
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self {
            strong_agreement_sources: 3,
            strong_agreement_confidence: 0.95,
            moderate_agreement_sources: 2,
            moderate_agreement_confidence: 0.80,
            review_confidence_scale: 0.60,
        }
    }
}

/// Filmography discovery
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub single_source_confidence: f64,
    pub two_source_confidence: f64,
    pub multi_source_confidence: f64,
    /// Per filmography source timeout
    pub source_timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            single_source_confidence: 0.50,
            two_source_confidence: 0.75,
            multi_source_confidence: 0.95,
            source_timeout_ms: 8_000,
        }
    }
}

impl DiscoveryConfig {
    /// Confidence derived from how many sources reported an appearance
    pub fn confidence_for(&self, source_count: usize) -> f64 {
        match source_count {
            0 => 0.0,
            1 => self.single_source_confidence,
            2 => self.two_source_confidence,
            _ => self.multi_source_confidence,
        }
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub logging: LoggingConfig,
    pub consensus: ConsensusConfig,
    pub matching: MatchingConfig,
    pub orchestrator: OrchestratorConfig,
    pub ghost: GhostConfig,
    pub discovery: DiscoveryConfig,
    pub sources: Vec<SourceDescriptor>,
}

impl EngineConfig {
    /// Resolve, load and validate the configuration file
    ///
    /// Priority: explicit path, `REELCHECK_CONFIG`, platform config directory,
    /// compiled defaults.
    pub fn load(explicit: Option<&Path>) -> EngineResult<Self> {
        Self::load_with(&ConfigFileResolver::new(), explicit)
    }

    pub fn load_with(resolver: &ConfigFileResolver, explicit: Option<&Path>) -> EngineResult<Self> {
        let config: EngineConfig = load_or_default(resolver, explicit)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        let config: EngineConfig = reelcheck_common::config::parse_toml(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make decisions meaningless
    pub fn validate(&self) -> EngineResult<()> {
        let c = &self.consensus;
        check_unit("consensus.auto_apply_threshold", c.auto_apply_threshold)?;
        check_unit("consensus.audit_threshold", c.audit_threshold)?;
        check_unit("consensus.corroboration_boost", c.corroboration_boost)?;
        check_unit("consensus.max_boost", c.max_boost)?;
        check_unit("consensus.confidence_cap", c.confidence_cap)?;
        if c.audit_threshold > c.auto_apply_threshold {
            return Err(EngineError::Config(format!(
                "consensus.audit_threshold ({}) above auto_apply_threshold ({})",
                c.audit_threshold, c.auto_apply_threshold
            )));
        }
        if c.confidence_cap >= 1.0 {
            return Err(EngineError::Config(
                "consensus.confidence_cap must be below 1.0".to_string(),
            ));
        }

        let m = &self.matching;
        check_unit("matching.duplicate_threshold", m.duplicate_threshold)?;
        check_unit("matching.discovery_threshold", m.discovery_threshold)?;
        check_unit("matching.name_match_threshold", m.name_match_threshold)?;
        check_unit("matching.near_token_threshold", m.near_token_threshold)?;
        if m.long_title_words == 0 {
            return Err(EngineError::Config("matching.long_title_words must be > 0".to_string()));
        }

        let o = &self.orchestrator;
        if o.batch_size == 0 {
            return Err(EngineError::Config("orchestrator.batch_size must be > 0".to_string()));
        }
        if o.max_concurrent_entities == 0 {
            return Err(EngineError::Config(
                "orchestrator.max_concurrent_entities must be > 0".to_string(),
            ));
        }
        if o.source_timeout_ms == 0 || o.deadline_ms == 0 {
            return Err(EngineError::Config(
                "orchestrator timeouts must be > 0".to_string(),
            ));
        }

        let g = &self.ghost;
        check_unit("ghost.strong_agreement_confidence", g.strong_agreement_confidence)?;
        check_unit("ghost.moderate_agreement_confidence", g.moderate_agreement_confidence)?;
        check_unit("ghost.review_confidence_scale", g.review_confidence_scale)?;
        if g.moderate_agreement_sources < 2 || g.strong_agreement_sources < g.moderate_agreement_sources {
            return Err(EngineError::Config(
                "ghost agreement counts must satisfy 2 <= moderate <= strong".to_string(),
            ));
        }

        let d = &self.discovery;
        check_unit("discovery.single_source_confidence", d.single_source_confidence)?;
        check_unit("discovery.two_source_confidence", d.two_source_confidence)?;
        check_unit("discovery.multi_source_confidence", d.multi_source_confidence)?;

        let mut seen = BTreeSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(EngineError::Config(format!("duplicate source id: {}", source.id)));
            }
            check_unit(&format!("sources.{}.trust_weight", source.id), source.trust_weight)?;
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> EngineResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::Config(format!("{} = {} outside [0, 1]", name, value)))
    }
}
