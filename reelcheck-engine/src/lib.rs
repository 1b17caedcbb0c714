//! reelcheck engine
//!
//! Multi-source consensus and entity resolution for a film and celebrity catalog.
//! Values are gathered from several third-party sources, weighed by trust, and turned
//! into decisions (auto-apply, flag, insufficient data). Catalog rows are compared
//! against each other (duplicates) and against discovered filmographies (missing
//! records, mis-credited people).
//!
//! The engine never writes to the catalog. Every outcome is a recommendation for the
//! caller to apply or route to review.

pub mod config;
pub mod consensus;
pub mod db;
pub mod error;
pub mod matching;
pub mod services;
pub mod sources;
pub mod types;

pub use crate::config::EngineConfig;
pub use crate::error::{EngineError, EngineResult};

use crate::consensus::ConsensusEngine;
use crate::services::{
    AppearanceMerger, DiscoveryEngine, DuplicateDetector, EntityValidator, ExternalIdValidator,
    GhostEngine, MissingDetector,
};
use crate::sources::{Orchestrator, SourceRegistry};
use std::sync::Arc;
use tracing::info;

/// Validated configuration plus the source registry, shared by every service
///
/// Cheap to clone. Services built from one `Engine` all see the same thresholds.
#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    registry: Arc<SourceRegistry>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let registry = SourceRegistry::new(config.sources.iter().cloned())?;
        info!(
            sources = registry.len(),
            auto_apply_threshold = config.consensus.auto_apply_threshold,
            duplicate_threshold = config.matching.duplicate_threshold,
            "Engine configured"
        );
        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Orchestrator with no adapters attached yet
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(Arc::clone(&self.registry), self.config.orchestrator.clone())
    }

    pub fn consensus(&self) -> ConsensusEngine {
        ConsensusEngine::new(self.config.consensus.clone())
    }

    pub fn duplicate_detector(&self) -> DuplicateDetector {
        DuplicateDetector::new(&self.config.matching)
    }

    pub fn missing_detector(&self) -> MissingDetector {
        MissingDetector::new(&self.config.matching)
    }

    pub fn appearance_merger(&self) -> AppearanceMerger {
        AppearanceMerger::new(self.config.discovery.clone())
    }

    pub fn ghost_engine(&self) -> GhostEngine {
        GhostEngine::new(
            self.config.consensus.clone(),
            &self.config.matching,
            self.config.ghost.clone(),
        )
    }

    pub fn external_id_validator(&self) -> ExternalIdValidator {
        ExternalIdValidator::new(self.config.consensus.clone(), &self.config.matching)
    }

    /// Discovery engine with no filmography sources attached yet
    pub fn discovery_engine(&self) -> DiscoveryEngine {
        DiscoveryEngine::new(self.config.discovery.clone(), &self.config.matching)
    }

    pub fn entity_validator(&self, orchestrator: Arc<Orchestrator>) -> EntityValidator {
        EntityValidator::new(orchestrator, self.config.consensus.clone())
    }
}
