//! Source registry
//!
//! Static descriptors for every known source, built once from configuration and shared
//! read-only (`Arc<SourceRegistry>`) by all concurrent queries.
//!
//! The registry is also the only place that can decide which records are eligible for
//! storage: `IngestCandidates` has no public constructor, so storage-deciding code can
//! only receive records that went through `SourceRegistry::ingest_candidates`.

use crate::error::{EngineError, EngineResult};
use crate::types::{SourceId, SourceRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// What a source's output may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    /// Queried first, authoritative by default
    Baseline,
    /// Confirmation only, output is never stored
    ValidateOnly,
    /// May contribute storable values for new records
    Ingest,
    /// May contribute storable values for existing records
    Enrich,
}

/// Static description of one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: SourceId,
    /// Human-readable name
    pub name: String,
    pub role: SourceRole,
    pub trust_weight: f64,
    /// Fields this source can answer (e.g. "title", "year", "director", "cast")
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Output may only be stored once license/attribution has been validated
    #[serde(default)]
    pub requires_license_check: bool,
    #[serde(default)]
    pub license_validated: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Independence key; sources that mirror each other share an origin
    #[serde(default)]
    pub origin: Option<String>,
    /// Per-source timeout override
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Per-source request quota
    #[serde(default)]
    pub rate_limit_per_second: Option<u32>,
}

fn default_enabled() -> bool {
    true
}

impl SourceDescriptor {
    pub fn new(id: impl Into<String>, role: SourceRole, trust_weight: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            role,
            trust_weight,
            capabilities: BTreeSet::new(),
            requires_license_check: false,
            license_validated: false,
            enabled: true,
            origin: None,
            timeout_ms: None,
            rate_limit_per_second: None,
        }
    }

    pub fn with_capabilities<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Independence key (defaults to the source id)
    pub fn origin(&self) -> &str {
        self.origin.as_deref().unwrap_or(&self.id)
    }

    /// Source answers at least one of `fields`
    pub fn can_answer(&self, fields: &[String]) -> bool {
        fields.iter().any(|f| self.capabilities.contains(f))
    }

    fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::Config("source id must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.trust_weight) || self.trust_weight.is_nan() {
            return Err(EngineError::Config(format!(
                "source {}: trust_weight {} outside [0, 1]",
                self.id, self.trust_weight
            )));
        }
        if self.timeout_ms == Some(0) {
            return Err(EngineError::Config(format!("source {}: timeout_ms must be > 0", self.id)));
        }
        if self.rate_limit_per_second == Some(0) {
            return Err(EngineError::Config(format!(
                "source {}: rate_limit_per_second must be > 0",
                self.id
            )));
        }
        Ok(())
    }
}

/// Read-only set of source descriptors
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<SourceId, SourceDescriptor>,
}

impl SourceRegistry {
    /// Build a registry, rejecting invalid or duplicate descriptors
    pub fn new(descriptors: impl IntoIterator<Item = SourceDescriptor>) -> EngineResult<Self> {
        let mut sources = BTreeMap::new();
        for descriptor in descriptors {
            descriptor.validate()?;
            if sources.contains_key(&descriptor.id) {
                return Err(EngineError::Config(format!(
                    "duplicate source id: {}",
                    descriptor.id
                )));
            }
            sources.insert(descriptor.id.clone(), descriptor);
        }
        debug!(sources = sources.len(), "Source registry built");
        Ok(Self { sources })
    }

    pub fn get(&self, source_id: &str) -> Option<&SourceDescriptor> {
        self.sources.get(source_id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.values()
    }

    /// Enabled sources capable of answering any of `fields`, baseline sources first
    pub fn applicable(&self, fields: &[String]) -> Vec<&SourceDescriptor> {
        let mut selected: Vec<&SourceDescriptor> = self
            .sources
            .values()
            .filter(|d| d.enabled && d.can_answer(fields))
            .collect();
        selected.sort_by_key(|d| (d.role != SourceRole::Baseline, d.id.clone()));
        selected
    }

    /// Whether output from `source_id` may reach storage
    pub fn is_storable(&self, source_id: &str) -> bool {
        match self.sources.get(source_id) {
            Some(d) => {
                d.enabled
                    && d.role != SourceRole::ValidateOnly
                    && (!d.requires_license_check || d.license_validated)
            }
            None => false,
        }
    }

    /// Filter records down to those whose source may contribute storable values
    pub fn ingest_candidates(&self, records: &[SourceRecord]) -> IngestCandidates {
        let records = records
            .iter()
            .filter(|r| r.value.is_some() && self.is_storable(&r.source_id))
            .cloned()
            .collect();
        IngestCandidates { records }
    }
}

/// Records eligible for storage-deciding code
///
/// Only `SourceRegistry::ingest_candidates` can build one, so validate-only,
/// unlicensed, disabled and unknown sources never appear in it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestCandidates {
    records: Vec<SourceRecord>,
}

impl IngestCandidates {
    pub fn records(&self) -> &[SourceRecord] {
        &self.records
    }

    pub fn source_ids(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.source_id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
