//! Consensus Engine
//!
//! Turns the per-source values for one field into a single decision.
//!
//! # Algorithm: Weighted Vote With Independent Corroboration
//! 1. Keep records for the field that carry a non-null, non-blank value (one per source)
//! 2. Group values by normalized equality (`FieldValue::comparison_key`)
//! 3. Winning group = highest Σ trust weight (ties: more independent origins, then key order)
//! 4. base = Σ winning weight / Σ responding weight
//! 5. ≥2 independent origins agree: base + boost per extra origin (capped);
//!    one origin only: no boost
//! 6. Cap below 1.0, then map to an action via the configured thresholds
//! 7. An uncorroborated winner cannot be trusted beyond its origin's own weight: below
//!    the audit threshold it goes to `manual_review`, below auto-apply it is audited
//!
//! `insufficient_data` is reserved for fields no source answered.
//!
//! Every aggregation iterates in sorted (source id / value key) order, so the result is
//! identical for any arrival order of the records.

use crate::config::ConsensusConfig;
use crate::types::{
    ConflictDetail, ConflictValue, ConsensusAction, ConsensusResult, FieldValue, SourceId,
    SourceRecord,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Records sharing one normalized value
struct ValueGroup<'a> {
    key: String,
    /// Sorted by source id
    members: Vec<&'a SourceRecord>,
    weight: f64,
}

impl<'a> ValueGroup<'a> {
    fn origins(&self) -> BTreeSet<&'a str> {
        self.members.iter().map(|r| r.origin.as_str()).collect()
    }

    fn max_trust(&self) -> f64 {
        self.members
            .iter()
            .map(|r| r.trust_weight)
            .fold(0.0, f64::max)
    }

    /// Value as reported by the most trusted member (smallest source id on ties)
    fn representative(&self) -> Option<&'a FieldValue> {
        let mut best: Option<&'a SourceRecord> = None;
        for record in &self.members {
            match best {
                Some(current) if record.trust_weight <= current.trust_weight => {}
                _ => best = Some(*record),
            }
        }
        best.and_then(|r| r.value.as_ref())
    }

    fn source_ids(&self) -> Vec<SourceId> {
        self.members.iter().map(|r| r.source_id.clone()).collect()
    }

    /// Ordering used to pick the winner (greater wins)
    fn rank(&self, other: &ValueGroup<'_>) -> Ordering {
        self.weight
            .total_cmp(&other.weight)
            .then_with(|| self.origins().len().cmp(&other.origins().len()))
            .then_with(|| other.key.cmp(&self.key))
    }
}

/// Consensus engine (stateless apart from its thresholds)
#[derive(Debug, Clone, Default)]
pub struct ConsensusEngine {
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Resolve one field from whatever records the sources returned
    ///
    /// Records for other fields are ignored, so callers may pass everything the
    /// orchestrator returned for an entity.
    pub fn resolve(&self, field_name: &str, records: &[SourceRecord]) -> ConsensusResult {
        // One vote per source; a source that reported twice keeps its smallest value key
        let mut responding: BTreeMap<&str, (String, &SourceRecord)> = BTreeMap::new();
        for record in records.iter().filter(|r| r.field_name == field_name) {
            let Some(key) = record.value.as_ref().and_then(FieldValue::comparison_key) else {
                continue;
            };
            let replace = responding
                .get(record.source_id.as_str())
                .map_or(true, |(existing, _)| key < *existing);
            if replace {
                responding.insert(record.source_id.as_str(), (key, record));
            }
        }

        if responding.is_empty() {
            debug!(field = field_name, "No source returned a value");
            return insufficient(field_name);
        }

        let mut groups: BTreeMap<String, ValueGroup<'_>> = BTreeMap::new();
        let mut total_weight = 0.0;
        for (key, record) in responding.values() {
            total_weight += record.trust_weight;
            let group = groups.entry(key.clone()).or_insert_with(|| ValueGroup {
                key: key.clone(),
                members: Vec::new(),
                weight: 0.0,
            });
            group.members.push(*record);
            group.weight += record.trust_weight;
        }

        let conflict = (groups.len() > 1).then(|| conflict_detail(&groups));

        let winner = match groups.values().max_by(|a, b| a.rank(b)) {
            Some(group) if total_weight > 0.0 => group,
            _ => {
                debug!(field = field_name, "Responding sources carry no trust weight");
                let mut result = insufficient(field_name);
                result.action = ConsensusAction::ManualReview;
                result.disagreeing_sources = responding.keys().map(|s| s.to_string()).collect();
                result.conflict = conflict;
                return result;
            }
        };

        let confidence = self.confidence(winner, total_weight);
        let (action, audit) = self.action(confidence, groups.len(), winner);

        let agreeing_sources = winner.source_ids();
        let disagreeing_sources: Vec<SourceId> = groups
            .values()
            .filter(|g| g.key != winner.key)
            .flat_map(|g| g.members.iter().map(|r| r.source_id.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if action == ConsensusAction::FlagConflict {
            warn!(
                field = field_name,
                confidence = confidence,
                groups = groups.len(),
                "Sources disagree below audit threshold"
            );
        } else {
            debug!(
                field = field_name,
                confidence = confidence,
                agreeing = agreeing_sources.len(),
                disagreeing = disagreeing_sources.len(),
                action = ?action,
                "Consensus resolved"
            );
        }

        ConsensusResult {
            field_name: field_name.to_string(),
            consensus_value: winner.representative().cloned(),
            confidence,
            agreeing_sources,
            disagreeing_sources,
            conflict,
            action,
            audit,
        }
    }

    /// Resolve every requested field from one entity's records
    pub fn resolve_all(&self, fields: &[String], records: &[SourceRecord]) -> Vec<ConsensusResult> {
        fields.iter().map(|field| self.resolve(field, records)).collect()
    }

    fn confidence(&self, winner: &ValueGroup<'_>, total_weight: f64) -> f64 {
        self.agreement_confidence(winner.weight, total_weight, winner.origins().len())
    }

    /// Confidence for an agreeing share of the responding trust weight
    ///
    /// Same formula as [`resolve`](Self::resolve): weight share, plus the corroboration
    /// boost once two or more independent origins agree, capped below certainty.
    pub fn agreement_confidence(&self, agreeing_weight: f64, total_weight: f64, independent: usize) -> f64 {
        if total_weight <= 0.0 {
            return 0.0;
        }
        let base = agreeing_weight / total_weight;
        let raw = if independent >= 2 {
            let boost = (self.config.corroboration_boost * (independent - 1) as f64)
                .min(self.config.max_boost);
            base + boost
        } else {
            base
        };

        raw.min(self.config.confidence_cap).clamp(0.0, 1.0)
    }

    fn action(&self, confidence: f64, group_count: usize, winner: &ValueGroup<'_>) -> (ConsensusAction, bool) {
        let (action, audit) = if confidence >= self.config.auto_apply_threshold {
            (ConsensusAction::AutoApply, false)
        } else if confidence >= self.config.audit_threshold {
            (ConsensusAction::AutoApply, true)
        } else if group_count > 1 {
            (ConsensusAction::FlagConflict, false)
        } else {
            (ConsensusAction::ManualReview, false)
        };

        if action != ConsensusAction::AutoApply || winner.origins().len() > 1 {
            return (action, audit);
        }
        let trust = winner.max_trust();
        if trust < self.config.audit_threshold {
            (ConsensusAction::ManualReview, false)
        } else if trust < self.config.auto_apply_threshold {
            (ConsensusAction::AutoApply, true)
        } else {
            (action, audit)
        }
    }
}

fn insufficient(field_name: &str) -> ConsensusResult {
    ConsensusResult {
        field_name: field_name.to_string(),
        consensus_value: None,
        confidence: 0.0,
        agreeing_sources: Vec::new(),
        disagreeing_sources: Vec::new(),
        conflict: None,
        action: ConsensusAction::InsufficientData,
        audit: false,
    }
}

/// Competing values, heaviest first
fn conflict_detail(groups: &BTreeMap<String, ValueGroup<'_>>) -> ConflictDetail {
    let mut ranked: Vec<&ValueGroup<'_>> = groups.values().collect();
    ranked.sort_by(|a, b| b.rank(a));
    let values = ranked
        .into_iter()
        .filter_map(|g| {
            g.representative().map(|value| ConflictValue {
                value: value.clone(),
                sources: g.source_ids(),
                weight: g.weight,
            })
        })
        .collect();
    ConflictDetail { values }
}
