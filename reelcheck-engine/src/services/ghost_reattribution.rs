//! Ghost entry re-attribution
//!
//! Checks whether a person credited on a record really belongs there.
//!
//! # Decision tree
//! 1. No source has data for the role → `flag_for_review` (absence of evidence is not
//!    evidence of absence)
//! 2. Claimed person is in the consensus value for the role → `confirmed`
//! 3. Otherwise collect each dissenting source's alternative and count independent
//!    origins per alternative:
//!    - unique top alternative backed by ≥ strong count (3) → `reattribute` at 0.95
//!    - unique top alternative backed by ≥ moderate count (2) → `reattribute` at 0.80
//!    - anything else → `flag_for_review`
//!
//! A re-attribution also requires the alternative to out-number the origins that still
//! list the claimed person. There is no delete verdict.
//!
//! Roles reported as lists (cast, crew) are judged per member instead: the trust weight
//! of sources listing the claimed person against the weight of sources whose list
//! omits them. A list member has no single replacement, so those claims are either
//! confirmed or flagged for review, never re-attributed.

use crate::config::{ConsensusConfig, GhostConfig, MatchingConfig};
use crate::consensus::ConsensusEngine;
use crate::matching::{normalize, SimilarityScorer};
use crate::sources::Orchestrator;
use crate::types::{
    EntityId, EntityQuery, EntitySummary, FieldValue, GhostAnalysis, GhostEvidence, GhostVerdict,
    SourceRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A (role, person) credit to verify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GhostClaim {
    /// Field the sources report for this role ("hero", "director", "cast", ...)
    pub role: String,
    pub person: String,
}

impl GhostClaim {
    pub fn new(role: impl Into<String>, person: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            person: person.into(),
        }
    }
}

/// Alternative person named by one or more dissenting sources
struct Alternative<'a> {
    /// Name as reported by the most trusted source naming it
    display: &'a str,
    display_trust: f64,
    origins: BTreeSet<&'a str>,
}

pub struct GhostEngine {
    consensus: ConsensusEngine,
    scorer: SimilarityScorer,
    name_threshold: f64,
    config: GhostConfig,
}

impl Default for GhostEngine {
    fn default() -> Self {
        Self::new(
            ConsensusConfig::default(),
            &MatchingConfig::default(),
            GhostConfig::default(),
        )
    }
}

impl GhostEngine {
    pub fn new(consensus: ConsensusConfig, matching: &MatchingConfig, config: GhostConfig) -> Self {
        Self {
            consensus: ConsensusEngine::new(consensus),
            scorer: matching.scorer(),
            name_threshold: matching.name_match_threshold,
            config,
        }
    }

    /// Decide on one claim from already-fetched source records
    pub fn evaluate(&self, entity_id: EntityId, claim: &GhostClaim, records: &[SourceRecord]) -> GhostAnalysis {
        // One record per source, smallest value key wins for determinism
        let mut by_source: BTreeMap<&str, (String, &SourceRecord)> = BTreeMap::new();
        for record in records.iter().filter(|r| r.field_name == claim.role) {
            let Some(key) = record.value.as_ref().and_then(FieldValue::comparison_key) else {
                continue;
            };
            let replace = by_source
                .get(record.source_id.as_str())
                .map_or(true, |(existing, _)| key < *existing);
            if replace {
                by_source.insert(record.source_id.as_str(), (key, record));
            }
        }

        let mut analysis = GhostAnalysis {
            entity_id,
            claimed_person: claim.person.clone(),
            role: claim.role.clone(),
            verdict: GhostVerdict::FlagForReview,
            suggested_person: None,
            confidence: 0.0,
            evidence: Vec::new(),
        };

        if by_source.is_empty() {
            debug!(entity = %entity_id, role = %claim.role, "No source has data for role");
            return analysis;
        }

        let multi_member = by_source
            .values()
            .any(|(_, record)| matches!(record.value, Some(FieldValue::List(_))));
        if multi_member {
            let reporting: Vec<&SourceRecord> = by_source.values().map(|&(_, record)| record).collect();
            return self.evaluate_member(analysis, claim, &reporting);
        }

        let mut supporting_origins: BTreeSet<&str> = BTreeSet::new();
        let mut all_origins: BTreeSet<&str> = BTreeSet::new();
        let mut alternatives: Vec<Alternative<'_>> = Vec::new();

        for &(_, record) in by_source.values() {
            let names = record.value.as_ref().map(FieldValue::names).unwrap_or_default();
            let supports = names.iter().any(|name| self.same_person(name, &claim.person));
            all_origins.insert(record.origin.as_str());

            let reported = if supports {
                supporting_origins.insert(record.origin.as_str());
                None
            } else {
                names.first().copied()
            };
            if let Some(name) = reported {
                self.add_alternative(&mut alternatives, name, record);
            }
            analysis.evidence.push(GhostEvidence {
                source: record.source_id.clone(),
                supports,
                reported: reported.map(str::to_string),
            });
        }

        let consensus = self.consensus.resolve(&claim.role, records);
        let in_consensus = consensus.consensus_value.as_ref().map_or(false, |value| {
            value.names().iter().any(|name| self.same_person(name, &claim.person))
        });
        if in_consensus {
            analysis.verdict = GhostVerdict::Confirmed;
            analysis.confidence = consensus.confidence;
            debug!(
                entity = %entity_id,
                person = %claim.person,
                confidence = analysis.confidence,
                "Credit confirmed by consensus"
            );
            return analysis;
        }

        // An origin that lists the claimed person does not also count for an alternative
        for alternative in alternatives.iter_mut() {
            alternative.origins.retain(|origin| !supporting_origins.contains(origin));
        }
        alternatives.retain(|a| !a.origins.is_empty());
        alternatives.sort_by(|a, b| b.origins.len().cmp(&a.origins.len()));

        let top = alternatives.first();
        let runner_up = alternatives.get(1).map_or(0, |a| a.origins.len());
        let unique_top = top.filter(|t| t.origins.len() > runner_up);

        let decision = unique_top.and_then(|top| {
            let backing = top.origins.len();
            if backing <= supporting_origins.len() {
                None
            } else if backing >= self.config.strong_agreement_sources {
                Some((top, self.config.strong_agreement_confidence))
            } else if backing >= self.config.moderate_agreement_sources {
                Some((top, self.config.moderate_agreement_confidence))
            } else {
                None
            }
        });

        match decision {
            Some((top, confidence)) => {
                analysis.verdict = GhostVerdict::Reattribute;
                analysis.confidence = confidence;
                analysis.suggested_person = Some(top.display.to_string());
                info!(
                    entity = %entity_id,
                    role = %claim.role,
                    claimed = %claim.person,
                    suggested = %top.display,
                    sources = top.origins.len(),
                    "Re-attribution recommended"
                );
            }
            None => {
                let disputing = all_origins.len() - supporting_origins.len();
                analysis.confidence =
                    self.config.review_confidence_scale * disputing as f64 / all_origins.len() as f64;
                analysis.suggested_person = unique_top.map(|t| t.display.to_string());
                debug!(
                    entity = %entity_id,
                    role = %claim.role,
                    claimed = %claim.person,
                    alternatives = alternatives.len(),
                    "Credit flagged for review"
                );
            }
        }
        analysis
    }

    /// Query sources for the role and decide on one claim
    pub async fn analyze(
        &self,
        entity: &EntitySummary,
        claim: &GhostClaim,
        orchestrator: &Orchestrator,
        cancel: &CancellationToken,
    ) -> GhostAnalysis {
        let query = EntityQuery::from(entity);
        let response = orchestrator
            .query_cancellable(&query, &[claim.role.clone()], cancel)
            .await;
        self.evaluate(entity.id, claim, &response.records)
    }

    /// Check every person credited on the entity with one source query
    pub async fn analyze_attributed(
        &self,
        entity: &EntitySummary,
        orchestrator: &Orchestrator,
        cancel: &CancellationToken,
    ) -> Vec<GhostAnalysis> {
        if entity.attributed_people.is_empty() {
            return Vec::new();
        }
        let roles: Vec<String> = entity.attributed_people.keys().cloned().collect();
        let response = orchestrator
            .query_cancellable(&EntityQuery::from(entity), &roles, cancel)
            .await;
        entity
            .attributed_people
            .iter()
            .map(|(role, person)| {
                self.evaluate(entity.id, &GhostClaim::new(role.clone(), person.clone()), &response.records)
            })
            .collect()
    }

    /// Per-member decision for list roles
    fn evaluate_member(&self, mut analysis: GhostAnalysis, claim: &GhostClaim, records: &[&SourceRecord]) -> GhostAnalysis {
        let mut support_weight = 0.0;
        let mut total_weight = 0.0;
        let mut supporting_origins: BTreeSet<&str> = BTreeSet::new();
        let mut all_origins: BTreeSet<&str> = BTreeSet::new();

        for record in records {
            let names = record.value.as_ref().map(FieldValue::names).unwrap_or_default();
            let supports = names.iter().any(|name| self.same_person(name, &claim.person));
            total_weight += record.trust_weight;
            all_origins.insert(record.origin.as_str());
            if supports {
                support_weight += record.trust_weight;
                supporting_origins.insert(record.origin.as_str());
            }
            analysis.evidence.push(GhostEvidence {
                source: record.source_id.clone(),
                supports,
                reported: None,
            });
        }

        let dispute_weight = total_weight - support_weight;
        if support_weight > 0.0 && support_weight > dispute_weight {
            analysis.verdict = GhostVerdict::Confirmed;
            analysis.confidence =
                self.consensus
                    .agreement_confidence(support_weight, total_weight, supporting_origins.len());
            debug!(
                entity = %analysis.entity_id,
                role = %claim.role,
                person = %claim.person,
                confidence = analysis.confidence,
                "List membership confirmed"
            );
        } else {
            let disputing = all_origins.difference(&supporting_origins).count();
            analysis.confidence =
                self.config.review_confidence_scale * disputing as f64 / all_origins.len() as f64;
            debug!(
                entity = %analysis.entity_id,
                role = %claim.role,
                person = %claim.person,
                supporting = supporting_origins.len(),
                disputing,
                "List membership flagged for review"
            );
        }
        analysis
    }

    fn same_person(&self, a: &str, b: &str) -> bool {
        self.scorer.names_match(a, b, self.name_threshold)
    }

    fn add_alternative<'a>(&self, alternatives: &mut Vec<Alternative<'a>>, name: &'a str, record: &'a SourceRecord) {
        if normalize(name).is_empty() {
            return;
        }
        let existing = alternatives
            .iter_mut()
            .find(|a| self.same_person(a.display, name));
        match existing {
            Some(alternative) => {
                alternative.origins.insert(record.origin.as_str());
                if record.trust_weight > alternative.display_trust {
                    alternative.display = name;
                    alternative.display_trust = record.trust_weight;
                }
            }
            None => {
                let mut origins = BTreeSet::new();
                origins.insert(record.origin.as_str());
                alternatives.push(Alternative {
                    display: name,
                    display_trust: record.trust_weight,
                    origins,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn hero(source: &str, name: &str) -> SourceRecord {
        SourceRecord::new(source, "hero", Some(FieldValue::Text(name.to_string())), 0.8)
    }

    fn claim(person: &str) -> GhostClaim {
        GhostClaim::new("hero", person)
    }

    #[test]
    fn test_three_sources_agree_on_alternative() {
        let records = vec![hero("a", "Prabhas"), hero("b", "Prabhas"), hero("c", "prabhas")];
        let analysis = GhostEngine::default().evaluate(Uuid::new_v4(), &claim("Gopichand"), &records);
        assert_eq!(analysis.verdict, GhostVerdict::Reattribute);
        assert_eq!(analysis.confidence, 0.95);
        assert_eq!(analysis.suggested_person.as_deref(), Some("Prabhas"));
        assert!(analysis.evidence.iter().all(|e| !e.supports));
    }

    #[test]
    fn test_two_sources_agree() {
        let records = vec![hero("a", "Prabhas"), hero("b", "Prabhas")];
        let analysis = GhostEngine::default().evaluate(Uuid::new_v4(), &claim("Gopichand"), &records);
        assert_eq!(analysis.verdict, GhostVerdict::Reattribute);
        assert_eq!(analysis.confidence, 0.80);
    }

    #[test]
    fn test_claim_in_consensus_confirmed() {
        let records = vec![hero("a", "Prabhas"), hero("b", "Prabhas"), hero("c", "Gopichand")];
        let analysis = GhostEngine::default().evaluate(Uuid::new_v4(), &claim("prabhas"), &records);
        assert_eq!(analysis.verdict, GhostVerdict::Confirmed);
        assert!(analysis.confidence > 0.0);
        assert_eq!(analysis.evidence.iter().filter(|e| e.supports).count(), 2);
    }

    #[test]
    fn test_no_data_flags_review() {
        let analysis = GhostEngine::default().evaluate(Uuid::new_v4(), &claim("Prabhas"), &[]);
        assert_eq!(analysis.verdict, GhostVerdict::FlagForReview);
        assert_eq!(analysis.confidence, 0.0);
        assert!(analysis.suggested_person.is_none());
    }

    #[test]
    fn test_single_dissent_flags_review() {
        let analysis = GhostEngine::default().evaluate(Uuid::new_v4(), &claim("Gopichand"), &[hero("a", "Prabhas")]);
        assert_eq!(analysis.verdict, GhostVerdict::FlagForReview);
        assert_eq!(analysis.suggested_person.as_deref(), Some("Prabhas"));
    }

    #[test]
    fn test_split_alternatives_flag_review() {
        let records = vec![
            hero("a", "Prabhas"),
            hero("b", "Prabhas"),
            hero("c", "Rana Daggubati"),
            hero("d", "Rana Daggubati"),
        ];
        let analysis = GhostEngine::default().evaluate(Uuid::new_v4(), &claim("Gopichand"), &records);
        assert_eq!(analysis.verdict, GhostVerdict::FlagForReview);
        assert!(analysis.suggested_person.is_none());
    }

    #[test]
    fn test_mirrors_count_once() {
        let records = vec![
            hero("wiki", "Prabhas"),
            hero("wiki-en", "Prabhas").with_origin("wiki"),
            hero("wiki-te", "Prabhas").with_origin("wiki"),
        ];
        let analysis = GhostEngine::default().evaluate(Uuid::new_v4(), &claim("Gopichand"), &records);
        assert_eq!(analysis.verdict, GhostVerdict::FlagForReview);
    }

    #[test]
    fn test_cast_list_support() {
        let records = vec![
            cast("a", &["Prabhas", "Anushka Shetty"], 0.8),
            cast("b", &["Prabhas", "Anushka Shetty"], 0.8),
        ];
        let analysis = GhostEngine::default().evaluate(
            Uuid::new_v4(),
            &GhostClaim::new("cast", "Anushka Shetty"),
            &records,
        );
        assert_eq!(analysis.verdict, GhostVerdict::Confirmed);
        assert_eq!(analysis.confidence, 0.98);
    }

    fn cast(source: &str, names: &[&str], weight: f64) -> SourceRecord {
        SourceRecord::new(
            source,
            "cast",
            Some(FieldValue::List(names.iter().map(|s| s.to_string()).collect())),
            weight,
        )
    }

    #[test]
    fn test_member_of_partially_overlapping_casts_confirmed() {
        let records = vec![
            cast("a", &["Prabhas", "Anushka Shetty", "Rana Daggubati"], 0.8),
            cast("b", &["Prabhas", "Anushka Shetty", "Sathyaraj"], 0.8),
            cast("c", &["Prabhas", "Rana Daggubati"], 0.9),
        ];
        let analysis = GhostEngine::default().evaluate(
            Uuid::new_v4(),
            &GhostClaim::new("cast", "Anushka Shetty"),
            &records,
        );
        assert_eq!(analysis.verdict, GhostVerdict::Confirmed);
        assert!((analysis.confidence - (1.6 / 2.5 + 0.03)).abs() < 1e-9);
        assert!(analysis.suggested_person.is_none());
        assert_eq!(analysis.evidence.iter().filter(|e| e.supports).count(), 2);
    }

    #[test]
    fn test_absent_cast_member_never_replaced_by_lead() {
        let records = vec![
            cast("a", &["Prabhas", "Rana Daggubati"], 0.8),
            cast("b", &["Prabhas", "Rana Daggubati", "Ramya Krishnan"], 0.8),
        ];
        let analysis = GhostEngine::default().evaluate(
            Uuid::new_v4(),
            &GhostClaim::new("cast", "Nassar"),
            &records,
        );
        assert_eq!(analysis.verdict, GhostVerdict::FlagForReview);
        assert!(analysis.suggested_person.is_none());
        assert!((analysis.confidence - 0.60).abs() < 1e-9);
        assert!(analysis.evidence.iter().all(|e| e.reported.is_none()));
    }

    #[test]
    fn test_cast_minority_support_flags_review() {
        let records = vec![
            cast("a", &["Prabhas", "Nassar"], 0.5),
            cast("b", &["Prabhas"], 0.9),
            cast("c", &["Prabhas"], 0.9),
        ];
        let analysis = GhostEngine::default().evaluate(
            Uuid::new_v4(),
            &GhostClaim::new("cast", "Nassar"),
            &records,
        );
        assert_eq!(analysis.verdict, GhostVerdict::FlagForReview);
        assert!((analysis.confidence - 0.60 * 2.0 / 3.0).abs() < 1e-9);
    }
}
