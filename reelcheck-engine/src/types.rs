//! Core Types for reelcheck-engine
//!
//! Shared data contracts between the engine's components:
//! - Source side: `EntityQuery` in, `SourceRecord` / `SourceUnavailable` out
//! - Consensus: `ConsensusResult` per field
//! - Catalog side: `EntitySummary` snapshots of datastore rows
//! - Detector outputs: `DuplicateMatch`, `GhostAnalysis`, `DiscoveredAppearance`
//!
//! Every output type is `Serialize` so report layers can render it directly.
//! Result types are computed fresh per invocation and never cached here.

use crate::error::{EngineError, EngineResult};
use crate::matching::normalizer::normalize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Datastore row identifier
pub type EntityId = Uuid;

/// Source identifier (registry key)
pub type SourceId = String;

// ============================================================================
// Field values
// ============================================================================

/// Typed value a source reports for one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Integral value (release year, runtime minutes, external numeric ids)
    Number(i64),
    /// Free text (title, a single person's name)
    Text(String),
    /// Ordered list of names (cast in billing order, crew)
    List(Vec<String>),
}

impl FieldValue {
    /// Key under which two values are considered equal
    ///
    /// Text is compared after normalization, lists as normalized sets.
    /// Returns `None` for values that carry no information (blank text, empty list),
    /// which the consensus engine treats exactly like a null.
    pub fn comparison_key(&self) -> Option<String> {
        match self {
            FieldValue::Number(n) => Some(format!("#{}", n)),
            FieldValue::Text(s) => {
                let normalized = normalize(s);
                if normalized.is_empty() {
                    None
                } else {
                    Some(normalized.into_string())
                }
            }
            FieldValue::List(items) => {
                let members: BTreeSet<String> = items
                    .iter()
                    .map(|item| normalize(item).into_string())
                    .filter(|item| !item.is_empty())
                    .collect();
                if members.is_empty() {
                    None
                } else {
                    Some(members.into_iter().collect::<Vec<_>>().join("|"))
                }
            }
        }
    }

    /// Person names carried by this value, in reported order
    pub fn names(&self) -> Vec<&str> {
        match self {
            FieldValue::Number(_) => Vec::new(),
            FieldValue::Text(s) => vec![s.as_str()],
            FieldValue::List(items) => items.iter().map(String::as_str).collect(),
        }
    }

    /// Numeric payload, if any
    pub fn as_number(&self) -> Option<i64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
            FieldValue::List(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::List(items) => write!(f, "{}", items.join(", ")),
        }
    }
}

// ============================================================================
// Source side
// ============================================================================

/// External identifiers of a film
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
}

impl ExternalIds {
    pub fn is_empty(&self) -> bool {
        self.tmdb.is_none() && self.imdb.is_none()
    }
}

/// What adapters need to locate one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityQuery {
    /// Caller's key for the entity (datastore id, slug, or external id)
    pub key: String,
    pub title: Option<String>,
    pub year: Option<i32>,
    #[serde(default)]
    pub external_ids: ExternalIds,
}

impl From<&EntitySummary> for EntityQuery {
    fn from(entity: &EntitySummary) -> Self {
        Self {
            key: entity.id.to_string(),
            title: Some(entity.title.clone()),
            year: entity.year,
            external_ids: entity.external_ids.clone(),
        }
    }
}

/// One source's value for one field of one entity
///
/// Produced by the orchestrator from an adapter response; discarded after consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_id: SourceId,
    /// Independence key: sources sharing an origin do not corroborate each other
    pub origin: String,
    pub field_name: String,
    /// `None` when the source answered but had no value for the field
    pub value: Option<FieldValue>,
    pub fetched_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub trust_weight: f64,
}

impl SourceRecord {
    /// Record stamped with the current time and zero latency (fixtures, replays)
    pub fn new(
        source_id: impl Into<String>,
        field_name: impl Into<String>,
        value: Option<FieldValue>,
        trust_weight: f64,
    ) -> Self {
        let source_id = source_id.into();
        Self {
            origin: source_id.clone(),
            source_id,
            field_name: field_name.into(),
            value,
            fetched_at: Utc::now(),
            latency_ms: 0,
            trust_weight: trust_weight.clamp(0.0, 1.0),
        }
    }

    /// Override the independence key
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }
}

/// Why a source produced nothing for a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UnavailableReason {
    Timeout,
    Error(String),
    Cancelled,
}

/// A single adapter failed or timed out (non-fatal)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnavailable {
    pub source_id: SourceId,
    pub reason: UnavailableReason,
    pub latency_ms: u64,
}

// ============================================================================
// Consensus
// ============================================================================

/// Recommended automated action for a consensus decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusAction {
    AutoApply,
    FlagConflict,
    /// Sources answered, but nothing independent backs the value strongly enough
    ManualReview,
    /// No source answered
    InsufficientData,
}

/// One competing value in a split decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictValue {
    pub value: FieldValue,
    pub sources: Vec<SourceId>,
    pub weight: f64,
}

/// Competing values retained for human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictDetail {
    pub values: Vec<ConflictValue>,
}

/// Consensus decision for one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub field_name: String,
    pub consensus_value: Option<FieldValue>,
    /// Always within [0, 1]
    pub confidence: f64,
    pub agreeing_sources: Vec<SourceId>,
    pub disagreeing_sources: Vec<SourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictDetail>,
    pub action: ConsensusAction,
    /// Auto-applied below the auto-apply threshold: apply, but audit later
    pub audit: bool,
}

// ============================================================================
// Catalog side
// ============================================================================

/// Read-only projection of a datastore row used for comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub alt_title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub external_ids: ExternalIds,
    #[serde(default)]
    pub slug: String,
    /// role → person name (e.g. "hero" → "Prabhas", "director" → "S. S. Rajamouli")
    #[serde(default)]
    pub attributed_people: BTreeMap<String, String>,
}

impl EntitySummary {
    pub fn new(id: EntityId, title: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            id,
            title: title.into(),
            alt_title: None,
            year,
            external_ids: ExternalIds::default(),
            slug: String::new(),
            attributed_people: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Duplicate detection
// ============================================================================

/// Whether a duplicate was found by a shared key or by similarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Fuzzy,
}

/// Why two rows matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    TmdbId,
    ImdbId,
    NormalizedTitleYear,
    Slug,
    /// Titles differ only in punctuation or spacing
    SpacingVariant,
    AlternateTitle,
    SubtitleVariant,
    TransliterationVariant,
    /// Similar above threshold but no recognised variant pattern
    SimilarTitle,
}

impl MatchType {
    pub fn kind(self) -> MatchKind {
        match self {
            MatchType::TmdbId
            | MatchType::ImdbId
            | MatchType::NormalizedTitleYear
            | MatchType::Slug => MatchKind::Exact,
            _ => MatchKind::Fuzzy,
        }
    }
}

/// Recommended action for a duplicate pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateAction {
    MergeRecommended,
    ManualReview,
}

/// Two catalog rows judged to describe the same film
///
/// Ids are stored in ascending order, so a pair has one canonical form, and the
/// constructor refuses to pair an id with itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateMatch {
    id_a: EntityId,
    id_b: EntityId,
    match_kind: MatchKind,
    match_type: MatchType,
    matched_on: String,
    similarity: f64,
    confidence: f64,
    action: DuplicateAction,
}

impl DuplicateMatch {
    pub fn new(
        first: EntityId,
        second: EntityId,
        match_type: MatchType,
        matched_on: impl Into<String>,
        similarity: f64,
        confidence: f64,
        action: DuplicateAction,
    ) -> EngineResult<Self> {
        if first == second {
            return Err(EngineError::InvariantViolation(format!(
                "duplicate match pairs entity {} with itself",
                first
            )));
        }
        let (id_a, id_b) = if first < second { (first, second) } else { (second, first) };
        Ok(Self {
            id_a,
            id_b,
            match_kind: match_type.kind(),
            match_type,
            matched_on: matched_on.into(),
            similarity: similarity.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            action,
        })
    }

    pub fn id_a(&self) -> EntityId {
        self.id_a
    }

    pub fn id_b(&self) -> EntityId {
        self.id_b
    }

    pub fn match_kind(&self) -> MatchKind {
        self.match_kind
    }

    pub fn match_type(&self) -> MatchType {
        self.match_type
    }

    pub fn matched_on(&self) -> &str {
        &self.matched_on
    }

    pub fn similarity(&self) -> f64 {
        self.similarity
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn action(&self) -> DuplicateAction {
        self.action
    }

    /// Unordered pair key
    pub fn pair(&self) -> (EntityId, EntityId) {
        (self.id_a, self.id_b)
    }
}

/// Output of a full duplicate scan
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DuplicateReport {
    pub exact: Vec<DuplicateMatch>,
    pub fuzzy: Vec<DuplicateMatch>,
}

// ============================================================================
// Discovery and roles
// ============================================================================

/// Role an appearance is classified as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    Lead,
    Supporting,
    Cameo,
    Voice,
    ChildActor,
}

/// Derived role classification for one appearance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoleClassification {
    #[serde(rename = "type")]
    pub role_type: RoleType,
    pub confidence: f64,
    pub is_primary: bool,
}

/// One (person, film) fact as seen by the union of discovery sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredAppearance {
    pub title: String,
    pub year: Option<i32>,
    /// Credit text as reported (character name, "Cameo", "Voice", ...)
    #[serde(default)]
    pub role: Option<String>,
    /// Position in the reported cast list (1 = top billed)
    #[serde(default)]
    pub billing_order: Option<u32>,
    #[serde(default)]
    pub sources: BTreeSet<SourceId>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub external_ids: ExternalIds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<RoleClassification>,
}

impl DiscoveredAppearance {
    pub fn new(title: impl Into<String>, year: Option<i32>, source: impl Into<String>) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(source.into());
        Self {
            title: title.into(),
            year,
            role: None,
            billing_order: None,
            sources,
            confidence: 0.0,
            external_ids: ExternalIds::default(),
            classification: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_billing_order(mut self, order: u32) -> Self {
        self.billing_order = Some(order);
        self
    }
}

// ============================================================================
// Ghost re-attribution
// ============================================================================

/// Outcome of a ghost-entry check
///
/// There is deliberately no delete verdict: removal is a human decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostVerdict {
    Confirmed,
    Reattribute,
    FlagForReview,
}

/// One source's stance on the claimed person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GhostEvidence {
    pub source: SourceId,
    pub supports: bool,
    /// Person this source lists for the role instead, when it does not support the claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported: Option<String>,
}

/// Result of checking whether a person really belongs on a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostAnalysis {
    pub entity_id: EntityId,
    pub claimed_person: String,
    pub role: String,
    pub verdict: GhostVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_person: Option<String>,
    pub confidence: f64,
    pub evidence: Vec<GhostEvidence>,
}

// ============================================================================
// Severity mapping for report layers
// ============================================================================

/// Triage level of an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Info,
    Warning,
    Critical,
}

/// Outcomes that a report layer can triage
pub trait Severity {
    fn severity(&self) -> IssueSeverity;
}

impl Severity for ConsensusResult {
    fn severity(&self) -> IssueSeverity {
        match self.action {
            ConsensusAction::AutoApply if self.audit => IssueSeverity::Warning,
            ConsensusAction::AutoApply => IssueSeverity::Info,
            ConsensusAction::FlagConflict => IssueSeverity::Critical,
            ConsensusAction::ManualReview => IssueSeverity::Warning,
            ConsensusAction::InsufficientData => IssueSeverity::Warning,
        }
    }
}

impl Severity for DuplicateMatch {
    fn severity(&self) -> IssueSeverity {
        match self.action {
            DuplicateAction::MergeRecommended => IssueSeverity::Critical,
            DuplicateAction::ManualReview => IssueSeverity::Warning,
        }
    }
}

impl Severity for GhostAnalysis {
    fn severity(&self) -> IssueSeverity {
        match self.verdict {
            GhostVerdict::Confirmed => IssueSeverity::Info,
            GhostVerdict::Reattribute => IssueSeverity::Critical,
            GhostVerdict::FlagForReview => IssueSeverity::Warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_key_normalizes_text() {
        let a = FieldValue::Text("S.S. Rajamouli".to_string());
        let b = FieldValue::Text("  ss rajamouli ".to_string());
        assert_eq!(a.comparison_key(), b.comparison_key());
    }

    #[test]
    fn test_comparison_key_blank_is_none() {
        assert_eq!(FieldValue::Text("  ?! ".to_string()).comparison_key(), None);
        assert_eq!(FieldValue::List(vec![]).comparison_key(), None);
    }

    #[test]
    fn test_list_key_ignores_order() {
        let a = FieldValue::List(vec!["Prabhas".into(), "Rana Daggubati".into()]);
        let b = FieldValue::List(vec!["Rana Daggubati".into(), "prabhas".into()]);
        assert_eq!(a.comparison_key(), b.comparison_key());
    }

    #[test]
    fn test_duplicate_match_rejects_self_pair() {
        let id = Uuid::new_v4();
        let result = DuplicateMatch::new(
            id,
            id,
            MatchType::Slug,
            "slug=x",
            1.0,
            1.0,
            DuplicateAction::MergeRecommended,
        );
        assert!(matches!(result, Err(EngineError::InvariantViolation(_))));
    }

    #[test]
    fn test_duplicate_match_orders_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let m1 = DuplicateMatch::new(a, b, MatchType::Slug, "", 1.0, 1.0, DuplicateAction::MergeRecommended).unwrap();
        let m2 = DuplicateMatch::new(b, a, MatchType::Slug, "", 1.0, 1.0, DuplicateAction::MergeRecommended).unwrap();
        assert_eq!(m1.pair(), m2.pair());
        assert!(m1.id_a() < m1.id_b());
        assert_eq!(m1.match_kind(), MatchKind::Exact);
    }

    #[test]
    fn test_record_weight_clamped() {
        let record = SourceRecord::new("wiki", "title", None, 1.7);
        assert_eq!(record.trust_weight, 1.0);
        assert_eq!(record.origin, "wiki");
    }

    #[test]
    fn test_role_classification_serializes_type_key() {
        let c = RoleClassification {
            role_type: RoleType::ChildActor,
            confidence: 0.9,
            is_primary: false,
        };
        let json = serde_json::to_value(c).unwrap();
        assert_eq!(json["type"], "child_actor");
    }
}
