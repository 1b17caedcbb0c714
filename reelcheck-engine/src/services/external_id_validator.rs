//! External id validation (TMDB / IMDb)
//!
//! Asks sources what title and year they hold *for the entity's external id* and
//! checks that it is the same film as the catalog row. A wrong id is only ever
//! flagged for review; the validator never clears an id.

use crate::config::{ConsensusConfig, MatchingConfig};
use crate::consensus::ConsensusEngine;
use crate::matching::{years_within, SimilarityScorer, TitleRelation};
use crate::sources::Orchestrator;
use crate::types::{
    EntityId, EntityQuery, EntitySummary, ExternalIds, IssueSeverity, Severity, SourceRecord,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Year drift tolerated between catalog and id source (regional release staggering)
const ID_YEAR_TOLERANCE: u32 = 1;

pub const TITLE_FIELD: &str = "title";
pub const YEAR_FIELD: &str = "year";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalIdKind {
    Tmdb,
    Imdb,
}

impl fmt::Display for ExternalIdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalIdKind::Tmdb => write!(f, "tmdb"),
            ExternalIdKind::Imdb => write!(f, "imdb"),
        }
    }
}

impl ExternalIdKind {
    fn id_of(self, ids: &ExternalIds) -> Option<String> {
        match self {
            ExternalIdKind::Tmdb => ids.tmdb.map(|id| id.to_string()),
            ExternalIdKind::Imdb => ids.imdb.clone().filter(|id| !id.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdValidationStatus {
    Confirmed,
    TitleMismatch,
    YearMismatch,
    /// No source knows the id
    NotFound,
    /// Entity carries no id of this kind
    MissingId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdValidationAction {
    Keep,
    ManualReview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdValidation {
    pub entity_id: EntityId,
    pub kind: ExternalIdKind,
    pub external_id: Option<String>,
    pub status: IdValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_year: Option<i32>,
    pub title_similarity: f64,
    pub confidence: f64,
    pub action: IdValidationAction,
}

impl Severity for IdValidation {
    fn severity(&self) -> IssueSeverity {
        match self.status {
            IdValidationStatus::Confirmed | IdValidationStatus::MissingId => IssueSeverity::Info,
            IdValidationStatus::YearMismatch | IdValidationStatus::NotFound => IssueSeverity::Warning,
            IdValidationStatus::TitleMismatch => IssueSeverity::Critical,
        }
    }
}

pub struct ExternalIdValidator {
    consensus: ConsensusEngine,
    scorer: SimilarityScorer,
    title_threshold: f64,
}

impl Default for ExternalIdValidator {
    fn default() -> Self {
        Self::new(ConsensusConfig::default(), &MatchingConfig::default())
    }
}

impl ExternalIdValidator {
    pub fn new(consensus: ConsensusConfig, matching: &MatchingConfig) -> Self {
        Self {
            consensus: ConsensusEngine::new(consensus),
            scorer: matching.scorer(),
            title_threshold: matching.duplicate_threshold,
        }
    }

    /// Judge the id from the title/year records sources returned for it
    pub fn evaluate(&self, entity: &EntitySummary, kind: ExternalIdKind, records: &[SourceRecord]) -> IdValidation {
        let mut validation = IdValidation {
            entity_id: entity.id,
            kind,
            external_id: kind.id_of(&entity.external_ids),
            status: IdValidationStatus::MissingId,
            reported_title: None,
            reported_year: None,
            title_similarity: 0.0,
            confidence: 1.0,
            action: IdValidationAction::Keep,
        };
        if validation.external_id.is_none() {
            return validation;
        }

        let title = self.consensus.resolve(TITLE_FIELD, records);
        let Some(reported_title) = title.consensus_value.as_ref().map(|v| v.to_string()) else {
            validation.status = IdValidationStatus::NotFound;
            validation.confidence = 0.0;
            validation.action = IdValidationAction::ManualReview;
            return validation;
        };

        let year = self.consensus.resolve(YEAR_FIELD, records);
        validation.reported_year = year
            .consensus_value
            .as_ref()
            .and_then(|v| v.as_number())
            .and_then(|n| i32::try_from(n).ok());
        validation.title_similarity = self.title_similarity(entity, &reported_title);
        validation.reported_title = Some(reported_title);
        validation.confidence = title.confidence;

        let year_conflict = matches!(
            (entity.year, validation.reported_year),
            (Some(_), Some(_)) if !years_within(entity.year, validation.reported_year, ID_YEAR_TOLERANCE)
        );

        if validation.title_similarity < self.title_threshold {
            validation.status = IdValidationStatus::TitleMismatch;
            validation.action = IdValidationAction::ManualReview;
        } else if year_conflict {
            validation.status = IdValidationStatus::YearMismatch;
            validation.action = IdValidationAction::ManualReview;
        } else {
            validation.status = IdValidationStatus::Confirmed;
        }

        if validation.action == IdValidationAction::ManualReview {
            warn!(
                entity = %entity.id,
                kind = %kind,
                id = ?validation.external_id,
                status = ?validation.status,
                similarity = validation.title_similarity,
                "External id does not match entity"
            );
        } else {
            debug!(entity = %entity.id, kind = %kind, "External id confirmed");
        }
        validation
    }

    /// Query sources by the id and judge it
    pub async fn validate(
        &self,
        entity: &EntitySummary,
        kind: ExternalIdKind,
        orchestrator: &Orchestrator,
        cancel: &CancellationToken,
    ) -> IdValidation {
        let Some(id) = kind.id_of(&entity.external_ids) else {
            return self.evaluate(entity, kind, &[]);
        };
        let mut external_ids = ExternalIds::default();
        match kind {
            ExternalIdKind::Tmdb => external_ids.tmdb = entity.external_ids.tmdb,
            ExternalIdKind::Imdb => external_ids.imdb = Some(id.clone()),
        }
        // Deliberately no title/year: sources must resolve the id on its own
        let query = EntityQuery {
            key: format!("{}:{}", kind, id),
            title: None,
            year: None,
            external_ids,
        };
        let fields = [TITLE_FIELD.to_string(), YEAR_FIELD.to_string()];
        let response = orchestrator.query_cancellable(&query, &fields, cancel).await;
        self.evaluate(entity, kind, &response.records)
    }

    fn title_similarity(&self, entity: &EntitySummary, reported: &str) -> f64 {
        std::iter::once(entity.title.as_str())
            .chain(entity.alt_title.as_deref())
            .map(|title| {
                if self.scorer.classify(title, reported) == TitleRelation::SubtitleVariant {
                    1.0
                } else {
                    self.scorer.similarity(title, reported)
                }
            })
            .fold(0.0, f64::max)
    }
}
