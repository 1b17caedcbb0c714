//! Entity validation pipeline
//!
//! Query sources for one entity, resolve every requested field, and separate the
//! records that storage-deciding code may use. Batches go through [`BatchRunner`].

use crate::config::ConsensusConfig;
use crate::consensus::ConsensusEngine;
use crate::error::{EngineError, EngineResult};
use crate::sources::{BatchReport, BatchRunner, IngestCandidates, Orchestrator};
use crate::types::{ConsensusAction, ConsensusResult, EntityQuery, SourceUnavailable};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Validation outcome for one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityValidation {
    pub entity_key: String,
    /// One result per requested field, in request order
    pub results: Vec<ConsensusResult>,
    pub unavailable: Vec<SourceUnavailable>,
    /// Records from sources whose data may be persisted
    pub ingest_candidates: IngestCandidates,
}

impl EntityValidation {
    pub fn result(&self, field_name: &str) -> Option<&ConsensusResult> {
        self.results.iter().find(|r| r.field_name == field_name)
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &ConsensusResult> {
        self.results
            .iter()
            .filter(|r| r.action == ConsensusAction::FlagConflict)
    }
}

pub struct EntityValidator {
    orchestrator: Arc<Orchestrator>,
    consensus: ConsensusEngine,
    runner: BatchRunner,
}

impl EntityValidator {
    pub fn new(orchestrator: Arc<Orchestrator>, consensus: ConsensusConfig) -> Self {
        let runner = BatchRunner::from_config(orchestrator.config());
        Self {
            orchestrator,
            consensus: ConsensusEngine::new(consensus),
            runner,
        }
    }

    /// Replace the batch runner (tests and one-off bulk jobs)
    pub fn with_runner(mut self, runner: BatchRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Validate one entity
    ///
    /// # Returns
    /// `Err(InvariantViolation)` only if a consensus result is internally inconsistent;
    /// unreachable sources and conflicts are reported in the returned value.
    pub async fn validate(
        &self,
        query: &EntityQuery,
        fields: &[String],
        cancel: &CancellationToken,
    ) -> EngineResult<EntityValidation> {
        let response = self
            .orchestrator
            .query_cancellable(query, fields, cancel)
            .await;

        let results = self.consensus.resolve_all(fields, &response.records);
        for result in &results {
            check_result(&query.key, result)?;
        }
        let ingest_candidates = self
            .orchestrator
            .registry()
            .ingest_candidates(&response.records);

        debug!(
            entity = %query.key,
            fields = fields.len(),
            records = response.records.len(),
            unavailable = response.unavailable.len(),
            ingest_candidates = ingest_candidates.len(),
            "Entity validated"
        );

        Ok(EntityValidation {
            entity_key: query.key.clone(),
            results,
            unavailable: response.unavailable,
            ingest_candidates,
        })
    }

    /// Validate many entities in rate-limited batches
    pub async fn validate_batch(
        &self,
        queries: Vec<EntityQuery>,
        fields: &[String],
        cancel: &CancellationToken,
    ) -> BatchReport<EntityValidation> {
        let total = queries.len();
        let report = self
            .runner
            .run(queries, cancel, move |_, query| async move {
                self.validate(&query, fields, cancel).await
            })
            .await;

        info!(
            entities = total,
            completed = report.completed.len(),
            failed = report.failed.len(),
            skipped = report.skipped,
            cancelled = report.cancelled,
            "Entity validation batch finished"
        );
        report
    }
}

fn check_result(entity_key: &str, result: &ConsensusResult) -> EngineResult<()> {
    if !(0.0..=1.0).contains(&result.confidence) {
        return Err(EngineError::InvariantViolation(format!(
            "entity {} field {}: confidence {} outside [0, 1]",
            entity_key, result.field_name, result.confidence
        )));
    }
    if result.action == ConsensusAction::AutoApply && result.consensus_value.is_none() {
        return Err(EngineError::InvariantViolation(format!(
            "entity {} field {}: auto-apply without a value",
            entity_key, result.field_name
        )));
    }
    Ok(())
}
