//! Filmography discovery
//!
//! Collects a person's filmography from every attached filmography source, merges the
//! per-source lists, classifies roles and reports which appearances the catalog lacks.
//!
//! # Algorithm
//! 1. Fan out to all sources concurrently; each gets its own timeout and a failure in
//!    one never affects the others
//! 2. Stamp every returned appearance with the id of the source that produced it
//! 3. Merge with [`AppearanceMerger`] (confidence from independent source count)
//! 4. Classify each merged appearance with the role classifier
//! 5. Compare against catalog rows with [`MissingDetector`]

use crate::config::{DiscoveryConfig, MatchingConfig};
use crate::db::{Catalog, CatalogFilter};
use crate::error::{EngineError, EngineResult};
use crate::services::appearance_merger::AppearanceMerger;
use crate::services::missing_detector::MissingDetector;
use crate::services::role_classifier::classify_all;
use crate::sources::SourceError;
use crate::types::{DiscoveredAppearance, EntitySummary, SourceId, SourceUnavailable, UnavailableReason};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Person whose filmography is being discovered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonQuery {
    pub name: String,
    #[serde(default)]
    pub birth_year: Option<i32>,
    #[serde(default)]
    pub tmdb_person_id: Option<u64>,
}

impl PersonQuery {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            birth_year: None,
            tmdb_person_id: None,
        }
    }

    pub fn with_birth_year(mut self, year: i32) -> Self {
        self.birth_year = Some(year);
        self
    }
}

/// A source that can list a person's film appearances
#[async_trait]
pub trait FilmographySource: Send + Sync {
    fn source_id(&self) -> &str;

    /// All appearances this source knows for the person
    ///
    /// Returned appearances may carry any `sources` value; the engine replaces it with
    /// this source's id.
    async fn filmography(&self, person: &PersonQuery) -> Result<Vec<DiscoveredAppearance>, SourceError>;
}

/// Outcome of one discovery run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryReport {
    pub person: PersonQuery,
    /// Merged, classified appearances sorted by (title, year) key
    pub appearances: Vec<DiscoveredAppearance>,
    /// Appearances with no matching catalog row
    pub missing: Vec<DiscoveredAppearance>,
    pub responded: Vec<SourceId>,
    pub unavailable: Vec<SourceUnavailable>,
}

enum SourceOutcome {
    Listed(Vec<DiscoveredAppearance>),
    Unavailable(SourceUnavailable),
}

pub struct DiscoveryEngine {
    sources: Vec<Arc<dyn FilmographySource>>,
    merger: AppearanceMerger,
    detector: MissingDetector,
    year_tolerance: u32,
    config: DiscoveryConfig,
}

impl DiscoveryEngine {
    pub fn new(config: DiscoveryConfig, matching: &MatchingConfig) -> Self {
        Self {
            sources: Vec::new(),
            merger: AppearanceMerger::new(config.clone()),
            detector: MissingDetector::new(matching),
            year_tolerance: matching.discovery_year_tolerance,
            config,
        }
    }

    /// Attach a filmography source; ids must be unique
    pub fn register_source(&mut self, source: Arc<dyn FilmographySource>) -> EngineResult<()> {
        if self.sources.iter().any(|s| s.source_id() == source.source_id()) {
            return Err(EngineError::Config(format!(
                "filmography source {} registered twice",
                source.source_id()
            )));
        }
        self.sources.push(source);
        Ok(())
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Discover, merge, classify and diff against the given catalog rows
    pub async fn discover(
        &self,
        person: &PersonQuery,
        catalog_rows: &[EntitySummary],
        cancel: &CancellationToken,
    ) -> DiscoveryReport {
        let (appearances, responded, unavailable) = self.collect(person, cancel).await;
        let missing = self.detector.find_missing(&appearances, catalog_rows);

        info!(
            person = %person.name,
            appearances = appearances.len(),
            missing = missing.len(),
            responded = responded.len(),
            unavailable = unavailable.len(),
            "Filmography discovery complete"
        );

        DiscoveryReport {
            person: person.clone(),
            appearances,
            missing,
            responded,
            unavailable,
        }
    }

    /// Like [`discover`](Self::discover), loading candidate rows from a catalog
    ///
    /// Rows are fetched for the span of discovered years widened by the discovery year
    /// tolerance (undated rows included), plus every row already crediting the person.
    pub async fn discover_against(
        &self,
        person: &PersonQuery,
        catalog: &dyn Catalog,
        cancel: &CancellationToken,
    ) -> EngineResult<DiscoveryReport> {
        let (appearances, responded, unavailable) = self.collect(person, cancel).await;

        let years: BTreeSet<i32> = appearances.iter().filter_map(|a| a.year).collect();
        let mut rows = match (years.first(), years.last()) {
            (Some(&first), Some(&last)) => {
                let from = first.saturating_sub_unsigned(self.year_tolerance);
                let to = last.saturating_add_unsigned(self.year_tolerance);
                catalog
                    .fetch_by_filter(&CatalogFilter {
                        include_undated: true,
                        ..CatalogFilter::years(from, to)
                    })
                    .await?
            }
            _ => Vec::new(),
        };
        let credited = catalog
            .fetch_by_filter(&CatalogFilter {
                person: Some(person.name.clone()),
                ..CatalogFilter::default()
            })
            .await?;
        for row in credited {
            if !rows.iter().any(|r| r.id == row.id) {
                rows.push(row);
            }
        }
        // Undated discoveries can only match undated or any-year rows; fetch the lot
        if appearances.iter().any(|a| a.year.is_none()) {
            for row in catalog.fetch_by_filter(&CatalogFilter::default()).await? {
                if !rows.iter().any(|r| r.id == row.id) {
                    rows.push(row);
                }
            }
        }
        debug!(person = %person.name, candidates = rows.len(), "Catalog rows loaded for discovery");

        let missing = self.detector.find_missing(&appearances, &rows);
        Ok(DiscoveryReport {
            person: person.clone(),
            appearances,
            missing,
            responded,
            unavailable,
        })
    }

    async fn collect(
        &self,
        person: &PersonQuery,
        cancel: &CancellationToken,
    ) -> (Vec<DiscoveredAppearance>, Vec<SourceId>, Vec<SourceUnavailable>) {
        let timeout = self.config.source_timeout();
        let calls = self.sources.iter().map(|source| async move {
            let start = Instant::now();
            let source_id = source.source_id().to_string();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                result = tokio::time::timeout(timeout, source.filmography(person)) => Some(result),
            };
            let latency_ms = start.elapsed().as_millis() as u64;
            let unavailable = |reason| SourceUnavailable {
                source_id: source_id.clone(),
                reason,
                latency_ms,
            };
            match outcome {
                Some(Ok(Ok(mut list))) => {
                    debug!(source_id = %source_id, appearances = list.len(), latency_ms, "Filmography received");
                    for appearance in &mut list {
                        appearance.sources = BTreeSet::from([source_id.clone()]);
                    }
                    (source_id.clone(), SourceOutcome::Listed(list))
                }
                Some(Ok(Err(e))) => {
                    warn!(source_id = %source_id, error = %e, "Filmography source failed (per-source error isolation)");
                    let reason = UnavailableReason::Error(e.to_string());
                    (source_id.clone(), SourceOutcome::Unavailable(unavailable(reason)))
                }
                Some(Err(_)) => {
                    warn!(source_id = %source_id, latency_ms, "Filmography source timed out");
                    (source_id.clone(), SourceOutcome::Unavailable(unavailable(UnavailableReason::Timeout)))
                }
                None => (source_id.clone(), SourceOutcome::Unavailable(unavailable(UnavailableReason::Cancelled))),
            }
        });

        let mut lists = Vec::new();
        let mut responded = Vec::new();
        let mut unavailable = Vec::new();
        for (source_id, outcome) in join_all(calls).await {
            match outcome {
                SourceOutcome::Listed(list) => {
                    responded.push(source_id);
                    lists.push(list);
                }
                SourceOutcome::Unavailable(u) => unavailable.push(u),
            }
        }

        let mut appearances = self.merger.merge_sources(lists);
        classify_all(&mut appearances, person.birth_year);
        (appearances, responded, unavailable)
    }
}
