//! Multi-source orchestrator
//!
//! Fans one entity query out to every enabled, capable source concurrently.
//!
//! # Timing
//! - Each source gets its own timeout (descriptor override or the configured default),
//!   so a slow source never delays the others.
//! - The whole fan-out is bounded by an overall deadline; a source still running at
//!   the deadline is a non-response, not an error.
//! - A source's quota (`rate_limit_per_second`) is waited on inside its own timeout.
//! - Cancelling the token abandons every in-flight adapter call for the query.
//!
//! Record order in the response follows registry order (baseline first) but callers
//! must not rely on it.

use crate::config::OrchestratorConfig;
use crate::error::{EngineError, EngineResult};
use crate::sources::{PartialRecord, SourceAdapter, SourceDescriptor, SourceError, SourceRegistry};
use crate::types::{EntityQuery, SourceId, SourceRecord, SourceUnavailable, UnavailableReason};
use chrono::Utc;
use futures::future::join_all;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

struct RegisteredAdapter {
    adapter: Arc<dyn SourceAdapter>,
    limiter: Option<DirectLimiter>,
}

/// Everything that came back for one entity query
#[derive(Debug, Clone, Default)]
pub struct SourceResponse {
    pub records: Vec<SourceRecord>,
    pub unavailable: Vec<SourceUnavailable>,
    /// Sources that answered (including "entity unknown" answers)
    pub responded: Vec<SourceId>,
}

enum FetchOutcome {
    Answered(Result<Option<PartialRecord>, SourceError>),
    TimedOut,
    Cancelled,
}

/// Concurrent source fan-out for one entity at a time
pub struct Orchestrator {
    registry: Arc<SourceRegistry>,
    adapters: BTreeMap<SourceId, RegisteredAdapter>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(registry: Arc<SourceRegistry>, config: OrchestratorConfig) -> Self {
        Self {
            registry,
            adapters: BTreeMap::new(),
            config,
        }
    }

    /// Attach the adapter for a registered source
    ///
    /// Fails if the registry has no descriptor for the adapter's id, or if an adapter
    /// for that id is already attached.
    pub fn register_adapter(&mut self, adapter: Arc<dyn SourceAdapter>) -> EngineResult<()> {
        let source_id = adapter.source_id().to_string();
        let descriptor = self
            .registry
            .get(&source_id)
            .ok_or_else(|| EngineError::UnknownSource(source_id.clone()))?;
        if self.adapters.contains_key(&source_id) {
            return Err(EngineError::Config(format!(
                "adapter already registered for source {}",
                source_id
            )));
        }

        let limiter = descriptor
            .rate_limit_per_second
            .and_then(NonZeroU32::new)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));

        debug!(
            source_id = %source_id,
            rate_limited = limiter.is_some(),
            "Adapter registered"
        );
        self.adapters
            .insert(source_id, RegisteredAdapter { adapter, limiter });
        Ok(())
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// Query all applicable sources for `fields`
    pub async fn query(&self, query: &EntityQuery, fields: &[String]) -> SourceResponse {
        self.query_cancellable(query, fields, &CancellationToken::new())
            .await
    }

    /// Query all applicable sources, abandoning in-flight calls when `cancel` fires
    pub async fn query_cancellable(
        &self,
        query: &EntityQuery,
        fields: &[String],
        cancel: &CancellationToken,
    ) -> SourceResponse {
        let deadline = Instant::now() + self.config.deadline();

        let targets: Vec<(&SourceDescriptor, &RegisteredAdapter)> = self
            .registry
            .applicable(fields)
            .into_iter()
            .filter_map(|descriptor| match self.adapters.get(&descriptor.id) {
                Some(registered) => Some((descriptor, registered)),
                None => {
                    debug!(source_id = %descriptor.id, "No adapter attached, skipping source");
                    None
                }
            })
            .collect();

        let tasks = targets.into_iter().map(|(descriptor, registered)| {
            let requested: Vec<String> = fields
                .iter()
                .filter(|f| descriptor.capabilities.contains(*f))
                .cloned()
                .collect();
            let timeout = descriptor
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| self.config.source_timeout());

            async move {
                let started = Instant::now();
                let source_deadline = (started + timeout).min(deadline);
                let fetch = async {
                    if let Some(limiter) = &registered.limiter {
                        limiter.until_ready().await;
                    }
                    registered.adapter.fetch(query, &requested).await
                };

                let outcome = tokio::select! {
                    _ = cancel.cancelled() => FetchOutcome::Cancelled,
                    result = tokio::time::timeout_at(source_deadline, fetch) => match result {
                        Ok(answer) => FetchOutcome::Answered(answer),
                        Err(_) => FetchOutcome::TimedOut,
                    },
                };
                let latency_ms = started.elapsed().as_millis() as u64;
                (descriptor, requested, outcome, latency_ms)
            }
        });

        let outcomes = join_all(tasks).await;

        let mut response = SourceResponse::default();
        for (descriptor, requested, outcome, latency_ms) in outcomes {
            match outcome {
                FetchOutcome::Answered(Ok(partial)) => {
                    let fetched_at = Utc::now();
                    for (field_name, value) in partial.unwrap_or_default() {
                        if !requested.contains(&field_name) {
                            continue;
                        }
                        response.records.push(SourceRecord {
                            source_id: descriptor.id.clone(),
                            origin: descriptor.origin().to_string(),
                            field_name,
                            value,
                            fetched_at,
                            latency_ms,
                            trust_weight: descriptor.trust_weight,
                        });
                    }
                    response.responded.push(descriptor.id.clone());
                }
                FetchOutcome::Answered(Err(e)) => {
                    warn!(
                        source_id = %descriptor.id,
                        entity = %query.key,
                        error = %e,
                        latency_ms,
                        "Source failed (per-source error isolation)"
                    );
                    response.unavailable.push(SourceUnavailable {
                        source_id: descriptor.id.clone(),
                        reason: UnavailableReason::Error(e.to_string()),
                        latency_ms,
                    });
                }
                FetchOutcome::TimedOut => {
                    warn!(
                        source_id = %descriptor.id,
                        entity = %query.key,
                        latency_ms,
                        "Source timed out"
                    );
                    response.unavailable.push(SourceUnavailable {
                        source_id: descriptor.id.clone(),
                        reason: UnavailableReason::Timeout,
                        latency_ms,
                    });
                }
                FetchOutcome::Cancelled => {
                    response.unavailable.push(SourceUnavailable {
                        source_id: descriptor.id.clone(),
                        reason: UnavailableReason::Cancelled,
                        latency_ms,
                    });
                }
            }
        }

        if cancel.is_cancelled() {
            info!(entity = %query.key, "Source query cancelled");
        }
        debug!(
            entity = %query.key,
            records = response.records.len(),
            responded = response.responded.len(),
            unavailable = response.unavailable.len(),
            "Source fan-out complete"
        );
        response
    }
}
