//! Test Helper Utilities
//!
//! Shared fixtures for reelcheck-engine integration tests: scripted source adapters,
//! fixed filmography sources, record builders and small combinatorics.

#![allow(dead_code)]

use async_trait::async_trait;
use reelcheck_common::config::LoggingConfig;
use reelcheck_engine::services::{FilmographySource, PersonQuery};
use reelcheck_engine::sources::{
    PartialRecord, SourceAdapter, SourceDescriptor, SourceError, SourceRegistry, SourceRole,
};
use reelcheck_engine::types::{DiscoveredAppearance, EntityQuery, FieldValue, SourceRecord};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Fields every test registry declares
pub const FIELDS: [&str; 6] = ["title", "year", "director", "hero", "heroine", "cast"];

/// Install a subscriber once; later calls are no-ops
pub fn init_test_logging() {
    let _ = reelcheck_common::logging::init_tracing(&LoggingConfig {
        level: "debug".to_string(),
        json: false,
    });
}

pub fn text(value: &str) -> FieldValue {
    FieldValue::Text(value.to_string())
}

pub fn record(source: &str, field: &str, value: &str, weight: f64) -> SourceRecord {
    SourceRecord::new(source, field, Some(text(value)), weight)
}

pub fn descriptor(id: &str, role: SourceRole, weight: f64) -> SourceDescriptor {
    SourceDescriptor::new(id, role, weight).with_capabilities(FIELDS)
}

pub fn registry(descriptors: Vec<SourceDescriptor>) -> SourceRegistry {
    SourceRegistry::new(descriptors).expect("valid test registry")
}

/// Adapter answering per entity key from a script
pub struct ScriptedAdapter {
    id: String,
    answers: BTreeMap<String, PartialRecord>,
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            answers: BTreeMap::new(),
            delay: Duration::ZERO,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn answer(mut self, key: &str, field: &str, value: FieldValue) -> Self {
        self.answers
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), Some(value));
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, query: &EntityQuery, fields: &[String]) -> Result<Option<PartialRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(SourceError::Api("HTTP 503".to_string()));
        }
        Ok(self.answers.get(&query.key).map(|partial| {
            partial
                .iter()
                .filter(|(field, _)| fields.contains(field))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect()
        }))
    }
}

/// Filmography source returning a fixed list
pub struct FixedFilmography {
    id: String,
    appearances: Vec<DiscoveredAppearance>,
}

impl FixedFilmography {
    pub fn new(id: &str, appearances: Vec<DiscoveredAppearance>) -> Self {
        Self {
            id: id.to_string(),
            appearances,
        }
    }
}

#[async_trait]
impl FilmographySource for FixedFilmography {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn filmography(&self, _person: &PersonQuery) -> Result<Vec<DiscoveredAppearance>, SourceError> {
        Ok(self.appearances.clone())
    }
}

/// Every ordering of `items`
pub fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}
