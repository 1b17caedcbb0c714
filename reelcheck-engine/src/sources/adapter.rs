//! Source adapter contract
//!
//! One implementation per website/API. Adapters return structured, typed values and
//! never panic or block past their own boundary; the orchestrator supplies the timeout
//! and turns errors into `SourceUnavailable` records.

use crate::sources::SourceError;
use crate::types::{EntityQuery, FieldValue};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Field name → value as reported by one source (`None` = source has no value)
pub type PartialRecord = BTreeMap<String, Option<FieldValue>>;

/// A queryable source of per-field facts
///
/// Trust weight, role and origin come from the registry entry with the same id,
/// never from the adapter itself.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Registry id of this source
    fn source_id(&self) -> &str;

    /// Fetch the requested fields for one entity
    ///
    /// # Returns
    /// * `Ok(Some(record))` - the source knows the entity (fields may still be `None`)
    /// * `Ok(None)` - the source does not know the entity
    /// * `Err(_)` - the source failed; reported as unavailable, never propagated
    async fn fetch(
        &self,
        query: &EntityQuery,
        fields: &[String],
    ) -> Result<Option<PartialRecord>, SourceError>;
}

// ============================================================================
// Mock Adapter for Testing
// ============================================================================
