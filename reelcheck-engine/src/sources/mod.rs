//! Source registry, adapters and fan-out orchestration
//!
//! # Architecture
//! - **registry:** static descriptors (role, trust weight, capabilities), read-only
//! - **adapter:** the `SourceAdapter` contract each per-website scraper implements
//! - **orchestrator:** concurrent fan-out for one entity with per-source timeouts
//!   and an overall deadline
//! - **batch:** sequential batches with an inter-batch delay, bounded parallelism
//!   inside a batch, cancellation that keeps completed work
//!
//! Adapter failures never propagate past the orchestrator. They come back as
//! `SourceUnavailable` records alongside the values that did arrive.

pub mod adapter;
pub mod batch;
pub mod orchestrator;
pub mod registry;

pub use adapter::{PartialRecord, SourceAdapter};
pub use batch::{BatchReport, BatchRunner, ItemFailure};
pub use orchestrator::{Orchestrator, SourceResponse};
pub use registry::{IngestCandidates, SourceDescriptor, SourceRegistry, SourceRole};

use thiserror::Error;

/// Error returned by a source adapter
///
/// The orchestrator turns every one of these into a `SourceUnavailable` record.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Source answered with an error status
    #[error("API error: {0}")]
    Api(String),

    /// Response could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Source not reachable or not configured (missing key, disabled upstream)
    #[error("Source not available: {0}")]
    NotAvailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
