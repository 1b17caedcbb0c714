//! Error types for reelcheck-engine
//!
//! Source failures, missing data and conflicting evidence are reported as data in
//! result structures. The variants here cover the remaining failures: programming
//! errors (invariant violations), bad configuration and catalog access.

use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// A result that should be impossible by construction (aborts one entity only)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Adapter or descriptor refers to a source the registry does not know
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Catalog (datastore) read failed
    #[error("Catalog error: {0}")]
    Catalog(#[from] sqlx::Error),

    /// reelcheck-common error
    #[error("Common error: {0}")]
    Common(#[from] reelcheck_common::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
