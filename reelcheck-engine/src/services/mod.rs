//! Entity resolution services
//!
//! Each service is a plain struct configured once from `EngineConfig` and shared
//! immutably. Services that talk to sources take the orchestrator by reference and a
//! cancellation token; everything else is a pure computation over in-memory rows.

pub mod appearance_merger;
pub mod discovery;
pub mod duplicate_detector;
pub mod entity_validator;
pub mod external_id_validator;
pub mod ghost_reattribution;
pub mod missing_detector;
pub mod role_classifier;

pub use appearance_merger::AppearanceMerger;
pub use discovery::{DiscoveryEngine, DiscoveryReport, FilmographySource, PersonQuery};
pub use duplicate_detector::DuplicateDetector;
pub use entity_validator::{EntityValidation, EntityValidator};
pub use external_id_validator::{
    ExternalIdKind, ExternalIdValidator, IdValidation, IdValidationAction, IdValidationStatus,
};
pub use ghost_reattribution::{GhostClaim, GhostEngine};
pub use missing_detector::MissingDetector;
pub use role_classifier::{classify_all, classify_role, RoleSignals};
