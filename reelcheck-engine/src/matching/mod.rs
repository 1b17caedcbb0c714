//! Text canonicalisation and title/name similarity
//!
//! Every other component compares titles and names through this module:
//! - `normalizer`: casing, punctuation and whitespace canonicalisation
//! - `similarity`: edit-distance + token-overlap scoring and title-pair classification

pub mod normalizer;
pub mod similarity;

pub use normalizer::{aggressive_normalize, main_title, normalize, NormalizedString};
pub use similarity::{years_within, SimilarityScorer, TitleRelation};
