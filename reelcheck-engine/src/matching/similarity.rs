//! Title and name similarity
//!
//! `similarity(a, b)` blends two signals over normalized text:
//! - edit similarity: `1 - levenshtein / max(len)` (character based)
//! - token overlap: `|tokens(a) ∩ tokens(b)| / max(|tokens(a)|, |tokens(b)|)`
//!
//! Token overlap dominates for titles of `long_title_words` or more words, edit
//! similarity for short titles. A token counts as shared when it is identical, or when
//! both tokens have at least `NEAR_TOKEN_MIN_LEN` characters and an edit similarity of
//! `near_token_threshold` or more ("bahubali" / "baahubali"). Short tokens such as
//! sequel numbers must match exactly.

use crate::matching::normalizer::{aggressive_normalize, main_title, normalize, NormalizedString};
use serde::Serialize;
use std::collections::BTreeSet;

/// Minimum token length for near-equal token matching
const NEAR_TOKEN_MIN_LEN: usize = 4;

/// Relationship between two titles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleRelation {
    /// Identical after normalization
    Exact,
    /// Identical once punctuation and spacing are removed
    SpacingVariant,
    /// One title is the other's main title plus a subtitle
    SubtitleVariant,
    /// Same word structure, each word a spelling variant of the other
    TransliterationVariant,
    Distinct,
}

/// Similarity scorer with tunable weights
#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    /// Titles with this many words or more weight token overlap higher
    long_title_words: usize,
    /// Edit similarity above which two long-enough tokens count as the same word
    near_token_threshold: f64,
    /// Weight of token overlap for long titles (edit similarity gets the rest)
    long_title_token_weight: f64,
    /// Weight of token overlap for short titles
    short_title_token_weight: f64,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self {
            long_title_words: 3,
            near_token_threshold: 0.80,
            long_title_token_weight: 0.65,
            short_title_token_weight: 0.30,
        }
    }
}

impl SimilarityScorer {
    pub fn new(long_title_words: usize, near_token_threshold: f64) -> Self {
        Self {
            long_title_words: long_title_words.max(1),
            near_token_threshold: near_token_threshold.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// Combined similarity of two raw strings, in [0, 1]
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        self.similarity_normalized(&normalize(a), &normalize(b))
    }

    /// Combined similarity of two already-normalized strings
    pub fn similarity_normalized(&self, a: &NormalizedString, b: &NormalizedString) -> f64 {
        if a == b {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let edit = edit_similarity(a.as_str(), b.as_str());
        let tokens_a: BTreeSet<&str> = a.tokens().collect();
        let tokens_b: BTreeSet<&str> = b.tokens().collect();
        let overlap = self.token_overlap_sets(&tokens_a, &tokens_b);

        let words = tokens_a.len().max(tokens_b.len());
        let token_weight = if words >= self.long_title_words {
            self.long_title_token_weight
        } else {
            self.short_title_token_weight
        };

        let score = token_weight * overlap + (1.0 - token_weight) * edit;
        score.clamp(0.0, 1.0)
    }

    /// Token overlap ratio of two raw strings
    pub fn token_overlap(&self, a: &str, b: &str) -> f64 {
        let a = normalize(a);
        let b = normalize(b);
        let tokens_a: BTreeSet<&str> = a.tokens().collect();
        let tokens_b: BTreeSet<&str> = b.tokens().collect();
        self.token_overlap_sets(&tokens_a, &tokens_b)
    }

    fn token_overlap_sets(&self, a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
        let denominator = a.len().max(b.len());
        if denominator == 0 {
            return 0.0;
        }
        // Greedy matching is direction dependent; taking the max keeps the score symmetric
        let shared = self.shared_tokens(a, b).max(self.shared_tokens(b, a));
        shared as f64 / denominator as f64
    }

    fn shared_tokens(&self, from: &BTreeSet<&str>, to: &BTreeSet<&str>) -> usize {
        let mut used: BTreeSet<&str> = from.intersection(to).copied().collect();
        let mut shared = used.len();

        for token in from.iter().filter(|t| !to.contains(*t)) {
            let candidate = to
                .iter()
                .filter(|other| !used.contains(*other))
                .find(|other| self.tokens_near(token, other));
            if let Some(other) = candidate {
                used.insert(other);
                shared += 1;
            }
        }
        shared
    }

    fn tokens_near(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        a.chars().count() >= NEAR_TOKEN_MIN_LEN
            && b.chars().count() >= NEAR_TOKEN_MIN_LEN
            && edit_similarity(a, b) >= self.near_token_threshold
    }

    /// Threshold test on combined similarity
    pub fn titles_match(&self, a: &str, b: &str, threshold: f64) -> bool {
        self.similarity(a, b) >= threshold
    }

    /// Classify why (or whether) two titles name the same film
    pub fn classify(&self, a: &str, b: &str) -> TitleRelation {
        let norm_a = normalize(a);
        let norm_b = normalize(b);
        if norm_a.is_empty() || norm_b.is_empty() {
            return TitleRelation::Distinct;
        }
        if norm_a == norm_b {
            return TitleRelation::Exact;
        }
        if aggressive_normalize(a) == aggressive_normalize(b) {
            return TitleRelation::SpacingVariant;
        }
        if is_subtitle_variant(a, &norm_a, b, &norm_b) {
            return TitleRelation::SubtitleVariant;
        }
        if self.is_transliteration(&norm_a, &norm_b) {
            return TitleRelation::TransliterationVariant;
        }
        TitleRelation::Distinct
    }

    /// Similarity reported for a classified pair
    ///
    /// Subtitle variants score by token containment (the shorter title is fully
    /// contained in the longer), everything else by combined similarity.
    pub fn relation_similarity(&self, a: &str, b: &str, relation: TitleRelation) -> f64 {
        match relation {
            TitleRelation::Exact | TitleRelation::SpacingVariant => 1.0,
            TitleRelation::SubtitleVariant => token_containment(&normalize(a), &normalize(b)),
            TitleRelation::TransliterationVariant | TitleRelation::Distinct => {
                self.similarity(a, b)
            }
        }
    }

    fn is_transliteration(&self, a: &NormalizedString, b: &NormalizedString) -> bool {
        let tokens_a: Vec<&str> = a.tokens().collect();
        let tokens_b: Vec<&str> = b.tokens().collect();
        tokens_a.len() == tokens_b.len()
            && tokens_a
                .iter()
                .zip(tokens_b.iter())
                .all(|(x, y)| self.tokens_near(x, y))
    }

    /// Person-name match: equal, same token set, or similar above threshold
    pub fn names_match(&self, a: &str, b: &str, threshold: f64) -> bool {
        let norm_a = normalize(a);
        let norm_b = normalize(b);
        if norm_a.is_empty() || norm_b.is_empty() {
            return false;
        }
        if norm_a == norm_b {
            return true;
        }
        let set_a: BTreeSet<&str> = norm_a.tokens().collect();
        let set_b: BTreeSet<&str> = norm_b.tokens().collect();
        set_a == set_b || self.similarity_normalized(&norm_a, &norm_b) >= threshold
    }
}

/// Character-level edit similarity in [0, 1]
pub fn edit_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - strsim::levenshtein(a, b) as f64 / max_len as f64
}

/// Share of the shorter title's tokens present in the longer title
fn token_containment(a: &NormalizedString, b: &NormalizedString) -> f64 {
    let tokens_a: BTreeSet<&str> = a.tokens().collect();
    let tokens_b: BTreeSet<&str> = b.tokens().collect();
    let smaller = tokens_a.len().min(tokens_b.len());
    if smaller == 0 {
        return 0.0;
    }
    tokens_a.intersection(&tokens_b).count() as f64 / smaller as f64
}

/// One side is the other's main title (only one side may carry a subtitle, so
/// "Baahubali: The Beginning" and "Baahubali: The Conclusion" stay distinct)
fn is_subtitle_variant(a: &str, norm_a: &NormalizedString, b: &str, norm_b: &NormalizedString) -> bool {
    let main_a = main_title(a);
    let main_b = main_title(b);
    match (main_a, main_b) {
        (Some(m), None) => &m == norm_b,
        (None, Some(m)) => &m == norm_a,
        _ => false,
    }
}

/// Year tolerance check
///
/// Unknown years are treated as compatible only with each other when `tolerance`
/// is zero (exact duplicate checks), and with anything otherwise.
pub fn years_within(a: Option<i32>, b: Option<i32>, tolerance: u32) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x.abs_diff(y) <= tolerance,
        (None, None) => true,
        _ => tolerance > 0,
    }
}
