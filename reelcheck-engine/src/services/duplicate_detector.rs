//! Duplicate detection over catalog rows
//!
//! # Exact pass
//! Rows are grouped independently by each natural key (tmdb id, imdb id, normalized
//! title + year, slug). Every pair inside a group with more than one row is an exact
//! duplicate (`confidence = 1.0`, `merge_recommended`). A pair found under several
//! keys is reported once, under its strongest key.
//!
//! # Fuzzy pass
//! Rows not exact-matched are bucketed by year and compared pairwise within the year
//! tolerance. With a non-zero tolerance, undated rows are compared against every dated
//! bucket as well (a missing year is compatible with any year). Year buckets larger
//! than `first_token_bucket_threshold` are split by the first normalized title token
//! first. Each pair is classified:
//!
//! | Match type | Similarity | Confidence | Action |
//! |---|---|---|---|
//! | spacing_variant | 1.0 | 0.95 | merge_recommended |
//! | alternate_title | 1.0 | 0.90 | manual_review |
//! | subtitle_variant | token containment | 0.85 | manual_review |
//! | transliteration_variant | combined | min(similarity, 0.95) | manual_review |
//! | similar_title | combined | min(similarity, 0.95) | manual_review |
//!
//! Only punctuation/spacing differences are considered safe to merge automatically.

use crate::config::MatchingConfig;
use crate::error::EngineResult;
use crate::matching::{aggressive_normalize, normalize, SimilarityScorer, TitleRelation};
use crate::types::{DuplicateAction, DuplicateMatch, DuplicateReport, EntityId, EntitySummary, MatchType};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

const SPACING_VARIANT_CONFIDENCE: f64 = 0.95;
const ALTERNATE_TITLE_CONFIDENCE: f64 = 0.90;
const SUBTITLE_VARIANT_CONFIDENCE: f64 = 0.85;
const FUZZY_CONFIDENCE_CAP: f64 = 0.95;

type Pair<'a> = (&'a EntitySummary, &'a EntitySummary);

pub struct DuplicateDetector {
    scorer: SimilarityScorer,
    threshold: f64,
    year_tolerance: u32,
    bucket_threshold: usize,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(&MatchingConfig::default())
    }
}

impl DuplicateDetector {
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            scorer: config.scorer(),
            threshold: config.duplicate_threshold,
            year_tolerance: config.duplicate_year_tolerance,
            bucket_threshold: config.first_token_bucket_threshold.max(1),
        }
    }

    /// Run both passes
    pub fn detect_all(&self, entities: &[EntitySummary]) -> EngineResult<DuplicateReport> {
        let exact = self.detect_exact(entities)?;
        let matched: BTreeSet<EntityId> = exact
            .iter()
            .flat_map(|m| [m.id_a(), m.id_b()])
            .collect();
        let fuzzy = self.detect_fuzzy(entities, &matched)?;

        info!(
            entities = entities.len(),
            exact = exact.len(),
            fuzzy = fuzzy.len(),
            "Duplicate scan complete"
        );
        Ok(DuplicateReport { exact, fuzzy })
    }

    /// Shared natural keys
    pub fn detect_exact(&self, entities: &[EntitySummary]) -> EngineResult<Vec<DuplicateMatch>> {
        let mut groups: BTreeMap<(MatchType, String), BTreeSet<EntityId>> = BTreeMap::new();
        for entity in entities {
            for key in natural_keys(entity) {
                groups.entry(key).or_default().insert(entity.id);
            }
        }

        // pair → (strongest match type, every key it matched on)
        let mut pairs: BTreeMap<(EntityId, EntityId), (MatchType, Vec<String>)> = BTreeMap::new();
        for ((match_type, value), ids) in &groups {
            if ids.len() < 2 {
                continue;
            }
            let ids: Vec<EntityId> = ids.iter().copied().collect();
            for (i, first) in ids.iter().enumerate() {
                for second in &ids[i + 1..] {
                    let entry = pairs
                        .entry((*first, *second))
                        .or_insert((*match_type, Vec::new()));
                    entry.0 = entry.0.min(*match_type);
                    entry.1.push(format!("{}={}", key_label(*match_type), value));
                }
            }
        }

        pairs
            .into_iter()
            .map(|((a, b), (match_type, matched_on))| {
                DuplicateMatch::new(
                    a,
                    b,
                    match_type,
                    matched_on.join("; "),
                    1.0,
                    1.0,
                    DuplicateAction::MergeRecommended,
                )
            })
            .collect()
    }

    /// Similar titles within the year tolerance, skipping `exclude`
    pub fn detect_fuzzy(
        &self,
        entities: &[EntitySummary],
        exclude: &BTreeSet<EntityId>,
    ) -> EngineResult<Vec<DuplicateMatch>> {
        let mut seen = BTreeSet::new();
        let candidates: Vec<&EntitySummary> = entities
            .iter()
            .filter(|e| !exclude.contains(&e.id) && seen.insert(e.id))
            .collect();

        let pairs = self.candidate_pairs(&candidates);
        debug!(
            candidates = candidates.len(),
            comparisons = pairs.len(),
            "Fuzzy duplicate pass"
        );

        let mut matches = Vec::new();
        for (a, b) in pairs {
            if let Some(found) = self.compare(a, b)? {
                matches.push(found);
            }
        }
        matches.sort_by_key(|m| m.pair());
        Ok(matches)
    }

    /// Classify one pair; `None` when the rows do not look like the same film
    pub fn compare(&self, a: &EntitySummary, b: &EntitySummary) -> EngineResult<Option<DuplicateMatch>> {
        if a.id == b.id {
            return Ok(None);
        }
        let relation = self.scorer.classify(&a.title, &b.title);
        let matched_on = format!("{} ~ {}", a.title, b.title);

        let (match_type, similarity, confidence, action) = match relation {
            TitleRelation::SpacingVariant => (
                MatchType::SpacingVariant,
                1.0,
                SPACING_VARIANT_CONFIDENCE,
                DuplicateAction::MergeRecommended,
            ),
            _ if alternate_titles_meet(a, b) => (
                MatchType::AlternateTitle,
                1.0,
                ALTERNATE_TITLE_CONFIDENCE,
                DuplicateAction::ManualReview,
            ),
            TitleRelation::SubtitleVariant => {
                let similarity = self.scorer.relation_similarity(&a.title, &b.title, relation);
                if similarity < self.threshold {
                    return Ok(None);
                }
                (
                    MatchType::SubtitleVariant,
                    similarity,
                    SUBTITLE_VARIANT_CONFIDENCE,
                    DuplicateAction::ManualReview,
                )
            }
            TitleRelation::TransliterationVariant | TitleRelation::Exact | TitleRelation::Distinct => {
                let similarity = self.scorer.relation_similarity(&a.title, &b.title, relation);
                if similarity < self.threshold {
                    return Ok(None);
                }
                let match_type = if relation == TitleRelation::TransliterationVariant {
                    MatchType::TransliterationVariant
                } else {
                    MatchType::SimilarTitle
                };
                (
                    match_type,
                    similarity,
                    similarity.min(FUZZY_CONFIDENCE_CAP),
                    DuplicateAction::ManualReview,
                )
            }
        };

        DuplicateMatch::new(a.id, b.id, match_type, matched_on, similarity, confidence, action).map(Some)
    }

    /// Pairs worth comparing: same year bucket, or buckets within the tolerance
    fn candidate_pairs<'a>(&self, rows: &[&'a EntitySummary]) -> Vec<Pair<'a>> {
        let mut dated: BTreeMap<i32, Vec<&'a EntitySummary>> = BTreeMap::new();
        let mut undated: Vec<&'a EntitySummary> = Vec::new();
        for row in rows {
            match row.year {
                Some(year) => dated.entry(year).or_default().push(*row),
                None => undated.push(*row),
            }
        }

        let mut pairs = Vec::new();
        self.pairs_within(&undated, &mut pairs);
        for (&year, bucket) in &dated {
            self.pairs_within(bucket, &mut pairs);
            let upper = year.saturating_add_unsigned(self.year_tolerance);
            if upper > year {
                for (_, other) in dated.range(year + 1..=upper) {
                    self.pairs_across(bucket, other, &mut pairs);
                }
            }
            if self.year_tolerance > 0 && !undated.is_empty() {
                self.pairs_across(&undated, bucket, &mut pairs);
            }
        }
        pairs
    }

    fn pairs_within<'a>(&self, bucket: &[&'a EntitySummary], out: &mut Vec<Pair<'a>>) {
        if bucket.len() > self.bucket_threshold {
            for sub in first_token_buckets(bucket).values() {
                all_pairs(sub, out);
            }
        } else {
            all_pairs(bucket, out);
        }
    }

    fn pairs_across<'a>(&self, left: &[&'a EntitySummary], right: &[&'a EntitySummary], out: &mut Vec<Pair<'a>>) {
        if left.len() + right.len() > self.bucket_threshold {
            let right_tokens = first_token_buckets(right);
            for (token, sub) in first_token_buckets(left) {
                if let Some(others) = right_tokens.get(&token) {
                    cross_pairs(&sub, others, out);
                }
            }
        } else {
            cross_pairs(left, right, out);
        }
    }
}

fn all_pairs<'a>(rows: &[&'a EntitySummary], out: &mut Vec<Pair<'a>>) {
    for (i, a) in rows.iter().enumerate() {
        for b in &rows[i + 1..] {
            out.push((*a, *b));
        }
    }
}

fn cross_pairs<'a>(left: &[&'a EntitySummary], right: &[&'a EntitySummary], out: &mut Vec<Pair<'a>>) {
    for a in left {
        for b in right {
            out.push((*a, *b));
        }
    }
}

fn first_token_buckets<'a>(rows: &[&'a EntitySummary]) -> BTreeMap<String, Vec<&'a EntitySummary>> {
    let mut buckets: BTreeMap<String, Vec<&'a EntitySummary>> = BTreeMap::new();
    for row in rows {
        let normalized = normalize(&row.title);
        let token = normalized.first_token().unwrap_or_default().to_string();
        buckets.entry(token).or_default().push(*row);
    }
    buckets
}

/// Natural keys of one row (absent or blank keys are skipped)
fn natural_keys(entity: &EntitySummary) -> Vec<(MatchType, String)> {
    let mut keys = Vec::new();
    if let Some(tmdb) = entity.external_ids.tmdb {
        keys.push((MatchType::TmdbId, tmdb.to_string()));
    }
    if let Some(imdb) = entity.external_ids.imdb.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        keys.push((MatchType::ImdbId, imdb.to_ascii_lowercase()));
    }
    let title = normalize(&entity.title);
    if !title.is_empty() {
        let year = entity.year.map_or_else(|| "?".to_string(), |y| y.to_string());
        keys.push((MatchType::NormalizedTitleYear, format!("{}|{}", title, year)));
    }
    let slug = entity.slug.trim();
    if !slug.is_empty() {
        keys.push((MatchType::Slug, slug.to_ascii_lowercase()));
    }
    keys
}

fn key_label(match_type: MatchType) -> &'static str {
    match match_type {
        MatchType::TmdbId => "tmdb",
        MatchType::ImdbId => "imdb",
        MatchType::NormalizedTitleYear => "title+year",
        MatchType::Slug => "slug",
        _ => "title",
    }
}

/// One row's alternate title names the other row's title (or alternate title)
fn alternate_titles_meet(a: &EntitySummary, b: &EntitySummary) -> bool {
    let names = |e: &EntitySummary| -> Vec<String> {
        std::iter::once(e.title.as_str())
            .chain(e.alt_title.as_deref())
            .map(aggressive_normalize)
            .filter(|s| !s.is_empty())
            .collect()
    };
    let a_alt = a.alt_title.as_deref().map(aggressive_normalize).filter(|s| !s.is_empty());
    let b_alt = b.alt_title.as_deref().map(aggressive_normalize).filter(|s| !s.is_empty());
    a_alt.map_or(false, |alt| names(b).contains(&alt)) || b_alt.map_or(false, |alt| names(a).contains(&alt))
}
