//! Missing-record detection
//!
//! An appearance is missing when no catalog row matches it. A row matches when it
//! shares an external id, or when its year is within the discovery tolerance and its
//! title (or alternate title) is similar above the discovery threshold or is a
//! subtitle variant of the discovered title.
//!
//! Catalog rows are indexed by year so each appearance is only compared with rows in
//! its year window.

use crate::config::MatchingConfig;
use crate::matching::{years_within, SimilarityScorer, TitleRelation};
use crate::types::{DiscoveredAppearance, EntitySummary};
use std::collections::BTreeMap;
use tracing::debug;

pub struct MissingDetector {
    scorer: SimilarityScorer,
    threshold: f64,
    year_tolerance: u32,
}

impl Default for MissingDetector {
    fn default() -> Self {
        Self::new(&MatchingConfig::default())
    }
}

impl MissingDetector {
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            scorer: config.scorer(),
            threshold: config.discovery_threshold,
            year_tolerance: config.discovery_year_tolerance,
        }
    }

    /// Appearances with no matching catalog row, in input order
    pub fn find_missing(
        &self,
        discovered: &[DiscoveredAppearance],
        existing: &[EntitySummary],
    ) -> Vec<DiscoveredAppearance> {
        let index = YearIndex::new(existing);
        let missing: Vec<DiscoveredAppearance> = discovered
            .iter()
            .filter(|appearance| self.find_match_in(appearance, &index).is_none())
            .cloned()
            .collect();

        debug!(
            discovered = discovered.len(),
            existing = existing.len(),
            missing = missing.len(),
            "Missing-record scan complete"
        );
        missing
    }

    /// First catalog row that matches the appearance
    pub fn find_match<'a>(
        &self,
        appearance: &DiscoveredAppearance,
        existing: &'a [EntitySummary],
    ) -> Option<&'a EntitySummary> {
        existing.iter().find(|row| self.matches(appearance, row))
    }

    fn find_match_in<'a>(
        &self,
        appearance: &DiscoveredAppearance,
        index: &YearIndex<'a>,
    ) -> Option<&'a EntitySummary> {
        // External ids match regardless of year
        if let Some(row) = index.all().find(|row| ids_match(appearance, row)) {
            return Some(row);
        }
        index
            .window(appearance.year, self.year_tolerance)
            .find(|row| self.titles_match(appearance, row))
    }

    /// Whether one catalog row describes the appearance
    pub fn matches(&self, appearance: &DiscoveredAppearance, row: &EntitySummary) -> bool {
        ids_match(appearance, row) || self.titles_match(appearance, row)
    }

    fn titles_match(&self, appearance: &DiscoveredAppearance, row: &EntitySummary) -> bool {
        if !years_within(appearance.year, row.year, self.year_tolerance) {
            return false;
        }
        std::iter::once(row.title.as_str())
            .chain(row.alt_title.as_deref())
            .any(|title| self.title_matches(&appearance.title, title))
    }

    fn title_matches(&self, a: &str, b: &str) -> bool {
        self.scorer.similarity(a, b) >= self.threshold
            || self.scorer.classify(a, b) == TitleRelation::SubtitleVariant
    }
}

fn ids_match(appearance: &DiscoveredAppearance, row: &EntitySummary) -> bool {
    let ours = &appearance.external_ids;
    let theirs = &row.external_ids;
    matches!((ours.tmdb, theirs.tmdb), (Some(a), Some(b)) if a == b)
        || matches!((&ours.imdb, &theirs.imdb), (Some(a), Some(b)) if a.eq_ignore_ascii_case(b))
}

/// Catalog rows grouped by release year
struct YearIndex<'a> {
    by_year: BTreeMap<i32, Vec<&'a EntitySummary>>,
    undated: Vec<&'a EntitySummary>,
}

impl<'a> YearIndex<'a> {
    fn new(rows: &'a [EntitySummary]) -> Self {
        let mut by_year: BTreeMap<i32, Vec<&'a EntitySummary>> = BTreeMap::new();
        let mut undated = Vec::new();
        for row in rows {
            match row.year {
                Some(year) => by_year.entry(year).or_default().push(row),
                None => undated.push(row),
            }
        }
        Self { by_year, undated }
    }

    fn all(&self) -> impl Iterator<Item = &'a EntitySummary> + '_ {
        self.by_year
            .values()
            .flatten()
            .chain(self.undated.iter())
            .copied()
    }

    /// Rows whose year could be within `tolerance` of `year`
    fn window(&self, year: Option<i32>, tolerance: u32) -> Box<dyn Iterator<Item = &'a EntitySummary> + '_> {
        match year {
            Some(year) => {
                let low = year.saturating_sub_unsigned(tolerance);
                let high = year.saturating_add_unsigned(tolerance);
                Box::new(
                    self.by_year
                        .range(low..=high)
                        .flat_map(|(_, rows)| rows.iter())
                        .chain(self.undated.iter())
                        .copied(),
                )
            }
            None => Box::new(self.all()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn row(title: &str, year: Option<i32>) -> EntitySummary {
        EntitySummary::new(Uuid::new_v4(), title, year)
    }

    fn appearance(title: &str, year: Option<i32>) -> DiscoveredAppearance {
        DiscoveredAppearance::new(title, year, "wiki")
    }

    #[test]
    fn test_exact_title_present() {
        let existing = vec![row("Magadheera", Some(2009))];
        let missing = MissingDetector::default().find_missing(&[appearance("Magadheera", Some(2009))], &existing);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_year_off_by_one_still_matches() {
        let existing = vec![row("Baahubali", Some(2015))];
        let missing = MissingDetector::default().find_missing(&[appearance("Bahubali", Some(2016))], &existing);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_year_off_by_two_is_missing() {
        let existing = vec![row("Baahubali", Some(2015))];
        let missing = MissingDetector::default().find_missing(&[appearance("Baahubali", Some(2017))], &existing);
        assert_eq!(missing.len(), 1);
    }

    #[test]
    fn test_alt_title_and_subtitle_match() {
        let mut with_alt = row("Sye Raa Narasimha Reddy", Some(2019));
        with_alt.alt_title = Some("Sye Raa".to_string());
        let existing = vec![with_alt, row("RRR: Rise Roar Revolt", Some(2022))];
        let detector = MissingDetector::default();
        let found = [appearance("Sye Raa", Some(2019)), appearance("RRR", Some(2022))];
        assert!(detector.find_missing(&found, &existing).is_empty());
    }

    #[test]
    fn test_external_id_match_ignores_title() {
        let mut existing = row("Baahubali: The Beginning", Some(2015));
        existing.external_ids.tmdb = Some(256040);
        let mut found = appearance("Bahubali Part 1", Some(2015));
        found.external_ids.tmdb = Some(256040);
        assert!(MissingDetector::default().find_missing(&[found], &[existing]).is_empty());
    }

    #[test]
    fn test_distinct_film_is_missing() {
        let existing = vec![row("Eega", Some(2012)), row("Magadheera", Some(2009))];
        let missing = MissingDetector::default().find_missing(
            &[appearance("Eega", Some(2012)), appearance("Chatrapathi", Some(2005))],
            &existing,
        );
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].title, "Chatrapathi");
    }

    #[test]
    fn test_find_match_returns_row() {
        let existing = vec![row("Eega", Some(2012))];
        let detector = MissingDetector::default();
        let matched = detector.find_match(&appearance("EEGA", Some(2012)), &existing);
        assert_eq!(matched.map(|r| r.id), Some(existing[0].id));
    }

    #[test]
    fn test_extreme_years_do_not_overflow() {
        let existing = vec![row("Eega", Some(2012)), row("Eega", Some(i32::MAX)), row("Eega", Some(i32::MIN))];
        let detector = MissingDetector::default();

        let high = appearance("Eega", Some(i32::MAX));
        assert_eq!(detector.find_match(&high, &existing).map(|r| r.year), Some(Some(i32::MAX)));
        let low = appearance("Eega", Some(i32::MIN));
        assert!(detector.find_missing(&[low], &existing).is_empty());

        let missing = detector.find_missing(&[appearance("Eega", Some(i32::MAX - 5))], &existing[..1]);
        assert_eq!(missing.len(), 1);
    }
}
