//! Discovered appearance merging
//!
//! Observations of the same (normalized title, year) from different sources collapse
//! into one appearance. Every merged attribute is chosen by an order-independent rule
//! (set union, max, min), and confidence is recomputed from the final source count
//! rather than accumulated, so merging is commutative, associative and idempotent.

use crate::config::DiscoveryConfig;
use crate::matching::normalize;
use crate::types::DiscoveredAppearance;
use std::collections::BTreeMap;
use tracing::debug;

/// Merge key: normalized title and year
pub fn merge_key(appearance: &DiscoveredAppearance) -> (String, Option<i32>) {
    (normalize(&appearance.title).into_string(), appearance.year)
}

/// Merges per-source appearance lists
#[derive(Debug, Clone, Default)]
pub struct AppearanceMerger {
    config: DiscoveryConfig,
}

impl AppearanceMerger {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Merge any number of per-source lists into one list, sorted by (year, title)
    pub fn merge_sources<I>(&self, lists: I) -> Vec<DiscoveredAppearance>
    where
        I: IntoIterator<Item = Vec<DiscoveredAppearance>>,
    {
        let mut merged: BTreeMap<(String, Option<i32>), DiscoveredAppearance> = BTreeMap::new();
        let mut observations = 0usize;

        for appearance in lists.into_iter().flatten() {
            observations += 1;
            let key = merge_key(&appearance);
            match merged.remove(&key) {
                Some(existing) => {
                    merged.insert(key, combine(existing, appearance));
                }
                None => {
                    merged.insert(key, appearance);
                }
            }
        }

        let result: Vec<DiscoveredAppearance> = merged
            .into_iter()
            .map(|(_, mut appearance)| {
                appearance.confidence = self.config.confidence_for(appearance.sources.len());
                // Classification is derived from the merged record, never carried over
                appearance.classification = None;
                appearance
            })
            .collect();

        debug!(
            observations,
            merged = result.len(),
            "Appearance lists merged"
        );
        result
    }
}

/// Order-independent combination of two observations with the same key
fn combine(a: DiscoveredAppearance, b: DiscoveredAppearance) -> DiscoveredAppearance {
    let mut sources = a.sources;
    sources.extend(b.sources);

    let mut external_ids = a.external_ids;
    external_ids.tmdb = external_ids.tmdb.max(b.external_ids.tmdb);
    external_ids.imdb = external_ids.imdb.max(b.external_ids.imdb);

    DiscoveredAppearance {
        title: longest(a.title, b.title),
        year: a.year,
        role: match (a.role, b.role) {
            (Some(x), Some(y)) => Some(longest(x, y)),
            (x, y) => x.or(y),
        },
        billing_order: match (a.billing_order, b.billing_order) {
            (Some(x), Some(y)) => Some(x.min(y)),
            (x, y) => x.or(y),
        },
        sources,
        confidence: a.confidence.max(b.confidence),
        external_ids,
        classification: None,
    }
}

/// Longer string wins; lexical order breaks ties
fn longest(a: String, b: String) -> String {
    if (b.chars().count(), &b) > (a.chars().count(), &a) {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merger() -> AppearanceMerger {
        AppearanceMerger::default()
    }

    #[test]
    fn test_confidence_recomputed_from_source_count() {
        let first = merger().merge_sources(vec![vec![DiscoveredAppearance::new("Eega", Some(2012), "wiki")]]);
        assert_eq!(first[0].confidence, 0.50);

        let second = merger().merge_sources(vec![
            first,
            vec![DiscoveredAppearance::new("EEGA", Some(2012), "tmdb")],
        ]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].confidence, 0.75);
        assert_eq!(second[0].sources.len(), 2);
    }

    #[test]
    fn test_three_sources_cap() {
        let lists = ["a", "b", "c", "d"]
            .iter()
            .map(|s| vec![DiscoveredAppearance::new("Eega", Some(2012), *s)])
            .collect::<Vec<_>>();
        let merged = merger().merge_sources(lists);
        assert_eq!(merged[0].confidence, 0.95);
    }

    #[test]
    fn test_different_years_stay_separate() {
        let merged = merger().merge_sources(vec![vec![
            DiscoveredAppearance::new("Kick", Some(2009), "a"),
            DiscoveredAppearance::new("Kick", Some(2015), "a"),
        ]]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = DiscoveredAppearance::new("Magadheera", Some(2009), "a")
            .with_role("Harsha")
            .with_billing_order(2);
        let b = DiscoveredAppearance::new("Magadheera", Some(2009), "b")
            .with_role("Kala Bhairava / Harsha")
            .with_billing_order(1);
        let ab = merger().merge_sources(vec![vec![a.clone()], vec![b.clone()]]);
        let ba = merger().merge_sources(vec![vec![b], vec![a]]);
        assert_eq!(ab, ba);
        assert_eq!(ab[0].billing_order, Some(1));
        assert_eq!(ab[0].role.as_deref(), Some("Kala Bhairava / Harsha"));
    }

    #[test]
    fn test_merge_idempotent() {
        let list = vec![
            DiscoveredAppearance::new("Eega", Some(2012), "a"),
            DiscoveredAppearance::new("Eega", Some(2012), "b"),
        ];
        let once = merger().merge_sources(vec![list.clone()]);
        let twice = merger().merge_sources(vec![once.clone(), list]);
        assert_eq!(once, twice);
    }
}
