//! Catalog read contract
//!
//! The engine only ever reads catalog rows. Writes (merges, re-attributions, new
//! records) belong to the caller once a human or an auto-apply policy has decided.

pub mod sqlite;

pub use sqlite::{init_schema, SqliteCatalog};

use crate::error::EngineResult;
use crate::matching::normalize;
use crate::types::{EntityId, EntitySummary};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Row filter; every set field must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFilter {
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    /// Case-insensitive prefix of the title
    pub title_prefix: Option<String>,
    /// Person credited in any role (normalized comparison)
    pub person: Option<String>,
    /// Keep rows without a year when a year bound is set
    #[serde(default)]
    pub include_undated: bool,
}

impl CatalogFilter {
    pub fn years(from: i32, to: i32) -> Self {
        Self {
            year_from: Some(from),
            year_to: Some(to),
            ..Self::default()
        }
    }

    pub fn matches(&self, row: &EntitySummary) -> bool {
        let year_ok = match row.year {
            Some(year) => {
                self.year_from.map_or(true, |from| year >= from)
                    && self.year_to.map_or(true, |to| year <= to)
            }
            None => self.include_undated || (self.year_from.is_none() && self.year_to.is_none()),
        };
        let title_ok = self.title_prefix.as_ref().map_or(true, |prefix| {
            row.title.to_lowercase().starts_with(&prefix.to_lowercase())
        });
        let person_ok = self.person.as_ref().map_or(true, |person| {
            let wanted = normalize(person);
            row.attributed_people.values().any(|p| normalize(p) == wanted)
        });
        year_ok && title_ok && person_ok
    }
}

/// Read-only access to catalog rows
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn fetch_by_id(&self, id: EntityId) -> EngineResult<Option<EntitySummary>>;

    /// Rows matching the filter, ordered by (year, title)
    async fn fetch_by_filter(&self, filter: &CatalogFilter) -> EngineResult<Vec<EntitySummary>>;
}

/// Catalog over a fixed set of rows
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    rows: Vec<EntitySummary>,
}

impl InMemoryCatalog {
    pub fn new(rows: Vec<EntitySummary>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[EntitySummary] {
        &self.rows
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn fetch_by_id(&self, id: EntityId) -> EngineResult<Option<EntitySummary>> {
        Ok(self.rows.iter().find(|row| row.id == id).cloned())
    }

    async fn fetch_by_filter(&self, filter: &CatalogFilter) -> EngineResult<Vec<EntitySummary>> {
        let mut rows: Vec<EntitySummary> = self
            .rows
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.year, &a.title).cmp(&(b.year, &b.title)));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn catalog() -> InMemoryCatalog {
        let mut eega = EntitySummary::new(Uuid::new_v4(), "Eega", Some(2012));
        eega.attributed_people
            .insert("director".to_string(), "S. S. Rajamouli".to_string());
        InMemoryCatalog::new(vec![
            EntitySummary::new(Uuid::new_v4(), "Magadheera", Some(2009)),
            eega,
            EntitySummary::new(Uuid::new_v4(), "Untitled Project", None),
        ])
    }

    #[tokio::test]
    async fn test_year_filter_excludes_undated_by_default() {
        let catalog = catalog();
        let rows = catalog.fetch_by_filter(&CatalogFilter::years(2009, 2012)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "Magadheera");

        let filter = CatalogFilter {
            include_undated: true,
            ..CatalogFilter::years(2009, 2012)
        };
        assert_eq!(catalog.fetch_by_filter(&filter).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_person_and_prefix_filters() {
        let catalog = catalog();
        let by_person = CatalogFilter {
            person: Some("s.s. rajamouli".to_string()),
            ..CatalogFilter::default()
        };
        // "s.s." normalizes to "ss", which differs from "s s"
        assert!(catalog.fetch_by_filter(&by_person).await.unwrap().is_empty());

        let by_person = CatalogFilter {
            person: Some("S. S. RAJAMOULI".to_string()),
            ..CatalogFilter::default()
        };
        assert_eq!(catalog.fetch_by_filter(&by_person).await.unwrap().len(), 1);

        let by_prefix = CatalogFilter {
            title_prefix: Some("mag".to_string()),
            ..CatalogFilter::default()
        };
        assert_eq!(catalog.fetch_by_filter(&by_prefix).await.unwrap()[0].title, "Magadheera");
    }

    #[tokio::test]
    async fn test_fetch_by_id() {
        let catalog = catalog();
        let id = catalog.rows()[1].id;
        assert_eq!(catalog.fetch_by_id(id).await.unwrap().unwrap().title, "Eega");
        assert!(catalog.fetch_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }
}
