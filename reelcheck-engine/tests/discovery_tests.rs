//! Filmography discovery: merging, role classification and catalog diffing

mod helpers;

use helpers::FixedFilmography;
use reelcheck_engine::config::{DiscoveryConfig, MatchingConfig};
use reelcheck_engine::db::{init_schema, Catalog, CatalogFilter, InMemoryCatalog, SqliteCatalog};
use reelcheck_engine::services::{AppearanceMerger, DiscoveryEngine, PersonQuery};
use reelcheck_engine::types::{DiscoveredAppearance, EntitySummary, RoleType};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn seen(title: &str, year: i32, source: &str) -> DiscoveredAppearance {
    DiscoveredAppearance::new(title, Some(year), source)
}

#[test]
fn test_second_source_recomputes_confidence() {
    let merger = AppearanceMerger::default();
    let first = merger.merge_sources(vec![vec![seen("Eega", 2012, "wiki")]]);
    assert_eq!(first[0].confidence, 0.50);

    let second = merger.merge_sources(vec![first, vec![seen("Eega", 2012, "tmdb")]]);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].confidence, 0.75);
}

#[test]
fn test_merge_is_associative_over_generated_lists() {
    let merger = AppearanceMerger::default();
    let titles = ["Eega", "EEGA", "Magadheera", "Baahubali: The Beginning"];
    let sources = ["wiki", "tmdb", "imdb"];

    let lists: Vec<Vec<DiscoveredAppearance>> = sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            titles
                .iter()
                .enumerate()
                .filter(|(j, _)| (i + j) % 2 == 0 || *j == 0)
                .map(|(j, title)| {
                    let appearance = seen(title, 2009 + j as i32, source);
                    if j % 2 == 0 {
                        appearance.with_billing_order((i + 1) as u32)
                    } else {
                        appearance.with_role(format!("Role {}", i))
                    }
                })
                .collect()
        })
        .collect();

    for split in 0..=lists.len() {
        let (a, b) = lists.split_at(split);
        let all = merger.merge_sources(lists.clone());
        let staged = merger.merge_sources(vec![
            merger.merge_sources(a.to_vec()),
            merger.merge_sources(b.to_vec()),
        ]);
        assert_eq!(staged, all, "split at {}", split);

        let flipped = merger.merge_sources(vec![
            merger.merge_sources(b.to_vec()),
            merger.merge_sources(a.to_vec()),
        ]);
        assert_eq!(flipped, all);
    }
}

fn engine(sources: Vec<FixedFilmography>) -> DiscoveryEngine {
    let mut engine = DiscoveryEngine::new(DiscoveryConfig::default(), &MatchingConfig::default());
    for source in sources {
        engine.register_source(Arc::new(source)).unwrap();
    }
    engine
}

#[tokio::test]
async fn test_child_role_and_missing_detection() {
    let engine = engine(vec![
        FixedFilmography::new(
            "wiki",
            vec![
                seen("Bala Ramayanam", 1996, "x").with_role("Young Rama"),
                seen("Magadheera", 2009, "x").with_billing_order(1),
            ],
        ),
        FixedFilmography::new("tmdb", vec![seen("Magadheera", 2009, "x")]),
    ]);
    let catalog = vec![EntitySummary::new(Uuid::new_v4(), "Magadheera", Some(2009))];
    let person = PersonQuery::new("Someone").with_birth_year(1985);
    let report = engine
        .discover(&person, &catalog, &CancellationToken::new())
        .await;

    let child = report
        .appearances
        .iter()
        .find(|a| a.title == "Bala Ramayanam")
        .unwrap();
    assert_eq!(child.classification.unwrap().role_type, RoleType::ChildActor);
    let lead = report.appearances.iter().find(|a| a.title == "Magadheera").unwrap();
    assert_eq!(lead.classification.unwrap().role_type, RoleType::Lead);
    assert_eq!(lead.sources.len(), 2);

    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].title, "Bala Ramayanam");
}

#[tokio::test]
async fn test_discover_against_in_memory_catalog() {
    let engine = engine(vec![FixedFilmography::new(
        "wiki",
        vec![seen("Bahubali", 2016, "x"), seen("Eega", 2012, "x")],
    )]);
    let catalog = InMemoryCatalog::new(vec![
        EntitySummary::new(Uuid::new_v4(), "Baahubali", Some(2015)),
        EntitySummary::new(Uuid::new_v4(), "Magadheera", Some(2009)),
    ]);
    let report = engine
        .discover_against(&PersonQuery::new("Someone"), &catalog, &CancellationToken::new())
        .await
        .unwrap();
    // One-year drift is tolerated for discovery matching
    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].title, "Eega");
}

#[tokio::test]
async fn test_discover_against_sqlite_catalog() {
    let temp_dir = TempDir::new().unwrap();
    let db_url = format!("sqlite:{}?mode=rwc", temp_dir.path().join("catalog.db").display());
    let pool = SqlitePool::connect(&db_url).await.unwrap();
    init_schema(&pool).await.unwrap();

    let eega = Uuid::new_v4();
    for (id, title, year) in [
        (eega, "Eega", 2012),
        (Uuid::new_v4(), "Magadheera", 2009),
        (Uuid::new_v4(), "Mr. Perfect", 2011),
    ] {
        sqlx::query("INSERT INTO movies (guid, title, release_year) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(title)
            .bind(year)
            .execute(&pool)
            .await
            .unwrap();
    }
    sqlx::query("INSERT INTO movie_credits (movie_guid, role, person_name) VALUES (?, 'hero', 'Nani')")
        .bind(eega.to_string())
        .execute(&pool)
        .await
        .unwrap();
    let catalog = SqliteCatalog::new(pool);

    let credited = catalog
        .fetch_by_filter(&CatalogFilter {
            person: Some("nani".to_string()),
            ..CatalogFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(credited.len(), 1);
    assert_eq!(credited[0].id, eega);

    let engine = engine(vec![FixedFilmography::new(
        "wiki",
        vec![seen("Eega", 2012, "x"), seen("Ride", 2009, "x")],
    )]);
    let report = engine
        .discover_against(&PersonQuery::new("Nani"), &catalog, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.appearances.len(), 2);
    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].title, "Ride");
}
