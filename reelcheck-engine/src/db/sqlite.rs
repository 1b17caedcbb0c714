//! SQLite catalog
//!
//! Reads `movies` and `movie_credits`. Ids are stored as TEXT uuids.

use crate::db::{Catalog, CatalogFilter};
use crate::error::EngineResult;
use crate::matching::normalize;
use crate::types::{EntityId, EntitySummary, ExternalIds};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Movie columns plus one credit per row; a movie without credits yields one row of NULLs
const MOVIE_WITH_CREDITS: &str = r#"
    SELECT m.guid, m.title, m.alt_title, m.release_year, m.tmdb_id, m.imdb_id, m.slug,
           c.role, c.person_name
    FROM movies m
    LEFT JOIN movie_credits c ON c.movie_guid = m.guid
"#;

/// Create the catalog tables if they do not exist (fixtures and local tooling)
pub async fn init_schema(pool: &SqlitePool) -> EngineResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS movies (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            alt_title TEXT,
            release_year INTEGER,
            tmdb_id INTEGER,
            imdb_id TEXT,
            slug TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS movie_credits (
            movie_guid TEXT NOT NULL REFERENCES movies(guid) ON DELETE CASCADE,
            role TEXT NOT NULL,
            person_name TEXT NOT NULL,
            PRIMARY KEY (movie_guid, role)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_movies_release_year ON movies(release_year)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_movie_credits_person ON movie_credits(person_name)")
        .execute(pool)
        .await?;

    debug!("Catalog schema ready");
    Ok(())
}

/// Catalog backed by an SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn summary_from_row(row: &SqliteRow) -> EngineResult<EntitySummary> {
    let guid: String = row.get("guid");
    let id = Uuid::parse_str(&guid).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let tmdb: Option<i64> = row.get("tmdb_id");

    Ok(EntitySummary {
        id,
        title: row.get("title"),
        alt_title: row.get("alt_title"),
        year: row.get("release_year"),
        external_ids: ExternalIds {
            tmdb: tmdb.and_then(|n| u64::try_from(n).ok()),
            imdb: row.get("imdb_id"),
        },
        slug: row.get("slug"),
        attributed_people: BTreeMap::new(),
    })
}

/// Fold joined rows into summaries; rows of one movie must be adjacent
fn summaries_from_rows(rows: &[SqliteRow]) -> EngineResult<Vec<EntitySummary>> {
    let mut summaries: Vec<EntitySummary> = Vec::new();
    let mut current: Option<String> = None;
    for row in rows {
        let guid: String = row.get("guid");
        if current.as_deref() != Some(guid.as_str()) {
            summaries.push(summary_from_row(row)?);
            current = Some(guid);
        }
        let role: Option<String> = row.get("role");
        let person: Option<String> = row.get("person_name");
        if let (Some(role), Some(person), Some(summary)) = (role, person, summaries.last_mut()) {
            summary.attributed_people.insert(role, person);
        }
    }
    Ok(summaries)
}

/// `LIKE` pattern matching titles that start with `prefix` literally
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn fetch_by_id(&self, id: EntityId) -> EngineResult<Option<EntitySummary>> {
        let sql = format!("{} WHERE m.guid = ?", MOVIE_WITH_CREDITS);
        let rows = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await?;
        Ok(summaries_from_rows(&rows)?.into_iter().next())
    }

    async fn fetch_by_filter(&self, filter: &CatalogFilter) -> EngineResult<Vec<EntitySummary>> {
        let sql = format!(
            r#"
            {}
            WHERE ((m.release_year IS NULL AND (? OR (? IS NULL AND ? IS NULL)))
                   OR (m.release_year IS NOT NULL
                       AND (? IS NULL OR m.release_year >= ?)
                       AND (? IS NULL OR m.release_year <= ?)))
              AND (? IS NULL OR lower(m.title) LIKE lower(?) ESCAPE '\')
            ORDER BY m.release_year, m.title, m.guid
            "#,
            MOVIE_WITH_CREDITS
        );
        let pattern = filter.title_prefix.as_deref().map(like_prefix);
        let rows = sqlx::query(&sql)
            .bind(filter.include_undated)
            .bind(filter.year_from)
            .bind(filter.year_to)
            .bind(filter.year_from)
            .bind(filter.year_from)
            .bind(filter.year_to)
            .bind(filter.year_to)
            .bind(pattern.as_deref())
            .bind(pattern.as_deref())
            .fetch_all(&self.pool)
            .await?;

        let mut summaries = summaries_from_rows(&rows)?;

        // Credited names go through the same normalization as every other comparison,
        // which SQL cannot express
        if let Some(person) = &filter.person {
            let wanted = normalize(person);
            summaries.retain(|s| s.attributed_people.values().any(|p| normalize(p) == wanted));
        }

        debug!(filter = ?filter, rows = summaries.len(), "Catalog rows fetched");
        Ok(summaries)
    }
}
