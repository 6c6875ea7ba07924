//! SQLite access for movies, ratings and enrichment rows.
//!
//! Every call opens its own connection and drops it before returning. There
//! is no pooling and no transaction spanning more than one call.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::Serialize;
use serde_json::{Number, Value};
use tracing::{debug, warn};

use crate::enrichment::{Enrichment, Sentiment, Tier};
use crate::error::StoreError;
use crate::responses::{integer, number};
use crate::{ENRICHMENT_TABLE, MOVIES_TABLE, RATINGS_TABLE};

/// Column values of one row, keyed by lower-cased column name in column order.
pub type Fields = IndexMap<String, Value>;

// ============================================================================
// Configuration
// ============================================================================

/// Locations of the two SQLite files.
///
/// The enrichment table lives in the movies database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub movies_db: PathBuf,
    pub ratings_db: PathBuf,
}

impl StoreConfig {
    pub fn new(movies_db: impl Into<PathBuf>, ratings_db: impl Into<PathBuf>) -> Self {
        Self {
            movies_db: movies_db.into(),
            ratings_db: ratings_db.into(),
        }
    }

    /// Paths from `MOVIE_INSIGHT_MOVIES_DB` / `MOVIE_INSIGHT_RATINGS_DB`, or
    /// the default data directory.
    pub fn from_env() -> Self {
        Self::new(crate::resolve_movies_db_path(), crate::resolve_ratings_db_path())
    }
}

// ============================================================================
// Records
// ============================================================================

/// A movie row. All store columns are kept; serializes as a flat object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movie {
    #[serde(skip)]
    id: i64,
    #[serde(flatten)]
    fields: Fields,
}

impl Movie {
    /// Build a movie from column values. Keys are lower-cased; a `movieid`
    /// column holding an integer is required.
    pub fn from_fields(fields: Fields) -> Result<Self, StoreError> {
        let fields = lowercase_keys(fields);
        let id = fields
            .get("movieid")
            .and_then(integer)
            .ok_or_else(|| StoreError::MalformedRow("movie row has no integer movieid".into()))?;
        Ok(Self { id, fields })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn title(&self) -> &str {
        self.text("title")
    }

    pub fn overview(&self) -> &str {
        self.text("overview")
    }

    pub fn genres(&self) -> &str {
        self.text("genres")
    }

    /// Budget in dollars; 0 when missing or not numeric.
    pub fn budget(&self) -> f64 {
        number(self.fields.get("budget")).unwrap_or(0.0)
    }

    /// Revenue in dollars; 0 when missing or not numeric.
    pub fn revenue(&self) -> f64 {
        number(self.fields.get("revenue")).unwrap_or(0.0)
    }

    fn text(&self, column: &str) -> &str {
        self.fields
            .get(column)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// A rating row, passed through with lower-cased keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Rating {
    fields: Fields,
}

impl Rating {
    pub fn from_fields(fields: Fields) -> Self {
        Self {
            fields: lowercase_keys(fields),
        }
    }

    pub fn movie_id(&self) -> Option<i64> {
        self.fields.get("movieid").and_then(integer)
    }

    pub fn value(&self) -> Option<f64> {
        number(self.fields.get("rating"))
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }
}

fn lowercase_keys(fields: Fields) -> Fields {
    fields
        .into_iter()
        .map(|(key, value)| (key.to_lowercase(), value))
        .collect()
}

// ============================================================================
// Movie Store
// ============================================================================

/// Per-call SQLite access to the movie, rating and enrichment tables.
#[derive(Debug, Clone)]
pub struct MovieStore {
    config: StoreConfig,
}

impl MovieStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Up to `limit` movies in store order. Rows without an integer
    /// `movieid` are skipped.
    pub fn get_movies(&self, limit: usize) -> Result<Vec<Movie>, StoreError> {
        let conn = open_read_only(&self.config.movies_db)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = query_fields(
            &conn,
            &format!("SELECT * FROM {MOVIES_TABLE} LIMIT ?1"),
            params![limit],
        )?;
        debug!(count = rows.len(), "Loaded movies");
        Ok(rows
            .into_iter()
            .filter_map(|fields| match Movie::from_fields(fields) {
                Ok(movie) => Some(movie),
                Err(e) => {
                    warn!(error = %e, "Skipping movie row");
                    None
                }
            })
            .collect())
    }

    /// All ratings, or only those for `movie_id` when it is given and non-zero.
    pub fn get_ratings(&self, movie_id: Option<i64>) -> Result<Vec<Rating>, StoreError> {
        let conn = open_read_only(&self.config.ratings_db)?;
        let rows = match movie_id.filter(|id| *id != 0) {
            Some(id) => query_fields(
                &conn,
                &format!("SELECT * FROM {RATINGS_TABLE} WHERE movieId = ?1"),
                params![id],
            )?,
            None => query_fields(&conn, &format!("SELECT * FROM {RATINGS_TABLE}"), [])?,
        };
        Ok(rows.into_iter().map(Rating::from_fields).collect())
    }

    /// Create the enrichment table if needed and insert-or-replace one row.
    ///
    /// Committed before returning.
    pub fn update_movie_enrichment(
        &self,
        movie_id: i64,
        enrichment: &Enrichment,
    ) -> Result<(), StoreError> {
        let mut conn = open_read_write(&self.config.movies_db)?;
        let tx = conn.transaction()?;
        ensure_enrichment_table(&tx)?;
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {ENRICHMENT_TABLE}
                 (movieid, sentiment, budget_tier, revenue_tier, effectiveness_score,
                  target_audience, content_rating)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                movie_id,
                enrichment.sentiment.map(Sentiment::as_str),
                enrichment.budget_tier.map(Tier::as_str),
                enrichment.revenue_tier.map(Tier::as_str),
                enrichment.effectiveness_score,
                enrichment.target_audience,
                enrichment.content_rating,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// The stored enrichment for a movie, if any.
    pub fn get_enrichment(&self, movie_id: i64) -> Result<Option<Enrichment>, StoreError> {
        let conn = open_read_only(&self.config.movies_db)?;
        if !table_exists(&conn, ENRICHMENT_TABLE)? {
            return Ok(None);
        }

        let row = conn
            .query_row(
                &format!(
                    "SELECT sentiment, budget_tier, revenue_tier, effectiveness_score,
                            target_audience, content_rating
                     FROM {ENRICHMENT_TABLE} WHERE movieid = ?1"
                ),
                params![movie_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(
            |(sentiment, budget_tier, revenue_tier, score, audience, content_rating)| Enrichment {
                sentiment: sentiment.as_deref().and_then(Sentiment::parse),
                budget_tier: budget_tier.as_deref().and_then(Tier::parse),
                revenue_tier: revenue_tier.as_deref().and_then(Tier::parse),
                effectiveness_score: score,
                target_audience: audience,
                content_rating,
            },
        ))
    }

    /// Number of enrichment rows; 0 before the table exists.
    pub fn enrichment_count(&self) -> Result<usize, StoreError> {
        let conn = open_read_only(&self.config.movies_db)?;
        if !table_exists(&conn, ENRICHMENT_TABLE)? {
            return Ok(0);
        }
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {ENRICHMENT_TABLE}"),
            [],
            |r| r.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn open_read_only(path: &Path) -> Result<Connection, StoreError> {
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

/// Read-write without create: a missing movies file is an error, not a new
/// empty database.
fn open_read_write(path: &Path) -> Result<Connection, StoreError> {
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

fn ensure_enrichment_table(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {ENRICHMENT_TABLE} (
            movieid INTEGER PRIMARY KEY,
            sentiment TEXT,
            budget_tier TEXT,
            revenue_tier TEXT,
            effectiveness_score REAL,
            target_audience TEXT,
            content_rating TEXT
        )"
    ))?;
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![name],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Run a query and map each row to its lower-cased column values.
fn query_fields(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Fields>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(|name| name.to_lowercase())
        .collect();

    let rows = stmt.query_map(params, |row| {
        let mut fields = Fields::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            fields.insert(column.clone(), json_value(row.get_ref(idx)?));
        }
        Ok(fields)
    })?;

    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

// ============================================================================
// Test Fixtures
// ============================================================================

/// Build a movie from a JSON object literal.
#[cfg(test)]
pub(crate) fn test_movie(value: Value) -> Movie {
    let fields: Fields = match value {
        Value::Object(map) => map.into_iter().collect(),
        other => panic!("expected object, got {other}"),
    };
    Movie::from_fields(fields).unwrap()
}

/// Create movies and ratings databases with `movie_count` movies.
///
/// Movie `i` (1-based) is titled "Movie i", has budget `i` million and
/// revenue `5 * i` million; even ids are "Action", odd ids "Drama", and
/// every third overview mentions love. Movie 1 has three ratings, movie 2
/// one.
#[cfg(test)]
pub(crate) fn create_test_store(movie_count: i64) -> (MovieStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(dir.path().join("movies.db"), dir.path().join("ratings.db"));

    let mut movies = Connection::open(&config.movies_db).unwrap();
    movies
        .execute_batch(
            "CREATE TABLE movies (
                movieId INTEGER, Title TEXT, Overview TEXT, Budget INTEGER,
                Revenue INTEGER, Runtime INTEGER, Genres TEXT
            )",
        )
        .unwrap();
    let tx = movies.transaction().unwrap();
    for i in 1..=movie_count {
        let overview = if i % 3 == 0 {
            format!("A tale of love number {i}")
        } else {
            format!("A heist story number {i}")
        };
        let genres = if i % 2 == 0 { "Action" } else { "Drama" };
        tx.execute(
            "INSERT INTO movies VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                i,
                format!("Movie {i}"),
                overview,
                i * 1_000_000,
                i * 5_000_000,
                90 + i,
                genres
            ],
        )
        .unwrap();
    }
    tx.commit().unwrap();

    let ratings = Connection::open(&config.ratings_db).unwrap();
    ratings
        .execute_batch(
            "CREATE TABLE ratings (userId INTEGER, movieId INTEGER, rating REAL, timestamp INTEGER);
             INSERT INTO ratings VALUES (1, 1, 4.0, 964982703);
             INSERT INTO ratings VALUES (2, 1, 3.5, 964982931);
             INSERT INTO ratings VALUES (3, 1, 5.0, 964983815);
             INSERT INTO ratings VALUES (1, 2, 2.5, 964982224);",
        )
        .unwrap();

    (MovieStore::new(config), dir)
}

/// Append a movie row with a NULL `movieId`.
#[cfg(test)]
pub(crate) fn insert_orphan_movie(store: &MovieStore) {
    Connection::open(&store.config().movies_db)
        .unwrap()
        .execute(
            "INSERT INTO movies (movieId, Title, Overview) VALUES (NULL, 'Orphan', 'No id')",
            [],
        )
        .unwrap();
}

// ============================================================================
// Tests
// ============================================================================
