#![deny(warnings)]

//! Persistence layer: SQLite blob store and the debounced autosave writer.
//!
//! Every aggregate is stored as a single JSON blob keyed by name, so the
//! on-disk shape matches the export format byte for byte. Loads tolerate
//! missing or partial blobs by merging over defaults.

use chrono::Utc;
use hub_core::{PartialCategorySet, PartialQuarterFigures, PlanningDoc, QuarterFigures, ResultRow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::Row;
pub use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const BLOB_PLANNING: &str = "planning";
pub const BLOB_RESULTS: &str = "results";
pub const BLOB_QUARTER_TARGETS: &str = "quarter_projections";
pub const BLOB_QUARTER_ACTUALS: &str = "quarter_actual_nps";

/// Quiet interval before a scheduled write actually hits the database.
pub const AUTOSAVE_QUIET: Duration = Duration::from_millis(800);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("storage access failed: {0}")]
    Db(#[from] sqlx::Error),
}

/// Returns the default SQLite URL used for local saves.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/hub.db"
}

/// Opens (creating if missing) the save database and ensures the schema.
///
/// A single connection is enough for a local tool and keeps `sqlite::memory:`
/// pools pointing at one database in tests.
pub async fn init_db(url: &str) -> Result<SqlitePool, StoreError> {
    let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS blobs (
             name TEXT PRIMARY KEY,
             json TEXT NOT NULL,
             updated_at TEXT NOT NULL
         )",
    )
    .execute(&pool)
    .await?;
    Ok(pool)
}

/// Serializes `value` and upserts it under `name`.
pub async fn save_blob<T: Serialize + ?Sized>(
    pool: &SqlitePool,
    name: &str,
    value: &T,
) -> Result<(), StoreError> {
    let json = serde_json::to_string(value)?;
    save_raw(pool, name, &json).await
}

async fn save_raw(pool: &SqlitePool, name: &str, json: &str) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO blobs (name, json, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET json = excluded.json, updated_at = excluded.updated_at",
    )
    .bind(name)
    .bind(json)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    debug!(name, bytes = json.len(), "blob saved");
    Ok(())
}

/// Loads and deserializes the blob stored under `name`, if any.
pub async fn load_blob<T: DeserializeOwned>(
    pool: &SqlitePool,
    name: &str,
) -> Result<Option<T>, StoreError> {
    let row = sqlx::query("SELECT json FROM blobs WHERE name = ?1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => {
            let json: String = row.try_get("json")?;
            Ok(Some(serde_json::from_str(&json)?))
        }
        None => Ok(None),
    }
}

/// Planning blob as stored: categories may be absent or partial.
#[derive(Debug, Default, Deserialize)]
struct RawPlanning {
    #[serde(default)]
    events: Vec<hub_core::Event>,
    #[serde(default)]
    categories: Option<PartialCategorySet>,
}

/// Everything the application persists, assembled with defaults for
/// whatever the database does not have yet.
#[derive(Debug, Default)]
pub struct StoredState {
    pub planning: PlanningDoc,
    pub results: Vec<ResultRow>,
    pub quarter_targets: QuarterFigures,
    pub quarter_actuals: QuarterFigures,
}

/// Loads the four aggregates, merging stored categories and quarter figures
/// key by key over their defaults.
pub async fn load_all(pool: &SqlitePool) -> Result<StoredState, StoreError> {
    let mut state = StoredState::default();

    if let Some(raw) = load_blob::<RawPlanning>(pool, BLOB_PLANNING).await? {
        state.planning.events = raw.events;
        if let Some(partial) = raw.categories {
            state.planning.categories.merge(partial);
        }
    }
    if let Some(rows) = load_blob::<Vec<ResultRow>>(pool, BLOB_RESULTS).await? {
        state.results = rows;
    }
    if let Some(partial) = load_blob::<PartialQuarterFigures>(pool, BLOB_QUARTER_TARGETS).await? {
        state.quarter_targets.merge(partial);
    }
    if let Some(partial) = load_blob::<PartialQuarterFigures>(pool, BLOB_QUARTER_ACTUALS).await? {
        state.quarter_actuals.merge(partial);
    }
    Ok(state)
}

/// Coalesces rapid-fire saves of one blob into a single write.
///
/// Each `schedule` supersedes the previous pending write; the payload only
/// reaches the database once the quiet interval passes without another call.
/// `flush` writes the latest payload immediately, for shutdown paths.
pub struct DebouncedWriter {
    pool: SqlitePool,
    name: &'static str,
    quiet: Duration,
    pending: Option<tokio::task::JoinHandle<()>>,
    latest: Option<String>,
}

impl DebouncedWriter {
    pub fn new(pool: SqlitePool, name: &'static str) -> Self {
        Self::with_quiet(pool, name, AUTOSAVE_QUIET)
    }

    pub fn with_quiet(pool: SqlitePool, name: &'static str, quiet: Duration) -> Self {
        DebouncedWriter {
            pool,
            name,
            quiet,
            pending: None,
            latest: None,
        }
    }

    /// Snapshots `value` and arms the write timer, replacing any pending write.
    pub fn schedule<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        self.latest = Some(json.clone());
        if let Some(task) = self.pending.take() {
            task.abort();
        }
        let pool = self.pool.clone();
        let name = self.name;
        let quiet = self.quiet;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            if let Err(err) = save_raw(&pool, name, &json).await {
                warn!(name, %err, "autosave failed");
            }
        }));
        Ok(())
    }

    /// Cancels the timer and writes the latest scheduled payload now.
    pub async fn flush(&mut self) -> Result<(), StoreError> {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
        if let Some(json) = self.latest.take() {
            save_raw(&self.pool, self.name, &json).await?;
        }
        Ok(())
    }
}
