//! Database module for persistent storage.
//!
//! Provides async SQLite access using SQLx for:
//! - the persisted channel set (auto-joined on registration)
//! - a generic per-key counter store used by feature plugins
//!
//! Consistency is this module's concern; callers treat every query as
//! fallible and log failures rather than escalating them.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout - prevents a wedged pool from
    /// blocking the dispatch path indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a new database connection, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let pool = if path == ":memory:" {
            // Use a uniquely named shared-cache memory database per call;
            // `file::memory:` is global-ish and collides across parallel
            // tests.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:magpie-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        tracing::warn!(path = %parent.display(), error = %e, "failed to create database directory");
                    }
                }
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        };

        info!(path = %path, "database connected");

        sqlx::migrate!("./migrations").run(&pool).await?;

        // WAL mode allows reads while writes are in progress
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Get the channel store.
    pub fn channels(&self) -> ChannelStore<'_> {
        ChannelStore { pool: &self.pool }
    }

    /// Get the counter store.
    pub fn counters(&self) -> CounterStore<'_> {
        CounterStore { pool: &self.pool }
    }
}

/// Store for the persisted channel set.
pub struct ChannelStore<'a> {
    pool: &'a SqlitePool,
}

impl ChannelStore<'_> {
    /// List channels marked for auto-join, in insertion order.
    pub async fn list(&self) -> Result<Vec<String>, DbError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM channels WHERE autojoin = 1 ORDER BY id")
                .fetch_all(self.pool)
                .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Persist a channel; saving an already-known channel is a no-op.
    pub async fn save(&self, name: &str) -> Result<(), DbError> {
        sqlx::query("INSERT OR IGNORE INTO channels (name, autojoin, added_at) VALUES (?, 1, ?)")
            .bind(name)
            .bind(chrono::Utc::now().timestamp())
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Remove a channel from the persisted set.
    pub async fn remove(&self, name: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM channels WHERE name = ? COLLATE NOCASE")
            .bind(name)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

/// Generic per-key counter store for feature plugins.
pub struct CounterStore<'a> {
    pool: &'a SqlitePool,
}

impl CounterStore<'_> {
    /// Fetch a counter value, `None` when the key has never been set.
    pub async fn get(&self, key: &str) -> Result<Option<i64>, DbError> {
        let value: Option<(i64,)> = sqlx::query_as("SELECT value FROM counters WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool)
            .await?;
        Ok(value.map(|(v,)| v))
    }

    /// Set a counter value, creating the key if needed.
    pub async fn set(&self, key: &str, value: i64) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO counters (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await?;
        Ok(())
    }
}
