//! Append-only SQLite store for mapping records.
//!
//! SQLite is synchronous; every operation runs on the blocking thread pool
//! via `tokio::task::spawn_blocking`, with connections drawn from an r2d2
//! pool. The store exposes no update path: re-resolving an identifier
//! appends a new row, preserving one row per resolution attempt.

use std::path::Path;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::record::MappingMethod;
use crate::record::MappingRecord;
use crate::record::NewMapping;

/// Current schema version, tracked via `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 1;

/// Store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("blocking task error: {0}")]
    Task(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

type DbPool = Pool<SqliteConnectionManager>;

/// Aggregate mapping-cache statistics for one owner, computed over the
/// latest record per `(source_identifier, target_platform)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStatistics {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub fresh: u64,
    pub stale: u64,
    pub avg_age_days: f64,
    /// Share of identifiers servable without re-resolution.
    pub hit_rate_pct: f64,
}

/// Append-only mapping store.
pub struct MappingStore {
    pool: DbPool,
}

impl MappingStore {
    /// Open (creating if necessary) the store at `path` and migrate it to
    /// the current schema.
    pub fn open(path: &Path, pool_size: u32) -> StoreResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(apply_pragmas);
        Self::from_manager(manager, pool_size)
    }

    /// In-memory store with a single connection. Test convenience.
    pub fn in_memory() -> StoreResult<Self> {
        Self::from_manager(SqliteConnectionManager::memory(), 1)
    }

    fn from_manager(manager: SqliteConnectionManager, pool_size: u32) -> StoreResult<Self> {
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        {
            let mut conn = pool.get().map_err(|e| StoreError::Pool(e.to_string()))?;
            migrate_to_latest(&mut conn)?;
        }
        Ok(Self { pool })
    }

    /// Most recent record for the triple, or `None` when never attempted.
    pub async fn find_latest(
        &self,
        owner_id: &str,
        source_identifier: &str,
        target_platform: &str,
    ) -> StoreResult<Option<MappingRecord>> {
        let owner_id = owner_id.to_string();
        let source_identifier = source_identifier.to_string();
        let target_platform = target_platform.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, source_platform, source_identifier, target_platform,
                        target_identifier, mapping_successful, mapping_method,
                        data_points_count, error_reason, created_at
                 FROM identity_mappings
                 WHERE owner_id = ?1 AND source_identifier = ?2 AND target_platform = ?3
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
            )?;
            let row = stmt
                .query_row(params![owner_id, source_identifier, target_platform], row_to_record)
                .optional()?;
            row.transpose()
        })
        .await
    }

    /// Append a new mapping attempt. There is deliberately no update path.
    pub async fn insert(&self, mapping: NewMapping) -> StoreResult<i64> {
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO identity_mappings
                   (owner_id, source_platform, source_identifier, target_platform,
                    target_identifier, mapping_successful, mapping_method,
                    data_points_count, error_reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    mapping.owner_id,
                    mapping.source_platform,
                    mapping.source_identifier,
                    mapping.target_platform,
                    mapping.target_identifier,
                    mapping.mapping_successful,
                    mapping.mapping_method.map(|m| m.as_str()),
                    mapping.data_points_count,
                    mapping.error_reason,
                    mapping.created_at.to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Full append-only history for one triple, newest first.
    pub async fn history(
        &self,
        owner_id: &str,
        source_identifier: &str,
        target_platform: &str,
    ) -> StoreResult<Vec<MappingRecord>> {
        let owner_id = owner_id.to_string();
        let source_identifier = source_identifier.to_string();
        let target_platform = target_platform.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, source_platform, source_identifier, target_platform,
                        target_identifier, mapping_successful, mapping_method,
                        data_points_count, error_reason, created_at
                 FROM identity_mappings
                 WHERE owner_id = ?1 AND source_identifier = ?2 AND target_platform = ?3
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt.query_map(
                params![owner_id, source_identifier, target_platform],
                row_to_record,
            )?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row??);
            }
            Ok(records)
        })
        .await
    }

    /// Cache statistics over the latest record per identifier.
    pub async fn statistics(
        &self,
        owner_id: &str,
        cache_days: i64,
    ) -> StoreResult<CacheStatistics> {
        let owner_id = owner_id.to_string();
        let latest = self
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, owner_id, source_platform, source_identifier, target_platform,
                            target_identifier, mapping_successful, mapping_method,
                            data_points_count, error_reason, created_at
                     FROM identity_mappings
                     WHERE owner_id = ?1
                       AND id IN (SELECT MAX(id) FROM identity_mappings
                                  WHERE owner_id = ?1
                                  GROUP BY source_identifier, target_platform)",
                )?;
                let rows = stmt.query_map(params![owner_id], row_to_record)?;
                let mut records = Vec::new();
                for row in rows {
                    records.push(row??);
                }
                Ok(records)
            })
            .await?;

        let now = Utc::now();
        let total = latest.len() as u64;
        let successful = latest.iter().filter(|r| r.mapping_successful).count() as u64;
        let fresh = latest
            .iter()
            .filter(|r| {
                r.mapping_successful
                    && now.signed_duration_since(r.created_at) < Duration::days(cache_days)
            })
            .count() as u64;
        let stale = successful - fresh;
        let avg_age_days = if latest.is_empty() {
            0.0
        } else {
            latest
                .iter()
                .map(|r| now.signed_duration_since(r.created_at).num_seconds() as f64)
                .sum::<f64>()
                / latest.len() as f64
                / 86_400.0
        };
        let hit_rate_pct = if total == 0 {
            0.0
        } else {
            fresh as f64 * 100.0 / total as f64
        };
        Ok(CacheStatistics {
            total,
            successful,
            failed: total - successful,
            fresh,
            stale,
            avg_age_days,
            hit_rate_pct,
        })
    }

    /// Run a sync operation on a pooled connection from the blocking pool.
    async fn with_connection<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| StoreError::Pool(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn apply_pragmas(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    // journal_mode returns a row, so pragma_update rather than a batch.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")
}

/// Forward-only migrations tracked by `PRAGMA user_version`.
fn migrate_to_latest(conn: &mut Connection) -> StoreResult<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS identity_mappings (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 owner_id TEXT NOT NULL,
                 source_platform TEXT NOT NULL,
                 source_identifier TEXT NOT NULL,
                 target_platform TEXT NOT NULL,
                 target_identifier TEXT NOT NULL,
                 mapping_successful INTEGER NOT NULL,
                 mapping_method TEXT,
                 data_points_count INTEGER NOT NULL DEFAULT 0,
                 error_reason TEXT,
                 created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_identity_mappings_lookup
               ON identity_mappings (owner_id, source_identifier, target_platform, created_at);",
        )?;
    }
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreResult<MappingRecord>> {
    let method_text: Option<String> = row.get(7)?;
    let created_at_text: String = row.get(10)?;
    Ok(build_record(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        method_text,
        row.get(8)?,
        row.get(9)?,
        created_at_text,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_record(
    id: i64,
    owner_id: String,
    source_platform: String,
    source_identifier: String,
    target_platform: String,
    target_identifier: String,
    mapping_successful: bool,
    method_text: Option<String>,
    data_points_count: i64,
    error_reason: Option<String>,
    created_at_text: String,
) -> StoreResult<MappingRecord> {
    let created_at = DateTime::parse_from_rfc3339(&created_at_text)
        .map_err(|e| StoreError::Corrupt(format!("created_at {created_at_text:?}: {e}")))?
        .with_timezone(&Utc);
    let mapping_method = match method_text {
        Some(text) => Some(
            MappingMethod::parse(&text)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown mapping_method {text:?}")))?,
        ),
        None => None,
    };
    Ok(MappingRecord {
        id,
        owner_id,
        source_platform,
        source_identifier,
        target_platform,
        target_identifier,
        mapping_successful,
        mapping_method,
        data_points_count,
        error_reason,
        created_at,
    })
}
