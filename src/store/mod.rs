//! SQLite storage engine for log entries
//!
//! This module provides async database operations with:
//! - Connection pooling
//! - Automatic migrations
//! - Batch inserts for performance
//! - WAL mode for concurrent reads/writes

pub mod filter_cache;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::models::{LogEntry, LogFilter};

/// Applied when the caller omits a limit or supplies zero.
pub const DEFAULT_QUERY_LIMIT: i64 = 1000;

/// Cap on distinct values per column, keeps dropdowns usable.
const MAX_DISTINCT_VALUES: i64 = 100;

/// Columns permitted in distinct-value queries.
///
/// Closed enumeration so a column name can never be concatenated into SQL
/// from untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterColumn {
    Service,
    Level,
    Host,
}

impl FilterColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Level => "level",
            Self::Host => "host",
        }
    }

    pub fn parse(name: &str) -> Result<Self, AppError> {
        match name {
            "service" => Ok(Self::Service),
            "level" => Ok(Self::Level),
            "host" => Ok(Self::Host),
            other => Err(AppError::InvalidColumn(other.to_string())),
        }
    }
}

/// Log database handle
///
/// Manages the SQLite connection pool and owns all SQL-level access.
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    /// Open (or create) the database and run migrations.
    ///
    /// `database_url` is an sqlx SQLite URL, e.g. `sqlite:logs.db` or
    /// `sqlite::memory:`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal) // Write-Ahead Logging for concurrency
            .busy_timeout(Duration::from_secs(5)) // Writer gives up instead of hanging
            .pragma("cache_size", "-64000") // 64MB cache
            .pragma("synchronous", "NORMAL"); // Balance safety/performance

        let pool = SqlitePoolOptions::new()
            .max_connections(5) // Limited for SQLite (single writer)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .context("Failed to connect to log database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run log database migrations")?;

        tracing::info!("Log database migrations completed");

        Ok(Self { pool })
    }

    /// Insert a single log entry as one implicit transaction.
    ///
    /// Note: For performance, prefer `insert_batch()` when inserting
    /// multiple entries.
    pub async fn insert_log(&self, entry: &LogEntry) -> Result<(), AppError> {
        let metadata = match &entry.metadata {
            Some(value) => Some(
                serde_json::to_string(value)
                    .map_err(|e| sqlx::Error::Encode(Box::new(e)))?,
            ),
            None => None,
        };

        sqlx::query(
            "INSERT INTO logs (timestamp, service, level, message, metadata, host, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.timestamp)
        .bind(&entry.service)
        .bind(&entry.level)
        .bind(&entry.message)
        .bind(metadata)
        .bind(&entry.host)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert multiple entries in a single transaction.
    ///
    /// An entry whose metadata fails to serialize is stored with NULL
    /// metadata and the failure logged; any SQL failure rolls the whole
    /// batch back.
    pub async fn insert_batch(&self, entries: &[LogEntry]) -> Result<(), AppError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let created_at = Utc::now();

        for entry in entries {
            let metadata = entry.metadata.as_ref().and_then(|value| {
                match serde_json::to_string(value) {
                    Ok(json) => Some(json),
                    Err(e) => {
                        tracing::warn!(
                            service = %entry.service,
                            error = %e,
                            "failed to serialize metadata, storing entry without it"
                        );
                        None
                    }
                }
            });

            sqlx::query(
                "INSERT INTO logs (timestamp, service, level, message, metadata, host, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(entry.timestamp)
            .bind(&entry.service)
            .bind(&entry.level)
            .bind(&entry.message)
            .bind(metadata)
            .bind(&entry.host)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Query entries matching the filter, newest first.
    pub async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, AppError> {
        let mut qb = QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT id, timestamp, service, level, message, metadata, host, created_at
             FROM logs WHERE 1=1",
        );

        if let Some(service) = &filter.service {
            qb.push(" AND service = ").push_bind(service);
        }
        if let Some(level) = &filter.level {
            qb.push(" AND level = ").push_bind(level);
        }
        if let Some(host) = &filter.host {
            qb.push(" AND host = ").push_bind(host);
        }
        if let Some(start) = filter.start {
            qb.push(" AND timestamp >= ").push_bind(start);
        }
        if let Some(end) = filter.end {
            qb.push(" AND timestamp <= ").push_bind(end);
        }
        if let Some(search) = &filter.search {
            qb.push(" AND message LIKE ")
                .push_bind(format!("%{}%", search));
        }

        qb.push(" ORDER BY timestamp DESC, id DESC LIMIT ");
        let limit = match filter.limit {
            Some(l) if l > 0 => l,
            _ => DEFAULT_QUERY_LIMIT,
        };
        qb.push_bind(limit);

        let rows = qb.build().fetch_all(&self.pool).await?;

        let entries = rows
            .into_iter()
            .map(row_to_entry)
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(entries)
    }

    /// Distinct non-null values of one allow-listed column, ascending.
    pub async fn distinct_values(&self, column: FilterColumn) -> Result<Vec<String>, AppError> {
        let col = column.as_str();
        let sql = format!(
            "SELECT DISTINCT {col} FROM logs WHERE {col} IS NOT NULL ORDER BY {col} LIMIT {MAX_DISTINCT_VALUES}"
        );

        let values = sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(values)
    }

    /// Delete entries with `timestamp` strictly before `cutoff`.
    ///
    /// Returns the number of rows removed.
    pub async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM logs WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// The underlying connection pool (for advanced usage)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_entry(row: SqliteRow) -> Result<LogEntry, sqlx::Error> {
    // NULL, empty, and `{}` metadata all surface identically as "none"
    let metadata: Option<String> = row.try_get("metadata")?;
    let metadata = metadata
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
        .filter(|value| match value {
            serde_json::Value::Null => false,
            serde_json::Value::Object(map) => !map.is_empty(),
            _ => true,
        });

    Ok(LogEntry {
        id: Some(row.try_get("id")?),
        timestamp: Some(row.try_get("timestamp")?),
        service: row.try_get("service")?,
        level: row.try_get("level")?,
        message: row.try_get("message")?,
        metadata,
        host: row.try_get("host")?,
        created_at: Some(row.try_get("created_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn create_test_store() -> (TempDir, LogStore) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}", dir.path().join("logs.db").display());
        let store = LogStore::connect(&url).await.unwrap();
        (dir, store)
    }

    fn entry(service: &str, level: &str, message: &str) -> LogEntry {
        LogEntry {
            id: None,
            timestamp: Some(Utc::now()),
            service: service.to_string(),
            level: level.to_string(),
            message: message.to_string(),
            metadata: None,
            host: None,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_query() {
        let (_dir, store) = create_test_store().await;

        store.insert_log(&entry("api", "INFO", "hello")).await.unwrap();

        let logs = store.query_logs(&LogFilter::default()).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].service, "api");
        assert!(logs[0].id.is_some());
        assert!(logs[0].created_at.is_some());
        assert!(logs[0].metadata.is_none());
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let (_dir, store) = create_test_store().await;

        let mut e = entry("api", "INFO", "with metadata");
        e.metadata = Some(serde_json::json!({"nested": {"values": [1, 2, 3]}, "flag": true}));
        store.insert_log(&e).await.unwrap();

        let logs = store.query_logs(&LogFilter::default()).await.unwrap();
        assert_eq!(
            logs[0].metadata,
            Some(serde_json::json!({"nested": {"values": [1, 2, 3]}, "flag": true}))
        );
    }

    #[tokio::test]
    async fn test_empty_metadata_reads_as_absent() {
        let (_dir, store) = create_test_store().await;

        let mut e = entry("api", "INFO", "empty metadata");
        e.metadata = Some(serde_json::json!({}));
        store.insert_log(&e).await.unwrap();

        let logs = store.query_logs(&LogFilter::default()).await.unwrap();
        assert!(logs[0].metadata.is_none());
    }

    #[tokio::test]
    async fn test_batch_insert() {
        let (_dir, store) = create_test_store().await;

        let batch: Vec<LogEntry> = (0..10)
            .map(|i| entry("batch", "INFO", &format!("message {}", i)))
            .collect();
        store.insert_batch(&batch).await.unwrap();

        let logs = store.query_logs(&LogFilter::default()).await.unwrap();
        assert_eq!(logs.len(), 10);
    }

    #[tokio::test]
    async fn test_batch_insert_empty() {
        let (_dir, store) = create_test_store().await;
        store.insert_batch(&[]).await.unwrap();

        let logs = store.query_logs(&LogFilter::default()).await.unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn test_query_filters_by_each_predicate() {
        let (_dir, store) = create_test_store().await;

        let mut a = entry("api", "ERROR", "db timeout");
        a.host = Some("h1".to_string());
        let mut b = entry("worker", "INFO", "job done");
        b.host = Some("h2".to_string());
        store.insert_batch(&[a, b]).await.unwrap();

        let by_service = store
            .query_logs(&LogFilter {
                service: Some("api".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_service.len(), 1);
        assert_eq!(by_service[0].service, "api");

        let by_level = store
            .query_logs(&LogFilter {
                level: Some("INFO".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_level.len(), 1);
        assert_eq!(by_level[0].level, "INFO");

        let by_host = store
            .query_logs(&LogFilter {
                host: Some("h2".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_host.len(), 1);
        assert_eq!(by_host[0].host.as_deref(), Some("h2"));

        let by_search = store
            .query_logs(&LogFilter {
                search: Some("TIMEOUT".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_search.len(), 1, "LIKE match is case-insensitive");
        assert_eq!(by_search[0].message, "db timeout");

        let none = store
            .query_logs(&LogFilter {
                service: Some("api".into()),
                level: Some("INFO".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty(), "conjunctive predicates exclude mismatches");
    }

    #[tokio::test]
    async fn test_query_time_range_inclusive() {
        let (_dir, store) = create_test_store().await;

        let t1 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let t2 = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let t3 = Utc.timestamp_opt(1_700_000_200, 0).unwrap();
        for (t, msg) in [(t1, "first"), (t2, "second"), (t3, "third")] {
            let mut e = entry("api", "INFO", msg);
            e.timestamp = Some(t);
            store.insert_log(&e).await.unwrap();
        }

        let logs = store
            .query_logs(&LogFilter {
                start: Some(t1),
                end: Some(t2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(logs.len(), 2, "bounds are inclusive");
        assert_eq!(logs[0].message, "second");
        assert_eq!(logs[1].message, "first");
    }

    #[tokio::test]
    async fn test_query_order_newest_first() {
        let (_dir, store) = create_test_store().await;

        for i in 0..5 {
            let mut e = entry("api", "INFO", &format!("message {}", i));
            e.timestamp = Some(Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap());
            store.insert_log(&e).await.unwrap();
        }

        let logs = store.query_logs(&LogFilter::default()).await.unwrap();
        let timestamps: Vec<_> = logs.iter().map(|l| l.timestamp.unwrap()).collect();
        let mut sorted = timestamps.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(timestamps, sorted);
    }

    #[tokio::test]
    async fn test_query_equal_timestamps_latest_insert_first() {
        let (_dir, store) = create_test_store().await;

        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        for msg in ["first", "second"] {
            let mut e = entry("api", "INFO", msg);
            e.timestamp = Some(t);
            store.insert_log(&e).await.unwrap();
        }

        let logs = store.query_logs(&LogFilter::default()).await.unwrap();
        assert_eq!(logs[0].message, "second");
        assert_eq!(logs[1].message, "first");
    }

    #[tokio::test]
    async fn test_query_limit() {
        let (_dir, store) = create_test_store().await;

        let batch: Vec<LogEntry> = (0..5)
            .map(|i| entry("api", "INFO", &format!("message {}", i)))
            .collect();
        store.insert_batch(&batch).await.unwrap();

        let limited = store
            .query_logs(&LogFilter {
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);

        // Zero falls back to the default limit
        let all = store
            .query_logs(&LogFilter {
                limit: Some(0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_query_default_limit() {
        let (_dir, store) = create_test_store().await;

        let batch: Vec<LogEntry> = (0..1005)
            .map(|i| entry("api", "INFO", &format!("message {}", i)))
            .collect();
        store.insert_batch(&batch).await.unwrap();

        let logs = store.query_logs(&LogFilter::default()).await.unwrap();
        assert_eq!(logs.len() as i64, DEFAULT_QUERY_LIMIT);
    }

    #[tokio::test]
    async fn test_distinct_values() {
        let (_dir, store) = create_test_store().await;

        let mut a = entry("api", "ERROR", "m");
        a.host = Some("h1".to_string());
        let b = entry("worker", "INFO", "m");
        let c = entry("api", "INFO", "m");
        store.insert_batch(&[a, b, c]).await.unwrap();

        let services = store.distinct_values(FilterColumn::Service).await.unwrap();
        assert_eq!(services, vec!["api".to_string(), "worker".to_string()]);

        let levels = store.distinct_values(FilterColumn::Level).await.unwrap();
        assert_eq!(levels, vec!["ERROR".to_string(), "INFO".to_string()]);

        // NULL hosts are excluded
        let hosts = store.distinct_values(FilterColumn::Host).await.unwrap();
        assert_eq!(hosts, vec!["h1".to_string()]);
    }

    #[test]
    fn test_filter_column_parse_rejects_unknown() {
        assert!(FilterColumn::parse("service").is_ok());
        assert!(FilterColumn::parse("level").is_ok());
        assert!(FilterColumn::parse("host").is_ok());
        match FilterColumn::parse("message; DROP TABLE logs") {
            Err(AppError::InvalidColumn(name)) => {
                assert!(name.contains("DROP"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_before() {
        let (_dir, store) = create_test_store().await;

        let old = Utc.timestamp_opt(1_000_000_000, 0).unwrap();
        let cutoff = Utc.timestamp_opt(1_500_000_000, 0).unwrap();
        let recent = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let mut e1 = entry("api", "INFO", "old");
        e1.timestamp = Some(old);
        let mut e2 = entry("api", "INFO", "exactly cutoff");
        e2.timestamp = Some(cutoff);
        let mut e3 = entry("api", "INFO", "recent");
        e3.timestamp = Some(recent);
        store.insert_batch(&[e1, e2, e3]).await.unwrap();

        let deleted = store.delete_before(cutoff).await.unwrap();
        assert_eq!(deleted, 1, "only strictly-older entries are removed");

        let remaining = store.query_logs(&LogFilter::default()).await.unwrap();
        assert_eq!(remaining.len(), 2);

        let deleted_again = store.delete_before(cutoff).await.unwrap();
        assert_eq!(deleted_again, 0);
    }
}
