//! Read-through cache for filter dropdown options
//!
//! Distinct-value queries scan the table, so results are cached for a short
//! TTL and replaced atomically. Reads on the hit path never touch the store
//! or take a lock; concurrent refreshes may both recompute and the last
//! writer's snapshot is the one retained.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::AppError;
use crate::models::FilterOptions;
use crate::store::{FilterColumn, LogStore};

const FILTER_CACHE_TTL: Duration = Duration::from_secs(30);

struct Snapshot {
    options: FilterOptions,
    expires: Instant,
}

pub struct FilterOptionsCache {
    snapshot: ArcSwap<Snapshot>,
    ttl: Duration,
}

impl FilterOptionsCache {
    pub fn new() -> Self {
        Self::with_ttl(FILTER_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot {
                options: FilterOptions::default(),
                expires: Instant::now(),
            }),
            ttl,
        }
    }

    /// Return the cached snapshot, refreshing from the store on expiry.
    pub async fn get(&self, store: &LogStore) -> Result<FilterOptions, AppError> {
        let snapshot = self.snapshot.load();
        if Instant::now() < snapshot.expires {
            return Ok(snapshot.options.clone());
        }

        let options = FilterOptions {
            services: store.distinct_values(FilterColumn::Service).await?,
            levels: store.distinct_values(FilterColumn::Level).await?,
            hosts: store.distinct_values(FilterColumn::Host).await?,
        };

        self.snapshot.store(Arc::new(Snapshot {
            options: options.clone(),
            expires: Instant::now() + self.ttl,
        }));

        Ok(options)
    }
}

impl Default for FilterOptionsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LogEntry, LogFilter};
    use chrono::Utc;
    use tempfile::TempDir;

    async fn create_test_store() -> (TempDir, LogStore) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}", dir.path().join("logs.db").display());
        let store = LogStore::connect(&url).await.unwrap();
        (dir, store)
    }

    fn entry(service: &str, level: &str) -> LogEntry {
        LogEntry {
            id: None,
            timestamp: Some(Utc::now()),
            service: service.to_string(),
            level: level.to_string(),
            message: "m".to_string(),
            metadata: None,
            host: None,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_hit_within_ttl_ignores_new_values() {
        let (_dir, store) = create_test_store().await;
        let cache = FilterOptionsCache::new();

        store.insert_log(&entry("api", "INFO")).await.unwrap();
        let first = cache.get(&store).await.unwrap();
        assert_eq!(first.services, vec!["api".to_string()]);

        // New distinct value lands, but the snapshot is still fresh
        store.insert_log(&entry("worker", "INFO")).await.unwrap();
        let second = cache.get(&store).await.unwrap();
        assert_eq!(second, first);

        // Sanity: the store itself already sees both
        let logs = store.query_logs(&LogFilter::default()).await.unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[tokio::test]
    async fn test_expiry_refreshes_from_store() {
        let (_dir, store) = create_test_store().await;
        let cache = FilterOptionsCache::with_ttl(Duration::from_millis(20));

        store.insert_log(&entry("api", "INFO")).await.unwrap();
        let first = cache.get(&store).await.unwrap();
        assert_eq!(first.services, vec!["api".to_string()]);

        store.insert_log(&entry("worker", "ERROR")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let refreshed = cache.get(&store).await.unwrap();
        assert_eq!(
            refreshed.services,
            vec!["api".to_string(), "worker".to_string()]
        );
        assert_eq!(
            refreshed.levels,
            vec!["ERROR".to_string(), "INFO".to_string()]
        );
    }

    #[tokio::test]
    async fn test_first_call_populates() {
        let (_dir, store) = create_test_store().await;
        let cache = FilterOptionsCache::new();

        let options = cache.get(&store).await.unwrap();
        assert!(options.services.is_empty());
        assert!(options.levels.is_empty());
        assert!(options.hosts.is_empty());
    }
}
