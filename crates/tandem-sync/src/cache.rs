//! # Cache Client
//!
//! TTL key/value store, atomic counters and run markers. The cache is never
//! a system of record: everything in it can be recomputed from the stores.
//!
//! ## What Lives Here
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  {ns}:sync_status:{entity_key}      SyncStatusEntry, sync_status_ttl    │
//! │  {ns}:counter:success:{YYYYMMDDHH}  hourly success counter              │
//! │  {ns}:counter:failure:{YYYYMMDDHH}  hourly failure counter              │
//! │  {ns}:conflicts:summary             ConflictSummary, summary_ttl        │
//! │  {ns}:health:report                 HealthReport, health_report_ttl     │
//! │  {ns}:run:{detection|health}        run-in-progress marker (set_nx)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two implementations: [`MemoryCache`] (in-process, used by tests and
//! single-node deployments) and [`RedisCache`] (shared across processes).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Cache Trait
// =============================================================================

#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> SyncResult<Option<String>>;

    /// Stores a value. `None` keeps it until deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> SyncResult<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> SyncResult<bool>;

    /// Atomically adds `by` and returns the new value. The TTL is applied
    /// when the counter is created.
    async fn incr(&self, key: &str, by: i64, ttl: Option<Duration>) -> SyncResult<i64>;

    /// Stores the value only if the key is absent. Returns whether it was set.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> SyncResult<bool>;

    /// Round-trip latency.
    async fn ping(&self) -> SyncResult<Duration>;

    /// Used memory as a percentage of the limit, if the backend has one.
    async fn memory_usage_pct(&self) -> SyncResult<Option<f64>>;

    /// Deletes every key starting with `prefix`. Returns the count deleted.
    async fn flush_prefix(&self, prefix: &str) -> SyncResult<u64>;
}

// =============================================================================
// JSON Helpers
// =============================================================================

pub async fn get_json<T: DeserializeOwned>(cache: &dyn CacheClient, key: &str) -> SyncResult<Option<T>> {
    match cache.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn set_json<T: Serialize + Sync>(
    cache: &dyn CacheClient,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> SyncResult<()> {
    let raw = serde_json::to_string(value)?;
    cache.set(key, &raw, ttl).await
}

// =============================================================================
// Key Layout
// =============================================================================

/// Builds namespaced keys.
#[derive(Debug, Clone)]
pub struct CacheKeys {
    namespace: String,
}

impl CacheKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        CacheKeys {
            namespace: namespace.into(),
        }
    }

    /// Prefix shared by every key, used for namespace eviction.
    pub fn prefix(&self) -> String {
        format!("{}:", self.namespace)
    }

    pub fn sync_status(&self, entity_key: &str) -> String {
        format!("{}{}", self.sync_status_prefix(), entity_key)
    }

    /// Prefix of every per-entity sync-status entry.
    pub fn sync_status_prefix(&self) -> String {
        format!("{}:sync_status:", self.namespace)
    }

    pub fn success_counter(&self, at: DateTime<Utc>) -> String {
        format!("{}:counter:success:{}", self.namespace, hour_bucket(at))
    }

    pub fn failure_counter(&self, at: DateTime<Utc>) -> String {
        format!("{}:counter:failure:{}", self.namespace, hour_bucket(at))
    }

    pub fn conflict_summary(&self) -> String {
        format!("{}:conflicts:summary", self.namespace)
    }

    pub fn health_report(&self) -> String {
        format!("{}:health:report", self.namespace)
    }

    pub fn run_marker(&self, run: &str) -> String {
        format!("{}:run:{}", self.namespace, run)
    }
}

fn hour_bucket(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H").to_string()
}

/// Hour timestamps of the trailing window, newest first.
pub fn trailing_hours(now: DateTime<Utc>, hours: u32) -> impl Iterator<Item = DateTime<Utc>> {
    (0..hours as i64).map(move |h| now - chrono::Duration::hours(h))
}

/// Counters outlive the trailing window by one bucket.
pub fn counter_ttl(window_hours: u32) -> Duration {
    Duration::from_secs((window_hours as u64 + 1) * 3600)
}

// =============================================================================
// Memory Cache
// =============================================================================

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process cache with lazy expiry.
///
/// `capacity` is an entry budget: usage is reported against it and writes
/// beyond it first drop expired entries.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    capacity: usize,
    available: AtomicBool,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        MemoryCache {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            available: AtomicBool::new(true),
        }
    }

    /// Simulates an outage: every call fails until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<String, MemoryEntry>) -> R) -> SyncResult<R> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(SyncError::Cache("memory cache unavailable".into()));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| SyncError::Internal("memory cache lock poisoned".into()))?;
        Ok(f(&mut entries))
    }

    fn expiry(ttl: Option<Duration>) -> Option<Instant> {
        ttl.map(|ttl| Instant::now() + ttl)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

fn evict_expired(entries: &mut HashMap<String, MemoryEntry>, capacity: usize) {
    if entries.len() >= capacity {
        let now = Instant::now();
        entries.retain(|_, e| e.is_live(now));
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        self.with_entries(|entries| {
            let now = Instant::now();
            match entries.get(key) {
                Some(e) if e.is_live(now) => Some(e.value.clone()),
                Some(_) => {
                    entries.remove(key);
                    None
                }
                None => None,
            }
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> SyncResult<()> {
        let capacity = self.capacity;
        self.with_entries(|entries| {
            evict_expired(entries, capacity);
            entries.insert(
                key.to_string(),
                MemoryEntry {
                    value: value.to_string(),
                    expires_at: Self::expiry(ttl),
                },
            );
        })
    }

    async fn delete(&self, key: &str) -> SyncResult<bool> {
        self.with_entries(|entries| entries.remove(key).is_some())
    }

    async fn incr(&self, key: &str, by: i64, ttl: Option<Duration>) -> SyncResult<i64> {
        let capacity = self.capacity;
        self.with_entries(|entries| {
            let now = Instant::now();
            let current = match entries.get(key) {
                Some(e) if e.is_live(now) => Some((e.value.parse::<i64>().unwrap_or(0), e.expires_at)),
                _ => None,
            };
            let (next, expires_at) = match current {
                Some((value, expires_at)) => (value + by, expires_at),
                None => {
                    evict_expired(entries, capacity);
                    (by, Self::expiry(ttl))
                }
            };
            entries.insert(
                key.to_string(),
                MemoryEntry {
                    value: next.to_string(),
                    expires_at,
                },
            );
            next
        })
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> SyncResult<bool> {
        self.with_entries(|entries| {
            let now = Instant::now();
            if entries.get(key).is_some_and(|e| e.is_live(now)) {
                return false;
            }
            entries.insert(
                key.to_string(),
                MemoryEntry {
                    value: value.to_string(),
                    expires_at: Some(now + ttl),
                },
            );
            true
        })
    }

    async fn ping(&self) -> SyncResult<Duration> {
        let started = Instant::now();
        self.with_entries(|_| ())?;
        Ok(started.elapsed())
    }

    async fn memory_usage_pct(&self) -> SyncResult<Option<f64>> {
        let capacity = self.capacity;
        self.with_entries(|entries| {
            let now = Instant::now();
            let live = entries.values().filter(|e| e.is_live(now)).count();
            Some(live as f64 * 100.0 / capacity as f64)
        })
    }

    async fn flush_prefix(&self, prefix: &str) -> SyncResult<u64> {
        self.with_entries(|entries| {
            let before = entries.len();
            entries.retain(|k, _| !k.starts_with(prefix));
            (before - entries.len()) as u64
        })
    }
}

// =============================================================================
// Redis Cache
// =============================================================================

/// Cache backed by Redis through a reconnecting connection manager.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> SyncResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis cache");
        Ok(RedisCache { conn })
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> SyncResult<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> SyncResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn incr(&self, key: &str, by: i64, ttl: Option<Duration>) -> SyncResult<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = redis::cmd("INCRBY").arg(key).arg(by).query_async(&mut conn).await?;
        match ttl {
            // first increment created the key
            Some(ttl) if value == by => {
                let _: i64 = redis::cmd("PEXPIRE")
                    .arg(key)
                    .arg(ttl.as_millis().max(1) as u64)
                    .query_async(&mut conn)
                    .await?;
            }
            _ => {}
        }
        Ok(value)
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> SyncResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn ping(&self) -> SyncResult<Duration> {
        let mut conn = self.conn.clone();
        let started = Instant::now();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(started.elapsed())
    }

    async fn memory_usage_pct(&self) -> SyncResult<Option<f64>> {
        let mut conn = self.conn.clone();
        let info: String = redis::cmd("INFO").arg("memory").query_async(&mut conn).await?;
        Ok(parse_memory_usage(&info))
    }

    async fn flush_prefix(&self, prefix: &str) -> SyncResult<u64> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0u64;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let n: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                removed += n;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(prefix, removed, "Flushed cache namespace");
        Ok(removed)
    }
}

/// Reads `used_memory` against `maxmemory` from `INFO memory`.
/// Returns `None` when no limit is configured.
fn parse_memory_usage(info: &str) -> Option<f64> {
    let field = |name: &str| {
        info.lines()
            .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
            .and_then(|v| v.trim().parse::<f64>().ok())
    };
    let used = field("used_memory")?;
    let max = field("maxmemory")?;
    if max <= 0.0 {
        None
    } else {
        Some(used * 100.0 / max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_set_get_expire() {
        let cache = MemoryCache::new(100);
        cache.set("a", "1", None).await.unwrap();
        cache.set("b", "2", Some(Duration::from_millis(20))).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(cache.get("b").await.unwrap().as_deref(), Some("2"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get("b").await.unwrap().is_none());
        assert!(cache.delete("a").await.unwrap());
        assert!(!cache.delete("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_and_set_nx() {
        let cache = MemoryCache::default();
        assert_eq!(cache.incr("c", 1, None).await.unwrap(), 1);
        assert_eq!(cache.incr("c", 4, None).await.unwrap(), 5);

        let ttl = Duration::from_secs(60);
        assert!(cache.set_nx("lock", "run-1", ttl).await.unwrap());
        assert!(!cache.set_nx("lock", "run-2", ttl).await.unwrap());
        cache.delete("lock").await.unwrap();
        assert!(cache.set_nx("lock", "run-3", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_flush_prefix_and_usage() {
        let cache = MemoryCache::new(4);
        cache.set("tandem:x", "1", None).await.unwrap();
        cache.set("tandem:y", "1", None).await.unwrap();
        cache.set("other:z", "1", None).await.unwrap();

        assert_eq!(cache.memory_usage_pct().await.unwrap(), Some(75.0));
        assert_eq!(cache.flush_prefix("tandem:").await.unwrap(), 2);
        assert_eq!(cache.get("other:z").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_unavailable() {
        let cache = MemoryCache::default();
        cache.set_available(false);
        assert!(matches!(cache.ping().await, Err(SyncError::Cache(_))));
        cache.set_available(true);
        assert!(cache.ping().await.is_ok());
    }

    #[test]
    fn test_keys() {
        let keys = CacheKeys::new("tandem");
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(keys.success_counter(at), "tandem:counter:success:2026030914");
        assert_eq!(keys.sync_status("agent:7"), "tandem:sync_status:agent:7");
        assert_eq!(trailing_hours(at, 24).count(), 24);
    }

    #[test]
    fn test_parse_memory_usage() {
        let info = "# Memory\r\nused_memory:500\r\nused_memory_human:500B\r\nmaxmemory:1000\r\n";
        assert_eq!(parse_memory_usage(info), Some(50.0));
        assert_eq!(parse_memory_usage("used_memory:5\r\nmaxmemory:0\r\n"), None);
    }
}
