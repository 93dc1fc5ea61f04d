//! # Engine Configuration
//!
//! Configuration for the reconciliation engine and the daemon around it.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TANDEM_SOURCE_DB=/var/lib/tandem/source.db                         │
//! │     TANDEM_REDIS_URL=redis://127.0.0.1:6379                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path>, or                                                │
//! │     ~/.config/tandem/tandem.toml (Linux)                               │
//! │     ~/Library/Application Support/com.tandem.tandem/tandem.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [source_db]
//! path = "/var/lib/tandem/source.db"
//!
//! [mirror_db]
//! path = "/var/lib/tandem/mirror.db"
//!
//! [cache]
//! redis_url = "redis://127.0.0.1:6379"
//! namespace = "tandem"
//!
//! [detection]
//! stock_variance_threshold = 10
//! stock_high_above = 50
//!
//! [queue]
//! workers = 4
//! initial_backoff_ms = 500
//! max_backoff_secs = 60
//!
//! [zones]
//! "harbour front" = "coastal"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use tandem_core::conflict::{
    DEFAULT_COMPLIANCE_HIGH_ABOVE, DEFAULT_PERFORMANCE_HIGH_ABOVE, DEFAULT_STOCK_HIGH_ABOVE,
};
use tandem_core::{mapping, Zone, ZoneTable};
use tandem_db::DbConfig;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Store Settings
// =============================================================================

/// Location and pool size of one SQLite store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl DatabaseSettings {
    fn named(file: &str) -> Self {
        DatabaseSettings {
            path: default_data_dir().join(file),
            max_connections: default_max_connections(),
        }
    }

    pub fn to_db_config(&self) -> DbConfig {
        DbConfig::new(&self.path).max_connections(self.max_connections)
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "tandem", "tandem")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_source_db() -> DatabaseSettings {
    DatabaseSettings::named("source.db")
}

fn default_mirror_db() -> DatabaseSettings {
    DatabaseSettings::named("mirror.db")
}

// =============================================================================
// Cache Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Redis URL. Without one the in-process `MemoryCache` is used.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prefix for every key the engine writes.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Lifetime of sync-status entries.
    #[serde(default = "default_sync_status_ttl")]
    pub sync_status_ttl_secs: u64,

    /// Entry budget of the in-process cache; memory usage is reported
    /// relative to it.
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
}

fn default_namespace() -> String {
    "tandem".to_string()
}
fn default_sync_status_ttl() -> u64 {
    15 * 60
}
fn default_memory_capacity() -> usize {
    10_000
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            redis_url: None,
            namespace: default_namespace(),
            sync_status_ttl_secs: default_sync_status_ttl(),
            memory_capacity: default_memory_capacity(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Per-call timeouts. No store or cache call waits longer than these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    #[serde(default = "default_cache_timeout")]
    pub cache_timeout_ms: u64,
}

fn default_store_timeout() -> u64 {
    2_000
}
fn default_cache_timeout() -> u64 {
    500
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            store_timeout_ms: default_store_timeout(),
            cache_timeout_ms: default_cache_timeout(),
        }
    }
}

impl SyncSettings {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }
}

// =============================================================================
// Detection Settings
// =============================================================================

/// Thresholds and TTLs of the conflict detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Rating vs performance score difference that counts as a mismatch.
    #[serde(default = "default_performance_variance")]
    pub performance_variance_threshold: f64,

    /// Bin stock vs expected allocation difference that counts as variance.
    #[serde(default = "default_stock_variance")]
    pub stock_variance_threshold: i64,

    /// Compliance score difference that counts as a mismatch.
    #[serde(default = "default_compliance_diff")]
    pub compliance_diff_threshold: i64,

    /// Performance variance strictly above this is `high` instead of `medium`.
    #[serde(default = "default_performance_high_above")]
    pub performance_high_above: f64,

    /// Stock variance (units) strictly above this is `high`.
    #[serde(default = "default_stock_high_above")]
    pub stock_high_above: i64,

    /// Compliance difference strictly above this is `high`.
    #[serde(default = "default_compliance_high_above")]
    pub compliance_high_above: i64,

    /// A mirror agent not synced within this window is stale.
    #[serde(default = "default_staleness_window")]
    pub staleness_window_secs: u64,

    /// How far back failed jobs become `failed_sync_job` conflicts.
    #[serde(default = "default_failed_job_lookback")]
    pub failed_job_lookback_secs: u64,

    #[serde(default = "default_summary_ttl")]
    pub summary_ttl_secs: u64,

    /// Lifetime of the run-in-progress marker. Bounds how long a crashed
    /// run can block the next one.
    #[serde(default = "default_run_marker_ttl")]
    pub run_marker_ttl_secs: u64,
}

fn default_performance_variance() -> f64 {
    0.5
}
fn default_stock_variance() -> i64 {
    10
}
fn default_compliance_diff() -> i64 {
    5
}
fn default_performance_high_above() -> f64 {
    DEFAULT_PERFORMANCE_HIGH_ABOVE
}
fn default_stock_high_above() -> i64 {
    DEFAULT_STOCK_HIGH_ABOVE
}
fn default_compliance_high_above() -> i64 {
    DEFAULT_COMPLIANCE_HIGH_ABOVE
}
fn default_staleness_window() -> u64 {
    30 * 60
}
fn default_failed_job_lookback() -> u64 {
    24 * 60 * 60
}
fn default_summary_ttl() -> u64 {
    30 * 60
}
fn default_run_marker_ttl() -> u64 {
    5 * 60
}

impl Default for DetectionSettings {
    fn default() -> Self {
        DetectionSettings {
            performance_variance_threshold: default_performance_variance(),
            stock_variance_threshold: default_stock_variance(),
            compliance_diff_threshold: default_compliance_diff(),
            performance_high_above: default_performance_high_above(),
            stock_high_above: default_stock_high_above(),
            compliance_high_above: default_compliance_high_above(),
            staleness_window_secs: default_staleness_window(),
            failed_job_lookback_secs: default_failed_job_lookback(),
            summary_ttl_secs: default_summary_ttl(),
            run_marker_ttl_secs: default_run_marker_ttl(),
        }
    }
}

// =============================================================================
// Health Settings
// =============================================================================

/// Thresholds of the sync health monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_rate_healthy")]
    pub sync_rate_healthy_pct: f64,

    #[serde(default = "default_rate_critical")]
    pub sync_rate_critical_pct: f64,

    /// Trailing window of hourly counter buckets.
    #[serde(default = "default_rate_window")]
    pub sync_rate_window_hours: u32,

    #[serde(default = "default_queue_backlog")]
    pub queue_backlog_threshold: u64,

    #[serde(default = "default_failed_jobs")]
    pub failed_jobs_threshold: u64,

    #[serde(default = "default_failed_jobs_window")]
    pub failed_jobs_window_secs: u64,

    #[serde(default = "default_conflict_backlog")]
    pub conflict_backlog_threshold: usize,

    #[serde(default = "default_cache_memory")]
    pub cache_memory_max_pct: f64,

    #[serde(default = "default_store_latency")]
    pub store_latency_max_ms: u64,

    #[serde(default = "default_report_ttl")]
    pub health_report_ttl_secs: u64,
}

fn default_rate_healthy() -> f64 {
    95.0
}
fn default_rate_critical() -> f64 {
    80.0
}
fn default_rate_window() -> u32 {
    24
}
fn default_queue_backlog() -> u64 {
    1_000
}
fn default_failed_jobs() -> u64 {
    50
}
fn default_failed_jobs_window() -> u64 {
    60 * 60
}
fn default_conflict_backlog() -> usize {
    100
}
fn default_cache_memory() -> f64 {
    80.0
}
fn default_store_latency() -> u64 {
    100
}
fn default_report_ttl() -> u64 {
    5 * 60
}

impl Default for HealthSettings {
    fn default() -> Self {
        HealthSettings {
            sync_rate_healthy_pct: default_rate_healthy(),
            sync_rate_critical_pct: default_rate_critical(),
            sync_rate_window_hours: default_rate_window(),
            queue_backlog_threshold: default_queue_backlog(),
            failed_jobs_threshold: default_failed_jobs(),
            failed_jobs_window_secs: default_failed_jobs_window(),
            conflict_backlog_threshold: default_conflict_backlog(),
            cache_memory_max_pct: default_cache_memory(),
            store_latency_max_ms: default_store_latency(),
            health_report_ttl_secs: default_report_ttl(),
        }
    }
}

// =============================================================================
// Queue Settings
// =============================================================================

/// Lane workers and their retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Idle sleep between claims when the queue is empty.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Attempts before a job is failed into the ledger.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Jitter applied to each retry delay, as a fraction of the delay.
    /// 0 gives the plain doubling schedule.
    #[serde(default)]
    pub backoff_randomization: f64,

    /// Jobs older than this are purged by auto-recovery.
    #[serde(default = "default_max_job_age")]
    pub max_job_age_secs: u64,
}

fn default_workers() -> usize {
    4
}
fn default_poll_interval() -> u64 {
    500
}
fn default_max_attempts() -> i64 {
    5
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}
fn default_max_job_age() -> u64 {
    60 * 60
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            backoff_randomization: 0.0,
            max_job_age_secs: default_max_job_age(),
        }
    }
}

// =============================================================================
// Schedule Settings
// =============================================================================

/// Intervals of the periodic runs driven by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    #[serde(default = "default_detection_interval")]
    pub detection_interval_secs: u64,

    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,

    /// Drain the conflict ledger after every successful detection run.
    #[serde(default = "default_true")]
    pub auto_resolve_after_detection: bool,
}

fn default_detection_interval() -> u64 {
    5 * 60
}
fn default_health_interval() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        ScheduleSettings {
            detection_interval_secs: default_detection_interval(),
            health_interval_secs: default_health_interval(),
            auto_resolve_after_detection: true,
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconConfig {
    #[serde(default = "default_source_db")]
    pub source_db: DatabaseSettings,

    #[serde(default = "default_mirror_db")]
    pub mirror_db: DatabaseSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub detection: DetectionSettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub schedule: ScheduleSettings,

    /// Extra location keyword → zone entries, merged over the built-in table.
    #[serde(default)]
    pub zones: BTreeMap<String, Zone>,
}

impl Default for ReconConfig {
    fn default() -> Self {
        ReconConfig {
            source_db: default_source_db(),
            mirror_db: default_mirror_db(),
            cache: CacheSettings::default(),
            sync: SyncSettings::default(),
            detection: DetectionSettings::default(),
            health: HealthSettings::default(),
            queue: QueueSettings::default(),
            schedule: ScheduleSettings::default(),
            zones: BTreeMap::new(),
        }
    }
}

impl ReconConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tandem.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let explicit = config_path.is_some();
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else if explicit {
                return Err(SyncError::ConfigLoadFailed(format!(
                    "config file not found: {}",
                    path.display()
                )));
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> SyncResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates thresholds and the mapping tables.
    pub fn validate(&self) -> SyncResult<()> {
        if self.queue.workers == 0 {
            return Err(SyncError::InvalidConfig("queue.workers must be greater than 0".into()));
        }
        if self.queue.max_attempts < 1 {
            return Err(SyncError::InvalidConfig("queue.max_attempts must be at least 1".into()));
        }
        if self.queue.initial_backoff_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "queue.initial_backoff_ms must be greater than 0".into(),
            ));
        }
        if self.queue.max_backoff_secs.saturating_mul(1000) < self.queue.initial_backoff_ms {
            return Err(SyncError::InvalidConfig(
                "queue.max_backoff_secs must not be below initial_backoff_ms".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.queue.backoff_randomization) {
            return Err(SyncError::InvalidConfig(
                "queue.backoff_randomization must be in [0, 1)".into(),
            ));
        }
        if self.sync.store_timeout_ms == 0 || self.sync.cache_timeout_ms == 0 {
            return Err(SyncError::InvalidConfig("timeouts must be greater than 0".into()));
        }
        if self.detection.performance_variance_threshold < 0.0
            || self.detection.stock_variance_threshold < 0
            || self.detection.compliance_diff_threshold < 0
        {
            return Err(SyncError::InvalidConfig(
                "detection thresholds must not be negative".into(),
            ));
        }
        let detection = &self.detection;
        if detection.performance_high_above < detection.performance_variance_threshold
            || detection.stock_high_above < detection.stock_variance_threshold
            || detection.compliance_high_above < detection.compliance_diff_threshold
        {
            return Err(SyncError::InvalidConfig(
                "detection escalation cutoffs must not be below their reporting thresholds".into(),
            ));
        }
        if self.health.sync_rate_critical_pct > self.health.sync_rate_healthy_pct {
            return Err(SyncError::InvalidConfig(
                "health.sync_rate_critical_pct must not exceed sync_rate_healthy_pct".into(),
            ));
        }
        if self.health.sync_rate_window_hours == 0 {
            return Err(SyncError::InvalidConfig(
                "health.sync_rate_window_hours must be greater than 0".into(),
            ));
        }
        if self.cache.namespace.trim().is_empty() || self.cache.namespace.contains(['*', ' ']) {
            return Err(SyncError::InvalidConfig(format!(
                "cache.namespace '{}' is not a valid key prefix",
                self.cache.namespace
            )));
        }
        if let Some(ref url) = self.cache.redis_url {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(SyncError::InvalidConfig(format!(
                    "cache.redis_url must start with redis:// or rediss://, got: {}",
                    url
                )));
            }
        }
        if self.schedule.detection_interval_secs == 0 || self.schedule.health_interval_secs == 0 {
            return Err(SyncError::InvalidConfig("schedule intervals must be greater than 0".into()));
        }

        mapping::validate_status_table()?;
        self.zone_table()?;
        Ok(())
    }

    /// Built-in zone table merged with `[zones]`.
    pub fn zone_table(&self) -> SyncResult<ZoneTable> {
        Ok(ZoneTable::with_overrides(
            self.zones.iter().map(|(k, z)| (k.clone(), *z)),
        )?)
    }

    /// Applies `TANDEM_*` overrides read through `get`.
    pub fn apply_overrides<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = get("TANDEM_SOURCE_DB") {
            debug!(path = %path, "Overriding source store path from environment");
            self.source_db.path = PathBuf::from(path);
        }

        if let Some(path) = get("TANDEM_MIRROR_DB") {
            debug!(path = %path, "Overriding mirror store path from environment");
            self.mirror_db.path = PathBuf::from(path);
        }

        if let Some(url) = get("TANDEM_REDIS_URL") {
            self.cache.redis_url = if url.is_empty() { None } else { Some(url) };
        }

        if let Some(namespace) = get("TANDEM_CACHE_NAMESPACE") {
            self.cache.namespace = namespace;
        }

        override_number(&get, "TANDEM_WORKERS", &mut self.queue.workers);
        override_number(&get, "TANDEM_STORE_TIMEOUT_MS", &mut self.sync.store_timeout_ms);
        override_number(&get, "TANDEM_CACHE_TIMEOUT_MS", &mut self.sync.cache_timeout_ms);
        override_number(
            &get,
            "TANDEM_DETECTION_INTERVAL_SECS",
            &mut self.schedule.detection_interval_secs,
        );
        override_number(
            &get,
            "TANDEM_HEALTH_INTERVAL_SECS",
            &mut self.schedule.health_interval_secs,
        );
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tandem", "tandem")
            .map(|dirs| dirs.config_dir().join("tandem.toml"))
    }
}

fn override_number<F, T>(get: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display,
{
    if let Some(raw) = get(key) {
        match raw.parse::<T>() {
            Ok(value) => {
                debug!(key, value = %value, "Overriding setting from environment");
                *target = value;
            }
            Err(_) => warn!(key, value = %raw, "Ignoring unparsable environment override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ReconConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detection.stock_variance_threshold, 10);
        assert_eq!(config.detection.staleness_window_secs, 1800);
        assert_eq!(config.health.queue_backlog_threshold, 1000);
        assert_eq!(config.cache.namespace, "tandem");
    }

    #[test]
    fn test_toml_sections() {
        let config = ReconConfig::from_toml(
            r#"
            [source_db]
            path = "/tmp/a.db"

            [cache]
            redis_url = "redis://127.0.0.1:6379"

            [queue]
            workers = 2
            max_attempts = 3

            [zones]
            "harbour front" = "coastal"
            "#,
        )
        .unwrap();

        assert_eq!(config.source_db.path, PathBuf::from("/tmp/a.db"));
        assert_eq!(config.queue.workers, 2);
        assert_eq!(config.queue.initial_backoff_ms, 500);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.zone_table().unwrap().zone_for("12 Harbour Front Lane"),
            Zone::Coastal
        );
    }

    #[test]
    fn test_validation() {
        let mut config = ReconConfig::default();
        config.queue.workers = 0;
        assert!(config.validate().is_err());

        let mut config = ReconConfig::default();
        config.cache.redis_url = Some("http://cache".into());
        assert!(config.validate().is_err());

        let mut config = ReconConfig::default();
        config.queue.max_backoff_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ReconConfig::default();
        config.queue.backoff_randomization = 1.5;
        assert!(config.validate().is_err());

        let mut config = ReconConfig::default();
        config.zones.insert("nowhere".into(), Zone::Unassigned);
        assert!(config.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn test_escalation_cutoffs() {
        let config = ReconConfig::from_toml(
            r#"
            [detection]
            stock_variance_threshold = 5
            stock_high_above = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.detection.stock_high_above, 25);
        assert_eq!(config.detection.compliance_high_above, 20);
        assert!((config.detection.performance_high_above - 1.0).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());

        // a cutoff below its reporting threshold would skip `medium` entirely
        let mut config = ReconConfig::default();
        config.detection.compliance_high_above = 2;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("escalation cutoffs"));

        let mut config = ReconConfig::default();
        config.detection.performance_high_above = 0.25;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("TANDEM_MIRROR_DB", "/srv/mirror.db"),
            ("TANDEM_WORKERS", "8"),
            ("TANDEM_STORE_TIMEOUT_MS", "not-a-number"),
            ("TANDEM_REDIS_URL", ""),
        ]
        .into_iter()
        .collect();

        let mut config = ReconConfig::default();
        config.cache.redis_url = Some("redis://old".into());
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.mirror_db.path, PathBuf::from("/srv/mirror.db"));
        assert_eq!(config.queue.workers, 8);
        assert_eq!(config.sync.store_timeout_ms, 2000);
        assert!(config.cache.redis_url.is_none());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let err = ReconConfig::load(Some(PathBuf::from("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.is_config_error());
    }
}
