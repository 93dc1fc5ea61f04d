//! # Call Deadlines
//!
//! Every store and cache call goes through [`Deadlines`], so no operation
//! blocks indefinitely. An elapsed deadline becomes `SyncError::Timeout`,
//! which the worker layer treats as transient.

use std::future::Future;
use std::time::Duration;

use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    pub store: Duration,
    pub cache: Duration,
}

impl Deadlines {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Deadlines {
            store: settings.store_timeout(),
            cache: settings.cache_timeout(),
        }
    }

    /// Runs a store call under the store deadline.
    pub async fn store<T, E, F>(&self, operation: &str, fut: F) -> SyncResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<SyncError>,
    {
        bounded(self.store, operation, fut).await
    }

    /// Runs a cache call under the cache deadline.
    pub async fn cache<T, F>(&self, operation: &str, fut: F) -> SyncResult<T>
    where
        F: Future<Output = SyncResult<T>>,
    {
        bounded(self.cache, operation, fut).await
    }
}

impl Default for Deadlines {
    fn default() -> Self {
        Self::from_settings(&SyncSettings::default())
    }
}

async fn bounded<T, E, F>(limit: Duration, operation: &str, fut: F) -> SyncResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<SyncError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(SyncError::timeout(operation, limit.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_elapsed_becomes_timeout() {
        let deadlines = Deadlines {
            store: Duration::from_millis(10),
            cache: Duration::from_millis(10),
        };

        let result: SyncResult<()> = deadlines
            .cache("cache.get", async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;

        match result {
            Err(SyncError::Timeout { operation, timeout_ms }) => {
                assert_eq!(operation, "cache.get");
                assert_eq!(timeout_ms, 10);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_error_converted() {
        let deadlines = Deadlines::default();
        let result: SyncResult<()> = deadlines
            .store("source.get_agent", async {
                Err::<(), _>(tandem_db::DbError::PoolExhausted)
            })
            .await;
        assert!(matches!(result, Err(SyncError::Store(_))));
    }
}
