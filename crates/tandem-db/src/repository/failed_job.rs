//! # Failed Job Ledger
//!
//! One row per job that exhausted its attempts. The detector turns recent
//! rows into `failed_sync_job` conflicts; the health monitor counts them.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use tandem_core::FailedSyncJob;

const COLUMNS: &str = "id, job_id, task_kind, entity_key, error, failed_at";

#[derive(Debug, Clone)]
pub struct FailedJobRepository {
    pool: SqlitePool,
}

impl FailedJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        FailedJobRepository { pool }
    }

    pub async fn record(
        &self,
        job_id: &str,
        task_kind: &str,
        entity_key: &str,
        error: &str,
    ) -> DbResult<FailedSyncJob> {
        let mut conn = self.pool.acquire().await?;
        insert_failed(&mut *conn, job_id, task_kind, entity_key, error, Utc::now()).await
    }

    /// Entries that failed at or after `since`, newest first.
    pub async fn list_since(&self, since: DateTime<Utc>) -> DbResult<Vec<FailedSyncJob>> {
        let rows = sqlx::query_as::<_, FailedSyncJob>(&format!(
            "SELECT {COLUMNS} FROM failed_sync_jobs WHERE failed_at >= ?1 ORDER BY failed_at DESC"
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_since(&self, since: DateTime<Utc>) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM failed_sync_jobs WHERE failed_at >= ?1")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

pub(crate) async fn insert_failed(
    conn: &mut SqliteConnection,
    job_id: &str,
    task_kind: &str,
    entity_key: &str,
    error: &str,
    failed_at: DateTime<Utc>,
) -> DbResult<FailedSyncJob> {
    let row = sqlx::query_as::<_, FailedSyncJob>(&format!(
        r#"
        INSERT INTO failed_sync_jobs (job_id, task_kind, entity_key, error, failed_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(task_kind)
    .bind(entity_key)
    .bind(error)
    .bind(failed_at)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}
