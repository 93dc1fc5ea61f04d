//! # Sync Job Queue
//!
//! Three-lane priority queue stored in System B.
//!
//! ## Claim Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  pending jobs with available_at <= now                                  │
//! │                                                                         │
//! │   compliance ─┐                                                         │
//! │   high ───────┼──► ORDER BY lane rank, available_at, created_at         │
//! │   normal ─────┘        LIMIT 1                                          │
//! │                          │                                              │
//! │                          ▼                                              │
//! │   UPDATE ... SET status = 'running', attempts = attempts + 1            │
//! │   (single statement, so two workers never claim the same job)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//! ```text
//! pending ──claim──► running ──complete──► completed
//!    ▲                  │
//!    └──reschedule──────┤ (attempts < max, backoff via available_at)
//!                       └──fail──► failed + failed_sync_jobs row
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::failed_job::insert_failed;
use tandem_core::{FailedSyncJob, JobStatus, LaneDepth, SyncJob, SyncLane, SyncTask};

const COLUMNS: &str = r#"
    id, lane, payload, status, attempts, last_error,
    available_at, started_at, created_at, finished_at
"#;

#[derive(Debug, Clone)]
pub struct SyncJobRepository {
    pool: SqlitePool,
}

impl SyncJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncJobRepository { pool }
    }

    /// Queues a task on a lane, available immediately.
    pub async fn enqueue(&self, lane: SyncLane, task: &SyncTask) -> DbResult<SyncJob> {
        let now = Utc::now();
        let job = SyncJob {
            id: Uuid::new_v4().to_string(),
            lane,
            payload: serde_json::to_string(task)?,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            available_at: now,
            started_at: None,
            created_at: now,
            finished_at: None,
        };

        debug!(job_id = %job.id, lane = %lane, kind = task.kind(), "Enqueuing sync job");

        sqlx::query(
            r#"
            INSERT INTO sync_jobs (id, lane, payload, status, attempts, available_at, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
            "#,
        )
        .bind(&job.id)
        .bind(job.lane)
        .bind(&job.payload)
        .bind(job.status)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(job)
    }

    /// Claims the next available job in lane priority order.
    pub async fn claim_next(&self, now: DateTime<Utc>) -> DbResult<Option<SyncJob>> {
        let job = sqlx::query_as::<_, SyncJob>(&format!(
            r#"
            UPDATE sync_jobs SET
                status = 'running',
                started_at = ?1,
                attempts = attempts + 1
            WHERE id = (
                SELECT id FROM sync_jobs
                WHERE status = 'pending' AND available_at <= ?1
                ORDER BY
                    CASE lane WHEN 'compliance' THEN 0 WHEN 'high' THEN 1 ELSE 2 END,
                    available_at,
                    created_at
                LIMIT 1
            )
            RETURNING {COLUMNS}
            "#
        ))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    pub async fn complete(&self, id: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE sync_jobs SET status = 'completed', finished_at = ?2, last_error = NULL WHERE id = ?1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Puts a running job back as pending, not claimable before `available_at`.
    pub async fn reschedule(&self, id: &str, error: &str, available_at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE sync_jobs SET status = 'pending', last_error = ?2, available_at = ?3, started_at = NULL
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(available_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Marks a job failed and records it in the failed-job ledger.
    pub async fn fail(&self, job: &SyncJob, error: &str) -> DbResult<FailedSyncJob> {
        let (kind, entity_key) = match job.task() {
            Ok(task) => (task.kind().to_string(), task.entity_key()),
            Err(_) => ("unknown".to_string(), format!("job:{}", job.id)),
        };
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE sync_jobs SET status = 'failed', finished_at = ?2, last_error = ?3 WHERE id = ?1",
        )
        .bind(&job.id)
        .bind(now)
        .bind(error)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(DbError::not_found("SyncJob", &job.id));
        }

        let row = insert_failed(&mut *tx, &job.id, &kind, &entity_key, error, now).await?;
        tx.commit().await?;
        Ok(row)
    }

    /// Fails jobs stuck beyond the cutoff: running since before it, or
    /// pending since before it. Returns the number purged.
    pub async fn purge_stuck(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                status = 'failed',
                finished_at = ?2,
                last_error = 'purged after exceeding max job age'
            WHERE (status = 'running' AND started_at < ?1)
               OR (status = 'pending' AND created_at < ?1)
            "#,
        )
        .bind(cutoff)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Returns running jobs started before `started_before` to the queue.
    ///
    /// Called at startup, when every running row belongs to a dead process.
    pub async fn requeue_running(&self, started_before: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET status = 'pending', started_at = NULL, available_at = ?1
            WHERE status = 'running' AND started_at < ?1
            "#,
        )
        .bind(started_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<SyncJob>> {
        let job = sqlx::query_as::<_, SyncJob>(&format!("SELECT {COLUMNS} FROM sync_jobs WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Pending and running counts for every lane, in priority order.
    pub async fn lane_depths(&self) -> DbResult<Vec<LaneDepth>> {
        let rows: Vec<(SyncLane, i64, i64)> = sqlx::query_as(
            r#"
            SELECT lane,
                   SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END),
                   SUM(CASE WHEN status = 'running' THEN 1 ELSE 0 END)
            FROM sync_jobs
            WHERE status IN ('pending', 'running')
            GROUP BY lane
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(SyncLane::PRIORITY_ORDER
            .iter()
            .map(|lane| {
                let (pending, running) = rows
                    .iter()
                    .find(|(l, _, _)| l == lane)
                    .map(|(_, p, r)| (*p, *r))
                    .unwrap_or((0, 0));
                LaneDepth {
                    lane: *lane,
                    pending,
                    running,
                }
            })
            .collect())
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_jobs WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
