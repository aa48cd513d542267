//! Postgres-backed job store.
//!
//! Each job row keeps the routing columns (`kind`, `status`, `scheduled_at`,
//! `created_at`) next to the full job document in `body`. Claiming locks one
//! due row with `FOR UPDATE SKIP LOCKED`, so several executors (in one process or
//! many) can poll the same table without handing a job out twice. A running row's
//! `scheduled_at` is its lease end; once that passes the row is claimable again.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use super::store::{JobStats, JobStore, JobStoreError, DEFAULT_LEASE};
use super::types::{DeadLetterEntry, Job, JobId, JobKind, JobStatus};

#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
    lease: Duration,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease: DEFAULT_LEASE,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id, kind = job.kind.type_name()), err)]
    async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let body = to_body(&job)?;
        sqlx::query(
            r#"
            INSERT INTO jobs (id, kind, status, scheduled_at, created_at, updated_at, body)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.kind.type_name())
        .bind(job.status.label())
        .bind(job.scheduled_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                JobStoreError::AlreadyExists(job.id)
            } else {
                map_sqlx_error("enqueue", e)
            }
        })?;
        Ok(job.id)
    }

    #[instrument(skip(self), err)]
    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query("SELECT body FROM jobs WHERE id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;
        row.map(|r| from_row(&r)).transpose()
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, status = job.status.label()), err)]
    async fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let updated = write_job(&self.pool, job).await?;
        if updated == 0 {
            return Err(JobStoreError::NotFound(job.id));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(
            r#"
            SELECT body
            FROM jobs
            WHERE (status IN ('pending', 'failed') AND (scheduled_at IS NULL OR scheduled_at <= $1))
               OR (status = 'running' AND scheduled_at <= $1)
            ORDER BY created_at, id
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("claim_next", e))?;

        let Some(row) = row else {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(None);
        };

        let mut job = from_row(&row)?;
        job.mark_running(now, self.lease);
        write_job_tx(&mut tx, &job).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Some(job))
    }

    #[instrument(skip(self), fields(kind = kind.type_name()), err)]
    async fn list_by_kind(&self, kind: &JobKind, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let rows = sqlx::query("SELECT body FROM jobs WHERE kind = $1 ORDER BY created_at LIMIT $2")
            .bind(kind.type_name())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_by_kind", e))?;
        rows.iter().map(from_row).collect()
    }

    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    async fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut job = job;
        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = Utc::now();
        let entry = DeadLetterEntry::new(job, reason);

        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(entry.job.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("dead_letter_delete", e))?;
        sqlx::query(
            r#"
            INSERT INTO dead_letter_jobs (job_id, kind, reason, dead_lettered_at, body)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_id) DO UPDATE SET
                reason = EXCLUDED.reason,
                dead_lettered_at = EXCLUDED.dead_lettered_at,
                body = EXCLUDED.body
            "#,
        )
        .bind(entry.job.id.as_uuid())
        .bind(entry.job.kind.type_name())
        .bind(&entry.reason)
        .bind(entry.dead_lettered_at)
        .bind(to_body(&entry.job)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("dead_letter_insert", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT reason, dead_lettered_at, body
            FROM dead_letter_jobs
            ORDER BY dead_lettered_at
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_dead_letters", e))?;

        rows.iter()
            .map(|row| {
                Ok(DeadLetterEntry {
                    job: from_row(row)?,
                    reason: row.try_get("reason").map_err(|e| map_sqlx_error("decode_reason", e))?,
                    dead_lettered_at: row
                        .try_get("dead_lettered_at")
                        .map_err(|e| map_sqlx_error("decode_dead_lettered_at", e))?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let row = sqlx::query("DELETE FROM dead_letter_jobs WHERE job_id = $1 RETURNING body")
            .bind(job_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("retry_dead_letter", e))?
            .ok_or(JobStoreError::NotFound(job_id))?;

        let mut job = from_row(&row)?;
        job.reset_for_retry();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, kind, status, scheduled_at, created_at, updated_at, body)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                scheduled_at = EXCLUDED.scheduled_at,
                updated_at = EXCLUDED.updated_at,
                body = EXCLUDED.body
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.kind.type_name())
        .bind(job.status.label())
        .bind(job.scheduled_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(to_body(&job)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("retry_dead_letter_insert", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(job)
    }

    #[instrument(skip(self), err)]
    async fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError> {
        let result = sqlx::query("DELETE FROM dead_letter_jobs WHERE job_id = $1")
            .bind(job_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_dead_letter", e))?;
        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job_id));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn stats(&self) -> Result<JobStats, JobStoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("stats", e))?;
        let dead: i64 = sqlx::query("SELECT COUNT(*) AS n FROM dead_letter_jobs")
            .fetch_one(&self.pool)
            .await
            .and_then(|row| row.try_get("n"))
            .map_err(|e| map_sqlx_error("stats_dead_letters", e))?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(|e| map_sqlx_error("decode_status", e))?;
            let n: i64 = row.try_get("n").map_err(|e| map_sqlx_error("decode_count", e))?;
            let n = n.max(0) as usize;
            match status.as_str() {
                "pending" => stats.pending += n,
                "running" => stats.running += n,
                "completed" => stats.completed += n,
                "failed" => stats.failed += n,
                "dead_lettered" => stats.dead_lettered += n,
                _ => {}
            }
        }
        stats.dead_lettered += dead.max(0) as usize;
        Ok(stats)
    }
}

const UPDATE_JOB: &str = r#"
    UPDATE jobs
    SET status = $2, scheduled_at = $3, updated_at = $4, body = $5
    WHERE id = $1
"#;

async fn write_job(pool: &PgPool, job: &Job) -> Result<u64, JobStoreError> {
    let result = sqlx::query(UPDATE_JOB)
        .bind(job.id.as_uuid())
        .bind(job.status.label())
        .bind(job.scheduled_at)
        .bind(job.updated_at)
        .bind(to_body(job)?)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;
    Ok(result.rows_affected())
}

async fn write_job_tx(tx: &mut Transaction<'_, Postgres>, job: &Job) -> Result<(), JobStoreError> {
    sqlx::query(UPDATE_JOB)
        .bind(job.id.as_uuid())
        .bind(job.status.label())
        .bind(job.scheduled_at)
        .bind(job.updated_at)
        .bind(to_body(job)?)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;
    Ok(())
}

fn to_body(job: &Job) -> Result<serde_json::Value, JobStoreError> {
    serde_json::to_value(job).map_err(|e| JobStoreError::Storage(format!("failed to encode job {}: {e}", job.id)))
}

fn from_row(row: &sqlx::postgres::PgRow) -> Result<Job, JobStoreError> {
    let body: serde_json::Value = row.try_get("body").map_err(|e| map_sqlx_error("decode_body", e))?;
    serde_json::from_value(body).map_err(|e| JobStoreError::Storage(format!("failed to decode job: {e}")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            JobStoreError::Storage(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => JobStoreError::Storage(format!("connection pool closed in {operation}")),
        other => JobStoreError::Storage(format!("sqlx error in {operation}: {other}")),
    }
}
