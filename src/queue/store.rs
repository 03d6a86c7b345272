use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::types::{JobId, JobKind, JobStatus, NewJob, QueuedJob};

/// `scene_jobs` テーブルの読み書き。
#[derive(Debug, Clone)]
pub(crate) struct JobStore {
    pool: PgPool,
}

const JOB_COLUMNS: &str =
    "id, kind, generation_id, scene_id, status, attempts, max_attempts, last_error, run_at, created_at";

impl JobStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 新しいジョブを投入する。
    ///
    /// 接続系の失敗をそのまま分類できるよう `sqlx::Error` を返す。
    pub(crate) async fn enqueue(
        &self,
        job: &NewJob,
        max_attempts: i32,
    ) -> Result<JobId, sqlx::Error> {
        let row = sqlx::query(
            r"
            INSERT INTO scene_jobs (kind, generation_id, scene_id, status, max_attempts)
            VALUES ($1, $2, $3, 'pending', $4)
            RETURNING id
            ",
        )
        .bind(job.kind.as_str())
        .bind(job.generation_id)
        .bind(&job.scene_id)
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await?;

        row.try_get("id")
    }

    /// 実行すべき次のジョブを取り出す（SELECT FOR UPDATE SKIP LOCKED）。
    ///
    /// 取り出しと同時に running へ遷移させ、試行回数を進める。
    /// 複数ワーカーが同時に走っても同じジョブは一度しか渡らない。
    pub(crate) async fn pick_next(&self) -> Result<Option<QueuedJob>> {
        let row = sqlx::query(&format!(
            r"
            UPDATE scene_jobs
            SET status = 'running',
                attempts = attempts + 1,
                started_at = COALESCE(started_at, NOW())
            WHERE id = (
                SELECT id FROM scene_jobs
                WHERE status IN ('pending', 'retrying') AND run_at <= NOW()
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING {JOB_COLUMNS}
            "
        ))
        .fetch_optional(&self.pool)
        .await
        .context("failed to pick next job")?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Self::row_to_job(&row)?))
    }

    pub(crate) async fn mark_completed(&self, job_id: JobId) -> Result<()> {
        sqlx::query(
            r"
            UPDATE scene_jobs
            SET status = 'completed', completed_at = NOW(), last_error = NULL
            WHERE id = $1
            ",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .context("failed to mark job completed")?;
        Ok(())
    }

    /// 失敗ジョブを遅延つきで再実行キューへ戻す。
    pub(crate) async fn mark_retrying(
        &self,
        job_id: JobId,
        error: &str,
        delay: Duration,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE scene_jobs
            SET status = 'retrying',
                last_error = $2,
                run_at = NOW() + make_interval(secs => $3)
            WHERE id = $1
            ",
        )
        .bind(job_id)
        .bind(error)
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await
        .context("failed to mark job retrying")?;
        Ok(())
    }

    pub(crate) async fn mark_failed(&self, job_id: JobId, error: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE scene_jobs
            SET status = 'failed', last_error = $2, completed_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("failed to mark job failed")?;
        Ok(())
    }

    /// 未実行（pending / retrying）のジョブを生成単位で取り除く。
    pub(crate) async fn delete_pending_for(&self, generation_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM scene_jobs
            WHERE generation_id = $1 AND status IN ('pending', 'retrying')
            ",
        )
        .bind(generation_id)
        .execute(&self.pool)
        .await
        .context("failed to delete queued jobs")?;
        Ok(result.rows_affected())
    }

    /// 終了済みジョブの保持期間を適用する。
    ///
    /// completed はTTL超過分と件数上限超過分、failed はTTL超過分を消す。
    pub(crate) async fn sweep(
        &self,
        completed_retention: Duration,
        completed_keep_max: i64,
        failed_retention: Duration,
    ) -> Result<u64> {
        let mut removed = 0u64;

        let result = sqlx::query(
            r"
            DELETE FROM scene_jobs
            WHERE status = 'completed'
              AND completed_at < NOW() - make_interval(secs => $1)
            ",
        )
        .bind(completed_retention.as_secs_f64())
        .execute(&self.pool)
        .await
        .context("failed to sweep expired completed jobs")?;
        removed += result.rows_affected();

        let result = sqlx::query(
            r"
            DELETE FROM scene_jobs
            WHERE status = 'completed' AND id NOT IN (
                SELECT id FROM scene_jobs
                WHERE status = 'completed'
                ORDER BY completed_at DESC
                LIMIT $1
            )
            ",
        )
        .bind(completed_keep_max)
        .execute(&self.pool)
        .await
        .context("failed to sweep surplus completed jobs")?;
        removed += result.rows_affected();

        let result = sqlx::query(
            r"
            DELETE FROM scene_jobs
            WHERE status = 'failed'
              AND completed_at < NOW() - make_interval(secs => $1)
            ",
        )
        .bind(failed_retention.as_secs_f64())
        .execute(&self.pool)
        .await
        .context("failed to sweep expired failed jobs")?;
        removed += result.rows_affected();

        Ok(removed)
    }

    fn row_to_job(row: &PgRow) -> Result<QueuedJob> {
        let kind_raw: String = row.try_get("kind").context("kind column")?;
        let status_raw: String = row.try_get("status").context("status column")?;
        Ok(QueuedJob {
            id: row.try_get("id").context("id column")?,
            kind: JobKind::from_str(&kind_raw)
                .ok_or_else(|| anyhow!("unknown job kind: {kind_raw}"))?,
            generation_id: row
                .try_get("generation_id")
                .context("generation_id column")?,
            scene_id: row.try_get("scene_id").context("scene_id column")?,
            status: JobStatus::from_str(&status_raw)
                .ok_or_else(|| anyhow!("unknown job status: {status_raw}"))?,
            attempts: row.try_get("attempts").context("attempts column")?,
            max_attempts: row.try_get("max_attempts").context("max_attempts column")?,
            last_error: row.try_get("last_error").context("last_error column")?,
            run_at: row.try_get("run_at").context("run_at column")?,
            created_at: row.try_get("created_at").context("created_at column")?,
        })
    }
}
