use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

mod store;
mod types;
mod worker;

pub(crate) use store::JobStore;
pub(crate) use types::NewJob;
pub(crate) use worker::JobRunner;
use worker::QueueWorker;

use crate::error::{WorkerError, WorkerResult};
use crate::observability::metrics::Metrics;
use crate::util::error::is_connection_error;

/// ジョブキューの調整値。
#[derive(Debug, Clone)]
pub(crate) struct QueueSettings {
    pub(crate) workers: usize,
    pub(crate) poll_interval: Duration,
    pub(crate) max_attempts: i32,
    pub(crate) backoff_base_ms: u64,
    pub(crate) completed_retention: Duration,
    pub(crate) completed_keep_max: i64,
    pub(crate) failed_retention: Duration,
}

/// Postgres裏打ちのジョブキュー。
///
/// 投入はベストエフォート。バックエンドへ到達できない種類の失敗なら
/// インライン実行へ切り替える（リトライ制御は失われるが、状態遷移は
/// 通常どおり永続化される）。
pub struct SceneJobQueue {
    store: Arc<JobStore>,
    runner: Arc<JobRunner>,
    settings: QueueSettings,
    metrics: Arc<Metrics>,
    workers: Mutex<Vec<JoinHandle<Result<()>>>>,
}

impl SceneJobQueue {
    /// キューを初期化し、ワーカーと保持期間スイーパーを起動する。
    pub(crate) fn start(
        store: JobStore,
        runner: JobRunner,
        settings: QueueSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        let store = Arc::new(store);
        let runner = Arc::new(runner);

        let mut workers = Vec::new();
        for worker_id in 0..settings.workers {
            let worker = QueueWorker::new(
                Arc::clone(&store),
                Arc::clone(&runner),
                settings.poll_interval,
                settings.backoff_base_ms,
            );
            workers.push(tokio::spawn(async move {
                info!(worker_id, "starting scene job worker");
                worker.run().await
            }));
        }

        // Retention sweep: completed 1h / max 100, failed 24h by default.
        let sweep_store = Arc::clone(&store);
        let sweep_settings = settings.clone();
        workers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(300));
            loop {
                ticker.tick().await;
                match sweep_store
                    .sweep(
                        sweep_settings.completed_retention,
                        sweep_settings.completed_keep_max,
                        sweep_settings.failed_retention,
                    )
                    .await
                {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "swept finished jobs"),
                    Err(error) => warn!(error = %error, "job retention sweep failed"),
                }
            }
        }));

        info!(
            workers = settings.workers,
            max_attempts = settings.max_attempts,
            backoff_base_ms = settings.backoff_base_ms,
            "scene job queue initialized"
        );

        Self {
            store,
            runner,
            settings,
            metrics,
            workers: Mutex::new(workers),
        }
    }

    /// ジョブを投入する。キュー到達不能時はインライン実行へ降格する。
    pub(crate) async fn submit(&self, job: NewJob) -> WorkerResult<()> {
        match self.store.enqueue(&job, self.settings.max_attempts).await {
            Ok(job_id) => {
                debug!(job_id, kind = job.kind.as_str(), generation_id = %job.generation_id, "job enqueued");
                Ok(())
            }
            Err(error) if is_connection_error(&error) => {
                warn!(
                    kind = job.kind.as_str(),
                    generation_id = %job.generation_id,
                    error = %error,
                    "queue unavailable, executing directly"
                );
                self.metrics.record_inline_execution();
                // No retry policy in inline mode; the record carries the failure.
                if let Err(dispatch_error) = self.runner.dispatch(&job).await {
                    warn!(
                        generation_id = %job.generation_id,
                        error = %dispatch_error,
                        "inline job execution failed"
                    );
                }
                Ok(())
            }
            Err(error) => Err(WorkerError::Internal(anyhow::Error::new(error).context(
                "failed to enqueue scene job",
            ))),
        }
    }

    /// 指定生成の未実行ジョブを取り除く（キャンセル時）。
    pub(crate) async fn remove_queued(&self, generation_id: Uuid) -> Result<u64> {
        self.store.delete_pending_for(generation_id).await
    }

    /// 全ワーカーを停止する。
    pub async fn shutdown(&self) {
        info!("shutting down scene job queue");
        let workers = {
            let mut guard = self.workers.lock().expect("workers lock");
            std::mem::take(&mut *guard)
        };
        for worker in &workers {
            worker.abort();
        }
        for worker in workers {
            let _ = worker.await;
        }
        info!("all scene job workers stopped");
    }
}
