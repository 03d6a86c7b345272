use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::store::JobStore;
use super::types::{NewJob, QueuedJob};
use crate::error::WorkerResult;
use crate::pipeline::SceneOrchestrator;
use crate::queue::types::JobKind;

/// ジョブ種別をオーケストレータの入口へ割り当てる。
///
/// キューワーカーとインライン降格パスの両方が共有する。
pub(crate) struct JobRunner {
    orchestrator: Arc<SceneOrchestrator>,
}

impl JobRunner {
    pub(crate) fn new(orchestrator: Arc<SceneOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub(crate) async fn dispatch(&self, job: &NewJob) -> WorkerResult<()> {
        match job.kind {
            JobKind::Generate => self.orchestrator.execute(job.generation_id).await,
            JobKind::Continue => self.orchestrator.resume(job.generation_id).await,
            JobKind::RegenerateScene => {
                let scene_id = job.scene_id.as_deref().unwrap_or_default();
                self.orchestrator
                    .regenerate_scene(job.generation_id, scene_id)
                    .await
            }
        }
    }
}

/// 1プロセス内でジョブを直列に処理するワーカーループ。
pub(crate) struct QueueWorker {
    store: Arc<JobStore>,
    runner: Arc<JobRunner>,
    poll_interval: Duration,
    backoff_base_ms: u64,
}

/// ジョブ再試行の遅延。base * 2^(attempt-1)、上限 base * 32。
pub(crate) fn retry_delay(backoff_base_ms: u64, attempt: i32) -> Duration {
    let exponent = attempt.max(1).min(6) - 1;
    let delay = backoff_base_ms.saturating_mul(1_u64 << exponent);
    Duration::from_millis(delay.min(backoff_base_ms.saturating_mul(32)))
}

impl QueueWorker {
    pub(crate) fn new(
        store: Arc<JobStore>,
        runner: Arc<JobRunner>,
        poll_interval: Duration,
        backoff_base_ms: u64,
    ) -> Self {
        Self {
            store,
            runner,
            poll_interval,
            backoff_base_ms,
        }
    }

    pub(crate) async fn run(&self) -> Result<()> {
        loop {
            let job = match self.store.pick_next().await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    sleep(self.poll_interval).await;
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "failed to pick next job");
                    sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            self.process(job).await;
        }
    }

    /// 1ジョブの実行と結果の記録。1ワーカーにつき同時1ジョブ。
    async fn process(&self, job: QueuedJob) {
        info!(
            job_id = job.id,
            kind = job.kind.as_str(),
            generation_id = %job.generation_id,
            attempt = job.attempts,
            "processing scene job"
        );

        let new_job = NewJob {
            kind: job.kind,
            generation_id: job.generation_id,
            scene_id: job.scene_id.clone(),
        };

        match self.runner.dispatch(&new_job).await {
            Ok(()) => {
                if let Err(error) = self.store.mark_completed(job.id).await {
                    error!(job_id = job.id, error = %error, "failed to mark job completed");
                }
            }
            Err(error) => {
                let can_retry = error.is_retryable() && job.attempts < job.max_attempts;
                if can_retry {
                    let delay = retry_delay(self.backoff_base_ms, job.attempts);
                    warn!(
                        job_id = job.id,
                        generation_id = %job.generation_id,
                        attempt = job.attempts,
                        max_attempts = job.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "scene job failed, scheduling retry"
                    );
                    if let Err(store_error) = self
                        .store
                        .mark_retrying(job.id, &error.to_string(), delay)
                        .await
                    {
                        error!(job_id = job.id, error = %store_error, "failed to mark job retrying");
                    }
                } else {
                    error!(
                        job_id = job.id,
                        generation_id = %job.generation_id,
                        attempt = job.attempts,
                        error = %error,
                        "scene job failed permanently"
                    );
                    if let Err(store_error) =
                        self.store.mark_failed(job.id, &error.to_string()).await
                    {
                        error!(job_id = job.id, error = %store_error, "failed to mark job failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_from_the_base() {
        assert_eq!(retry_delay(2000, 1), Duration::from_millis(2000));
        assert_eq!(retry_delay(2000, 2), Duration::from_millis(4000));
        assert_eq!(retry_delay(2000, 3), Duration::from_millis(8000));
    }

    #[test]
    fn retry_delay_is_capped() {
        assert_eq!(retry_delay(2000, 10), Duration::from_millis(64000));
        assert_eq!(retry_delay(2000, 0), Duration::from_millis(2000));
    }
}
