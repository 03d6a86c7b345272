use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::ImageGenClient;
use crate::error::{WorkerError, WorkerResult};
use crate::events::{EventBus, EventPayload};
use crate::media::Ffmpeg;
use crate::model::project::SceneProject;
use crate::observability::metrics::Metrics;
use crate::pipeline::PhaseProgress;
use crate::pipeline::registry::{PipelineContext, PipelineRegistry};
use crate::pipeline::scenes::frames::BannerFont;
use crate::store::dao::SceneDao;
use crate::store::models::SceneRow;
use crate::storage::ObjectStorage;
use crate::util::tempdir::ScopedTempDir;

/// フェーズ3の集計結果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RenderOutcome {
    pub(crate) completed: usize,
    pub(crate) failed: usize,
}

/// フェーズ3: シーンレンダリング。
#[async_trait]
pub(crate) trait RenderStage: Send + Sync {
    /// 全シーンを有界並列でレンダリングする。
    ///
    /// 個々のシーンの失敗はそのシーン行に記録され、フェーズ全体は
    /// 続行する。
    async fn render_scenes(
        &self,
        generation_id: Uuid,
        projects: &[SceneProject],
        progress: &PhaseProgress,
    ) -> WorkerResult<RenderOutcome>;

    /// 保存済みスナップショットから1シーンだけ再レンダリングする。
    async fn render_single(&self, generation_id: Uuid, scene: &SceneRow) -> WorkerResult<()>;
}

pub(crate) struct SceneRenderStage {
    dao: Arc<dyn SceneDao>,
    events: EventBus,
    registry: Arc<PipelineRegistry>,
    storage: Arc<dyn ObjectStorage>,
    ffmpeg: Ffmpeg,
    http: reqwest::Client,
    image_gen: Arc<ImageGenClient>,
    font: Option<Arc<BannerFont>>,
    temp_root: PathBuf,
    concurrency: usize,
    metrics: Arc<Metrics>,
}

impl SceneRenderStage {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        dao: Arc<dyn SceneDao>,
        events: EventBus,
        registry: Arc<PipelineRegistry>,
        storage: Arc<dyn ObjectStorage>,
        ffmpeg: Ffmpeg,
        http: reqwest::Client,
        image_gen: Arc<ImageGenClient>,
        font: Option<Arc<BannerFont>>,
        temp_root: PathBuf,
        concurrency: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            dao,
            events,
            registry,
            storage,
            ffmpeg,
            http,
            image_gen,
            font,
            temp_root,
            concurrency: concurrency.max(1),
            metrics,
        }
    }

    fn pipeline_context(&self, temp_dir: PathBuf) -> PipelineContext {
        PipelineContext {
            storage: Arc::clone(&self.storage),
            ffmpeg: self.ffmpeg.clone(),
            http: self.http.clone(),
            image_gen: Arc::clone(&self.image_gen),
            font: self.font.clone(),
            temp_dir,
        }
    }

    /// 1シーンを処理し、成功可否を返す。エラーはシーン行へ吸収する。
    async fn render_one(
        &self,
        generation_id: Uuid,
        project: &SceneProject,
        ctx: &PipelineContext,
    ) -> bool {
        if let Err(error) = self
            .dao
            .mark_scene_processing(generation_id, &project.scene_id)
            .await
        {
            warn!(
                %generation_id,
                scene_id = %project.scene_id,
                error = %error,
                "failed to mark scene processing"
            );
        }

        match self.registry.render(project, ctx).await {
            Ok(rendered) => {
                let mut snapshot = project.clone();
                snapshot.debug_frames = rendered.debug_frames.clone();
                let snapshot_json = match serde_json::to_value(&snapshot) {
                    Ok(value) => value,
                    Err(error) => {
                        warn!(scene_id = %project.scene_id, error = %error, "failed to serialize scene snapshot");
                        serde_json::Value::Null
                    }
                };
                if let Err(error) = self
                    .dao
                    .mark_scene_completed(
                        generation_id,
                        &project.scene_id,
                        &rendered.asset_path,
                        &rendered.asset_url,
                        &snapshot_json,
                    )
                    .await
                {
                    warn!(scene_id = %project.scene_id, error = %error, "failed to mark scene completed");
                    return false;
                }
                self.events.publish(EventPayload::SceneComplete {
                    generation_id,
                    scene_id: project.scene_id.clone(),
                    scene_url: rendered.asset_url,
                });
                self.metrics.record_scene_rendered();
                true
            }
            Err(error) => {
                warn!(
                    %generation_id,
                    scene_id = %project.scene_id,
                    error = %error,
                    "scene render failed"
                );
                if let Err(dao_error) = self
                    .dao
                    .mark_scene_failed(generation_id, &project.scene_id, &error.to_string())
                    .await
                {
                    warn!(scene_id = %project.scene_id, error = %dao_error, "failed to mark scene failed");
                }
                self.metrics.record_scene_failed();
                false
            }
        }
    }
}

#[async_trait]
impl RenderStage for SceneRenderStage {
    async fn render_scenes(
        &self,
        generation_id: Uuid,
        projects: &[SceneProject],
        progress: &PhaseProgress,
    ) -> WorkerResult<RenderOutcome> {
        let temp = ScopedTempDir::create(&self.temp_root, &format!("generation-{generation_id}"))
            .await?;
        let ctx = self.pipeline_context(temp.path().to_path_buf());

        let total = projects.len().max(1);
        let mut outcome = RenderOutcome::default();
        let mut processed = 0usize;

        for batch in projects.chunks(self.concurrency) {
            let results = join_all(
                batch
                    .iter()
                    .map(|project| self.render_one(generation_id, project, &ctx)),
            )
            .await;

            for success in results {
                if success {
                    outcome.completed += 1;
                } else {
                    outcome.failed += 1;
                }
            }

            processed += batch.len();
            progress.report((processed * 100 / total) as i32).await;
        }

        temp.cleanup().await;

        info!(
            %generation_id,
            completed = outcome.completed,
            failed = outcome.failed,
            "scene rendering finished"
        );
        Ok(outcome)
    }

    async fn render_single(&self, generation_id: Uuid, scene: &SceneRow) -> WorkerResult<()> {
        let project: SceneProject = serde_json::from_value(scene.scene_project.clone())
            .map_err(|error| {
                WorkerError::validation(format!(
                    "scene {} has an unreadable sceneProject snapshot: {error}",
                    scene.scene_id
                ))
            })?;

        let temp = ScopedTempDir::create(
            &self.temp_root,
            &format!("regenerate-{generation_id}-{}", scene.scene_id),
        )
        .await?;
        let ctx = self.pipeline_context(temp.path().to_path_buf());

        if let Err(error) = self
            .dao
            .mark_scene_processing(generation_id, &scene.scene_id)
            .await
        {
            warn!(scene_id = %scene.scene_id, error = %error, "failed to mark scene processing");
        }

        let result = self.registry.render(&project, &ctx).await;
        temp.cleanup().await;

        match result {
            Ok(rendered) => {
                let mut snapshot = project;
                snapshot.debug_frames = rendered.debug_frames.clone();
                let snapshot_json = serde_json::to_value(&snapshot)
                    .unwrap_or(serde_json::Value::Null);
                self.dao
                    .mark_scene_completed(
                        generation_id,
                        &scene.scene_id,
                        &rendered.asset_path,
                        &rendered.asset_url,
                        &snapshot_json,
                    )
                    .await
                    .map_err(WorkerError::Internal)?;
                self.events.publish(EventPayload::SceneComplete {
                    generation_id,
                    scene_id: scene.scene_id.clone(),
                    scene_url: rendered.asset_url,
                });
                self.metrics.record_scene_rendered();
                Ok(())
            }
            Err(error) => {
                if let Err(dao_error) = self
                    .dao
                    .mark_scene_failed(generation_id, &scene.scene_id, &error.to_string())
                    .await
                {
                    warn!(scene_id = %scene.scene_id, error = %dao_error, "failed to mark scene failed");
                }
                self.metrics.record_scene_failed();
                Err(error)
            }
        }
    }
}
