use async_trait::async_trait;
use tracing::debug;

use super::video::render_base_clip;
use crate::error::{WorkerError, WorkerResult};
use crate::model::project::{PipPosition, PipSize, SceneExtra, SceneProject};
use crate::model::scenario::SceneKind;
use crate::pipeline::registry::{PipelineContext, RenderedScene, ScenePipeline};
use crate::storage::scene_asset_key;

/// ピクチャーインピクチャー合成パイプライン。
///
/// データモデル上セカンダリソースは存在しないため、ベースクリップ
/// 自身を縮小して角へ重ねる。専用のセカンダリ入力が導入されたら
/// ここが差し替わる想定。
pub(crate) struct PipPipeline;

#[async_trait]
impl ScenePipeline for PipPipeline {
    fn can_handle(&self, kind: SceneKind) -> bool {
        kind == SceneKind::Pip
    }

    async fn render(
        &self,
        project: &SceneProject,
        ctx: &PipelineContext,
    ) -> WorkerResult<RenderedScene> {
        let (base, info) = render_base_clip(project, ctx).await?;

        let (position, size) = match &project.extra {
            SceneExtra::Pip { position, size } => (*position, *size),
            _ => (PipPosition::default(), PipSize::default()),
        };

        debug!(
            scene_id = %project.scene_id,
            ?position,
            ?size,
            "compositing picture-in-picture from base clip"
        );

        let output = ctx.temp_dir.join(format!("pip-{}.mp4", project.scene_id));
        ctx.ffmpeg
            .picture_in_picture(&base, &base, &output, size.dimensions(), position)
            .await?;

        let key = scene_asset_key(&project.scene_id);
        let stored = ctx
            .storage
            .put_file(&key, &output, "video/mp4")
            .await
            .map_err(WorkerError::Internal)?;

        Ok(RenderedScene {
            asset_path: stored.path,
            asset_url: stored.url,
            duration_seconds: info.duration,
            debug_frames: Vec::new(),
        })
    }
}
