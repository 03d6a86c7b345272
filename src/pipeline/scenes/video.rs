use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::download_to_file;
use crate::error::{WorkerError, WorkerResult};
use crate::media::MediaInfo;
use crate::model::project::SceneProject;
use crate::model::scenario::SceneKind;
use crate::pipeline::registry::{PipelineContext, RenderedScene, ScenePipeline};
use crate::storage::scene_asset_key;

/// 切り出し+整形パイプライン。
///
/// ソース動画を `[fromSeconds, toSeconds)` でトリムし、レンダリング
/// 寸法へ縮小・レターボックスして h.264 mp4 に仕上げる。
pub(crate) struct VideoPipeline;

/// ベースクリップをローカルに作る。overlay / pip パイプラインも共用する。
pub(crate) async fn render_base_clip(
    project: &SceneProject,
    ctx: &PipelineContext,
) -> WorkerResult<(PathBuf, MediaInfo)> {
    let clip = project.inputs.video.as_ref().ok_or_else(|| {
        WorkerError::validation(format!(
            "scene {} ({}) has no video input",
            project.scene_id, project.kind
        ))
    })?;

    let source = ctx.temp_dir.join(format!("source-{}.mp4", project.scene_id));
    download_to_file(&ctx.http, &clip.url, &source).await?;

    let trimmed = ctx.temp_dir.join(format!("base-{}.mp4", project.scene_id));
    ctx.ffmpeg
        .trim_and_fit(
            &source,
            &trimmed,
            clip.from_seconds,
            clip.to_seconds,
            project.render_context,
        )
        .await?;

    // The encoded file is the ground truth for duration, not the requested range.
    let info = ctx.ffmpeg.probe(&trimmed).await?;
    debug!(
        scene_id = %project.scene_id,
        duration = info.duration,
        width = info.width,
        height = info.height,
        "base clip rendered"
    );
    Ok((trimmed, info))
}

#[async_trait]
impl ScenePipeline for VideoPipeline {
    fn can_handle(&self, kind: SceneKind) -> bool {
        kind == SceneKind::Video
    }

    async fn render(
        &self,
        project: &SceneProject,
        ctx: &PipelineContext,
    ) -> WorkerResult<RenderedScene> {
        let (clip, info) = render_base_clip(project, ctx).await?;

        let key = scene_asset_key(&project.scene_id);
        let stored = ctx
            .storage
            .put_file(&key, &clip, "video/mp4")
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
