use async_trait::async_trait;

use super::frames::render_overlay_layer;
use super::video::render_base_clip;
use crate::error::{WorkerError, WorkerResult};
use crate::model::project::{SceneExtra, SceneProject};
use crate::model::scenario::SceneKind;
use crate::pipeline::registry::{PipelineContext, RenderedScene, ScenePipeline};
use crate::storage::scene_asset_key;

/// ベースクリップへ情報パネルを焼き込むオーバーレイパイプライン。
///
/// レイアウトヒントに応じて右側パネルまたは全面ディマーを描き、
/// FFmpegのoverlayフィルタで合成する。尺はベースクリップに一致する。
pub(crate) struct OverlayPipeline;

#[async_trait]
impl ScenePipeline for OverlayPipeline {
    fn can_handle(&self, kind: SceneKind) -> bool {
        kind == SceneKind::Overlay
    }

    async fn render(
        &self,
        project: &SceneProject,
        ctx: &PipelineContext,
    ) -> WorkerResult<RenderedScene> {
        let (base, info) = render_base_clip(project, ctx).await?;

        let (layout_hint, text_content) = match &project.extra {
            SceneExtra::Overlay {
                layout_hint,
                text_content,
                ..
            } => (layout_hint.clone(), text_content.clone()),
            _ => ("side_panel_right".to_string(), None),
        };
        let text = text_content
            .or_else(|| project.scenario_item.detailed_request.text_content.clone())
            .or_else(|| project.scenario_item.detailed_request.description.clone());

        let width = project.render_context.width;
        let height = project.render_context.height;
        let font = ctx.font.clone();
        let layer = tokio::task::spawn_blocking(move || {
            render_overlay_layer(width, height, &layout_hint, text.as_deref(), font.as_deref())
        })
        .await
        .map_err(|error| WorkerError::Media(format!("overlay drawing task failed: {error}")))?;

        let layer_path = ctx.temp_dir.join(format!("overlay-{}.png", project.scene_id));
        layer
            .save(&layer_path)
            .map_err(|error| WorkerError::Media(format!("failed to write overlay layer: {error}")))?;

        let output = ctx.temp_dir.join(format!("overlayed-{}.mp4", project.scene_id));
        ctx.ffmpeg.overlay_image(&base, &layer_path, &output).await?;

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
