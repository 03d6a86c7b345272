use async_trait::async_trait;
use image::RgbaImage;
use image::imageops::FilterType;
use tracing::{debug, warn};

use super::download_bytes;
use super::frames::{
    Background, BannerLayout, TextAnimation, fit_within, render_banner_frame,
};
use crate::error::{WorkerError, WorkerResult};
use crate::model::project::{SceneExtra, SceneProject};
use crate::model::scenario::SceneKind;
use crate::pipeline::registry::{PipelineContext, RenderedScene, ScenePipeline};
use crate::storage::{debug_frame_key, scene_asset_key};

/// 静止画フレームを合成してエンコードするバナーパイプライン。
///
/// 背景グラデーション、前景画像（ある場合）、アニメーション付き
/// テキストを1フレームずつ描画し、PNG連番としてFFmpegへ渡す。
/// 先頭・中間・末尾のフレームはデバッグ用にそのままアップロードする。
pub(crate) struct BannerPipeline;

/// imageHints が画像の生成を明示的に求めているか。
pub(crate) fn hints_request_image(hints: &[String]) -> bool {
    const KEYWORDS: [&str; 4] = ["image", "photo", "picture", "illustration"];
    hints.iter().any(|hint| {
        let lowered = hint.to_lowercase();
        KEYWORDS.iter().any(|kw| lowered.contains(kw))
    })
}

/// バナーに載せるテキスト。extra → textContent → description の順で選ぶ。
pub(crate) fn banner_text(project: &SceneProject) -> Option<String> {
    let extra_text = match &project.extra {
        SceneExtra::Banner { text_content, .. } => text_content.clone(),
        _ => None,
    };
    extra_text
        .or_else(|| project.scenario_item.detailed_request.text_content.clone())
        .or_else(|| project.scenario_item.detailed_request.description.clone())
        .filter(|text| !text.trim().is_empty())
}

/// デバッグ用に採取するフレーム番号（先頭・中間・末尾、重複なし）。
pub(crate) fn snapshot_indices(frame_count: usize) -> Vec<usize> {
    let mut indices = vec![0, frame_count / 2, frame_count.saturating_sub(1)];
    indices.dedup();
    indices
}

impl BannerPipeline {
    /// 前景画像を解決する。入力画像を優先し、読めなければヒント次第で生成。
    async fn resolve_foreground(
        project: &SceneProject,
        ctx: &PipelineContext,
    ) -> WorkerResult<Option<RgbaImage>> {
        for image_ref in &project.inputs.images {
            match download_bytes(&ctx.http, &image_ref.url).await {
                Ok(bytes) => match image::load_from_memory(&bytes) {
                    Ok(decoded) => {
                        debug!(scene_id = %project.scene_id, image_id = %image_ref.id, "using input image");
                        return Ok(Some(decoded.to_rgba8()));
                    }
                    Err(error) => {
                        warn!(image_id = %image_ref.id, error = %error, "input image is not decodable");
                    }
                },
                Err(error) => {
                    warn!(image_id = %image_ref.id, error = %error, "input image not loadable");
                }
            }
        }

        let SceneExtra::Banner { image_hints, .. } = &project.extra else {
            return Ok(None);
        };
        if !hints_request_image(image_hints) {
            return Ok(None);
        }

        let aspect = f64::from(project.render_context.width) / f64::from(project.render_context.height);
        let prompt = project
            .scenario_item
            .detailed_request
            .description
            .clone()
            .unwrap_or_else(|| image_hints.join(", "));
        let bytes = ctx
            .image_gen
            .generate(&prompt, aspect)
            .await
            .map_err(|error| WorkerError::upstream("image-gen", error))?;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|error| WorkerError::upstream("image-gen", error))?;
        Ok(Some(decoded.to_rgba8()))
    }
}

#[async_trait]
impl ScenePipeline for BannerPipeline {
    fn can_handle(&self, kind: SceneKind) -> bool {
        kind == SceneKind::Banner
    }

    #[allow(clippy::too_many_lines)]
    async fn render(
        &self,
        project: &SceneProject,
        ctx: &PipelineContext,
    ) -> WorkerResult<RenderedScene> {
        let duration = project
            .scenario_item
            .duration_seconds
            .filter(|d| *d > 0.0)
            .ok_or_else(|| {
                WorkerError::validation(format!(
                    "banner scene {} has no positive durationSeconds",
                    project.scene_id
                ))
            })?;

        let (visual_style, animation_hints) = match &project.extra {
            SceneExtra::Banner {
                visual_style,
                animation_hints,
                ..
            } => (visual_style.clone(), animation_hints.clone()),
            _ => (Vec::new(), Vec::new()),
        };

        let width = project.render_context.width;
        let height = project.render_context.height;
        let fps = project.render_context.fps;
        let frame_count = (duration * f64::from(fps)).ceil().max(1.0) as usize;

        let foreground = Self::resolve_foreground(project, ctx).await?.map(|img| {
            let bounds = (
                (f64::from(width) * 0.6).round() as u32,
                (f64::from(height) * 0.6).round() as u32,
            );
            let (w, h) = fit_within(img.dimensions(), bounds);
            image::imageops::resize(&img, w, h, FilterType::Triangle)
        });

        if ctx.font.is_none() && banner_text(project).is_some() {
            warn!(scene_id = %project.scene_id, "no usable font found; banner text will be omitted");
        }

        let frames_dir = ctx.temp_dir.join(format!("frames-{}", project.scene_id));
        tokio::fs::create_dir_all(&frames_dir)
            .await
            .map_err(|error| WorkerError::Media(format!("failed to create frames dir: {error}")))?;

        // Frame rendering is pure CPU work; keep it off the async runtime.
        let text = banner_text(project);
        let font = ctx.font.clone();
        let background = Background::from_styles(&visual_style);
        let animation = TextAnimation::from_hints(&animation_hints);
        let render_dir = frames_dir.clone();
        let scene_id = project.scene_id.clone();
        tokio::task::spawn_blocking(move || -> WorkerResult<()> {
            let layout = BannerLayout {
                width,
                height,
                background,
                text: text.as_deref(),
                animation,
                font: font.as_deref(),
            };
            let denominator = (frame_count.saturating_sub(1)).max(1) as f64;
            for index in 0..frame_count {
                let progress = index as f64 / denominator;
                let frame = render_banner_frame(&layout, foreground.as_ref(), progress);
                let path = render_dir.join(format!("frame-{index:06}.png"));
                frame.save(&path).map_err(|error| {
                    WorkerError::Media(format!("failed to write banner frame {index}: {error}"))
                })?;
            }
            debug!(scene_id = %scene_id, frame_count, "banner frames rendered");
            Ok(())
        })
        .await
        .map_err(|error| WorkerError::Media(format!("frame rendering task failed: {error}")))??;

        // Snapshot frames for troubleshooting before the sequence is consumed.
        let mut debug_frames = Vec::new();
        for index in snapshot_indices(frame_count) {
            let frame_path = frames_dir.join(format!("frame-{index:06}.png"));
            let bytes = tokio::fs::read(&frame_path)
                .await
                .map_err(|error| WorkerError::Media(format!("missing snapshot frame: {error}")))?;
            let key = debug_frame_key(&project.scene_id, index);
            let stored = ctx
                .storage
                .put_bytes(&key, bytes, "image/png")
                .await
                .map_err(WorkerError::Internal)?;
            debug_frames.push(stored.url);
        }

        let output = ctx.temp_dir.join(format!("banner-{}.mp4", project.scene_id));
        ctx.ffmpeg
            .encode_frame_sequence(&frames_dir.join("frame-%06d.png"), fps, &output)
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
            duration_seconds: duration,
            debug_frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::project::{RenderContext, SceneInputs};
    use crate::model::scenario::{DetailedRequest, TimelineItem};

    fn banner_project(text_content: Option<&str>, description: Option<&str>) -> SceneProject {
        let item = TimelineItem {
            id: "b1".into(),
            kind: SceneKind::Banner,
            duration_seconds: Some(2.0),
            source_video_id: None,
            from_seconds: None,
            to_seconds: None,
            detailed_request: DetailedRequest {
                description: description.map(str::to_string),
                text_content: text_content.map(str::to_string),
                ..DetailedRequest::default()
            },
        };
        SceneProject {
            scene_id: "b1".into(),
            kind: SceneKind::Banner,
            extra: SceneExtra::from_item(&item),
            scenario_item: item,
            render_context: RenderContext::for_aspect(1.0, 1920, 30),
            inputs: SceneInputs::default(),
            debug_frames: Vec::new(),
        }
    }

    #[test]
    fn text_prefers_text_content_over_description() {
        let project = banner_project(Some("headline"), Some("fallback"));
        assert_eq!(banner_text(&project).as_deref(), Some("headline"));

        let fallback = banner_project(None, Some("fallback"));
        assert_eq!(banner_text(&fallback).as_deref(), Some("fallback"));

        let none = banner_project(None, None);
        assert_eq!(banner_text(&none), None);
    }

    #[test]
    fn image_hints_trigger_generation_only_for_image_words() {
        assert!(hints_request_image(&["a photo of a cat".to_string()]));
        assert!(hints_request_image(&["Illustration".to_string()]));
        assert!(!hints_request_image(&["abstract shapes".to_string()]));
        assert!(!hints_request_image(&[]));
    }

    #[test]
    fn snapshot_indices_cover_start_middle_end() {
        assert_eq!(snapshot_indices(60), vec![0, 30, 59]);
        assert_eq!(snapshot_indices(1), vec![0]);
        assert_eq!(snapshot_indices(2), vec![0, 1]);
    }
}
