use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};
use crate::model::context::{GenerationRequest, ImageSource};
use crate::model::project::{ImageRef, RenderContext, SceneExtra, SceneInputs, SceneProject, VideoClipRef};
use crate::model::scenario::{Scenario, validate_for_construction};

/// フェーズ2: シナリオからシーンプロジェクトを組み立てる。
#[async_trait]
pub(crate) trait ConstructStage: Send + Sync {
    async fn build(
        &self,
        scenario: &Scenario,
        request: &GenerationRequest,
    ) -> WorkerResult<Vec<SceneProject>>;
}

pub(crate) struct ProjectConstructStage {
    render_width: u32,
    render_fps: u32,
}

impl ProjectConstructStage {
    pub(crate) fn new(render_width: u32, render_fps: u32) -> Self {
        Self {
            render_width,
            render_fps,
        }
    }
}

/// imageHints と入力画像idの部分一致。最初のヒント順・重複なし。
pub(crate) fn match_images(hints: &[String], images: &[ImageSource]) -> Vec<ImageRef> {
    let mut matched = Vec::new();
    let mut seen = HashSet::new();
    for hint in hints {
        let hint_lower = hint.to_lowercase();
        for image in images {
            let id_lower = image.id.to_lowercase();
            if id_lower.contains(&hint_lower) || hint_lower.contains(&id_lower) {
                if seen.insert(image.id.clone()) {
                    matched.push(ImageRef {
                        id: image.id.clone(),
                        url: image.url.clone(),
                    });
                }
            }
        }
    }
    matched
}

#[async_trait]
impl ConstructStage for ProjectConstructStage {
    async fn build(
        &self,
        scenario: &Scenario,
        request: &GenerationRequest,
    ) -> WorkerResult<Vec<SceneProject>> {
        validate_for_construction(scenario)?;

        let render_context =
            RenderContext::for_aspect(request.aspect_ratio, self.render_width, self.render_fps);

        let mut projects = Vec::with_capacity(scenario.timeline.len());
        for item in &scenario.timeline {
            let mut inputs = SceneInputs::default();

            if item.kind.requires_source_clip() {
                // Validated above: source id and range are present.
                let source_id = item.source_video_id.as_deref().unwrap_or_default();
                let source = request
                    .videos
                    .iter()
                    .find(|video| video.id == source_id)
                    .ok_or_else(|| {
                        WorkerError::ScenarioInvalid(format!(
                            "item {}: sourceVideoId {source_id} is not among the request videos",
                            item.id
                        ))
                    })?;
                inputs.video = Some(VideoClipRef {
                    id: source.id.clone(),
                    url: source.url.clone(),
                    from_seconds: item.from_seconds.unwrap_or_default(),
                    to_seconds: item.to_seconds.unwrap_or_default(),
                });
            }

            if !item.detailed_request.image_hints.is_empty() {
                inputs.images = match_images(&item.detailed_request.image_hints, &request.images);
            }

            projects.push(SceneProject {
                scene_id: item.id.clone(),
                kind: item.kind,
                scenario_item: item.clone(),
                render_context,
                inputs,
                extra: SceneExtra::from_item(item),
                debug_frames: Vec::new(),
            });
        }

        debug!(
            scenes = projects.len(),
            width = render_context.width,
            height = render_context.height,
            "scene projects constructed"
        );
        Ok(projects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::scenario::parse_scenario;
    use serde_json::json;

    fn request_with_sources() -> GenerationRequest {
        serde_json::from_value(json!({
            "prompt": "demo",
            "aspectRatio": 16.0 / 9.0,
            "videos": [{ "id": "vid-1", "url": "http://cdn/vid-1.mp4" }],
            "images": [
                { "id": "img-product", "url": "http://cdn/product.png" },
                { "id": "img-logo", "url": "http://cdn/logo.png" }
            ]
        }))
        .expect("request parses")
    }

    #[tokio::test]
    async fn video_items_resolve_source_urls() {
        let scenario = parse_scenario(&json!({
            "timeline": [{
                "id": "v1",
                "kind": "video",
                "sourceVideoId": "vid-1",
                "fromSeconds": 1.0,
                "toSeconds": 4.0,
                "detailedRequest": {}
            }]
        }))
        .expect("parses");

        let stage = ProjectConstructStage::new(1920, 30);
        let projects = stage
            .build(&scenario, &request_with_sources())
            .await
            .expect("builds");

        let clip = projects[0].inputs.video.as_ref().expect("video input");
        assert_eq!(clip.url, "http://cdn/vid-1.mp4");
        assert!((clip.from_seconds - 1.0).abs() < f64::EPSILON);
        assert!((clip.to_seconds - 4.0).abs() < f64::EPSILON);
        assert_eq!(projects[0].render_context.height, 1080);
    }

    #[tokio::test]
    async fn unknown_source_video_is_rejected() {
        let scenario = parse_scenario(&json!({
            "timeline": [{
                "id": "v1",
                "kind": "video",
                "sourceVideoId": "vid-missing",
                "fromSeconds": 0.0,
                "toSeconds": 2.0,
                "detailedRequest": {}
            }]
        }))
        .expect("parses");

        let stage = ProjectConstructStage::new(1920, 30);
        let error = stage
            .build(&scenario, &request_with_sources())
            .await
            .expect_err("unknown source");
        assert!(matches!(error, WorkerError::ScenarioInvalid(_)));
    }

    #[tokio::test]
    async fn image_hints_match_by_substring() {
        let scenario = parse_scenario(&json!({
            "timeline": [{
                "id": "b1",
                "kind": "banner",
                "durationSeconds": 2.0,
                "detailedRequest": { "imageHints": ["product"] }
            }]
        }))
        .expect("parses");

        let stage = ProjectConstructStage::new(1920, 30);
        let projects = stage
            .build(&scenario, &request_with_sources())
            .await
            .expect("builds");

        assert_eq!(projects[0].inputs.images.len(), 1);
        assert_eq!(projects[0].inputs.images[0].id, "img-product");
    }

    #[test]
    fn image_matching_deduplicates_across_hints() {
        let images = vec![
            ImageSource {
                id: "img-product".into(),
                url: "http://cdn/p.png".into(),
            },
        ];
        let matched = match_images(
            &["product".to_string(), "img".to_string()],
            &images,
        );
        assert_eq!(matched.len(), 1);
    }

    #[tokio::test]
    async fn odd_aspect_ratio_yields_even_height() {
        let scenario = parse_scenario(&json!({
            "timeline": [{
                "id": "b1",
                "kind": "banner",
                "durationSeconds": 1.0,
                "detailedRequest": {}
            }]
        }))
        .expect("parses");

        let mut request = request_with_sources();
        request.aspect_ratio = 5.83;
        let stage = ProjectConstructStage::new(1920, 30);
        let projects = stage.build(&scenario, &request).await.expect("builds");
        assert_eq!(projects[0].render_context.height % 2, 0);
    }
}
