use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::clients::ImageGenClient;
use crate::error::{WorkerError, WorkerResult};
use crate::media::Ffmpeg;
use crate::model::project::SceneProject;
use crate::model::scenario::SceneKind;
use crate::pipeline::scenes::frames::BannerFont;
use crate::storage::ObjectStorage;

/// パイプラインへ渡される実行環境。
///
/// `temp_dir` は生成（または単発再生成）ごとに一意で、フェーズ終了時に
/// 呼び出し側が削除する。
pub(crate) struct PipelineContext {
    pub(crate) storage: Arc<dyn ObjectStorage>,
    pub(crate) ffmpeg: Ffmpeg,
    pub(crate) http: reqwest::Client,
    pub(crate) image_gen: Arc<ImageGenClient>,
    pub(crate) font: Option<Arc<BannerFont>>,
    pub(crate) temp_dir: PathBuf,
}

/// レンダリング結果。アセットはアップロード済みで、パス/URLを持ち帰る。
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RenderedScene {
    pub(crate) asset_path: String,
    pub(crate) asset_url: String,
    pub(crate) duration_seconds: f64,
    pub(crate) debug_frames: Vec<String>,
}

/// シーン種別ごとのレンダラ。
///
/// 新しい種別は登録によってのみ追加される。オーケストレータ側に
/// 種別分岐は存在しない。
#[async_trait]
pub(crate) trait ScenePipeline: Send + Sync {
    fn can_handle(&self, kind: SceneKind) -> bool;
    async fn render(
        &self,
        project: &SceneProject,
        ctx: &PipelineContext,
    ) -> WorkerResult<RenderedScene>;
}

/// 登録順に探索するインプロセスのパイプライン表。最初の一致が勝つ。
#[derive(Default)]
pub(crate) struct PipelineRegistry {
    pipelines: Vec<Arc<dyn ScenePipeline>>,
}

impl PipelineRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, pipeline: Arc<dyn ScenePipeline>) {
        self.pipelines.push(pipeline);
    }

    pub(crate) fn select(&self, kind: SceneKind) -> Option<&Arc<dyn ScenePipeline>> {
        self.pipelines.iter().find(|p| p.can_handle(kind))
    }

    pub(crate) async fn render(
        &self,
        project: &SceneProject,
        ctx: &PipelineContext,
    ) -> WorkerResult<RenderedScene> {
        let pipeline = self
            .select(project.kind)
            .ok_or(WorkerError::NoPipeline(project.kind))?;
        pipeline.render(project, ctx).await
    }

    /// 標準の4パイプライン（video / banner / overlay / pip）を登録した表。
    pub(crate) fn with_default_pipelines() -> Self {
        use crate::pipeline::scenes::{
            banner::BannerPipeline, overlay::OverlayPipeline, pip::PipPipeline,
            video::VideoPipeline,
        };
        let mut registry = Self::new();
        registry.register(Arc::new(VideoPipeline));
        registry.register(Arc::new(BannerPipeline));
        registry.register(Arc::new(OverlayPipeline));
        registry.register(Arc::new(PipPipeline));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubPipeline {
        kind: SceneKind,
    }

    #[async_trait]
    impl ScenePipeline for StubPipeline {
        fn can_handle(&self, kind: SceneKind) -> bool {
            kind == self.kind
        }

        async fn render(
            &self,
            _project: &SceneProject,
            _ctx: &PipelineContext,
        ) -> WorkerResult<RenderedScene> {
            unreachable!("selection tests never render")
        }
    }

    #[test]
    fn select_returns_first_matching_pipeline() {
        let mut registry = PipelineRegistry::new();
        registry.register(Arc::new(StubPipeline {
            kind: SceneKind::Video,
        }));
        registry.register(Arc::new(StubPipeline {
            kind: SceneKind::Banner,
        }));

        assert!(registry.select(SceneKind::Video).is_some());
        assert!(registry.select(SceneKind::Banner).is_some());
        assert!(registry.select(SceneKind::Pip).is_none());
    }

    #[test]
    fn default_registry_covers_renderable_kinds() {
        let registry = PipelineRegistry::with_default_pipelines();
        for kind in [
            SceneKind::Video,
            SceneKind::Banner,
            SceneKind::Overlay,
            SceneKind::Pip,
        ] {
            assert!(registry.select(kind).is_some(), "missing pipeline for {kind}");
        }
        assert!(registry.select(SceneKind::Transition).is_none());
        assert!(registry.select(SceneKind::Blank).is_none());
    }
}
