use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use super::PhaseProgress;
use super::compose::ComposeStage;
use super::construct::ConstructStage;
use super::render::RenderStage;
use super::scenario_gen::ScenarioStage;
use super::understand::UnderstandStage;
use crate::error::{WorkerError, WorkerResult};
use crate::events::{EventBus, EventPayload};
use crate::model::context::GenerationRequest;
use crate::model::scenario::parse_scenario;
use crate::observability::metrics::Metrics;
use crate::store::dao::SceneDao;
use crate::store::models::{
    GenerationPhase, GenerationStatus, NewScene, SceneGenerationRow,
};

/// 1回の実行がどう終わったか。
enum RunEnd {
    Completed,
    Paused,
    Cancelled,
}

/// パイプラインの5フェーズを束ねるステージ群。
pub(crate) struct Stages {
    pub(super) understand: Arc<dyn UnderstandStage>,
    pub(super) scenario: Arc<dyn ScenarioStage>,
    pub(super) construct: Arc<dyn ConstructStage>,
    pub(super) render: Arc<dyn RenderStage>,
    pub(super) compose: Arc<dyn ComposeStage>,
}

/// 生成レコードをフェーズ0→4へ進める状態機械。
///
/// 生成行への書き込みはこのオーケストレータだけが行う（RESTからの
/// シナリオ差し替えとキャンセルを除く）。キャンセルは各フェーズ境界で
/// ステータスを読み直して検出する協調方式。
pub(crate) struct SceneOrchestrator {
    dao: Arc<dyn SceneDao>,
    events: EventBus,
    stages: Stages,
    metrics: Arc<Metrics>,
}

/// テストと組み立てで使うビルダー。全ステージの指定が必須。
pub(crate) struct OrchestratorBuilder {
    understand: Option<Arc<dyn UnderstandStage>>,
    scenario: Option<Arc<dyn ScenarioStage>>,
    construct: Option<Arc<dyn ConstructStage>>,
    render: Option<Arc<dyn RenderStage>>,
    compose: Option<Arc<dyn ComposeStage>>,
}

impl OrchestratorBuilder {
    pub(crate) fn new() -> Self {
        Self {
            understand: None,
            scenario: None,
            construct: None,
            render: None,
            compose: None,
        }
    }

    pub(crate) fn with_understand_stage(mut self, stage: Arc<dyn UnderstandStage>) -> Self {
        self.understand = Some(stage);
        self
    }

    pub(crate) fn with_scenario_stage(mut self, stage: Arc<dyn ScenarioStage>) -> Self {
        self.scenario = Some(stage);
        self
    }

    pub(crate) fn with_construct_stage(mut self, stage: Arc<dyn ConstructStage>) -> Self {
        self.construct = Some(stage);
        self
    }

    pub(crate) fn with_render_stage(mut self, stage: Arc<dyn RenderStage>) -> Self {
        self.render = Some(stage);
        self
    }

    pub(crate) fn with_compose_stage(mut self, stage: Arc<dyn ComposeStage>) -> Self {
        self.compose = Some(stage);
        self
    }

    pub(crate) fn build(
        self,
        dao: Arc<dyn SceneDao>,
        events: EventBus,
        metrics: Arc<Metrics>,
    ) -> SceneOrchestrator {
        let stages = Stages {
            understand: self
                .understand
                .unwrap_or_else(|| panic!("understand stage must be configured before build")),
            scenario: self
                .scenario
                .unwrap_or_else(|| panic!("scenario stage must be configured before build")),
            construct: self
                .construct
                .unwrap_or_else(|| panic!("construct stage must be configured before build")),
            render: self
                .render
                .unwrap_or_else(|| panic!("render stage must be configured before build")),
            compose: self
                .compose
                .unwrap_or_else(|| panic!("compose stage must be configured before build")),
        };
        SceneOrchestrator {
            dao,
            events,
            stages,
            metrics,
        }
    }
}

impl SceneOrchestrator {
    pub(crate) fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// `generate` ジョブの入口。生成をフェーズ0から実行する。
    ///
    /// 失敗済みの生成は再試行で再実行される。完了・キャンセル済みは
    /// 何もしない（ジョブの重複配送に対して安全）。
    pub(crate) async fn execute(&self, generation_id: Uuid) -> WorkerResult<()> {
        let generation = self.load(generation_id).await?;
        if matches!(
            generation.status,
            GenerationStatus::Completed | GenerationStatus::Cancelled
        ) {
            info!(
                %generation_id,
                status = generation.status.as_str(),
                "generation already finished, skipping execution"
            );
            return Ok(());
        }

        self.metrics.record_generation_started();
        let started = Instant::now();
        let result = self.run_from_start(&generation).await;
        self.finish(generation_id, started, result).await
    }

    /// `continue` ジョブの入口。レビュー待ちの生成を該当フェーズから再開する。
    pub(crate) async fn resume(&self, generation_id: Uuid) -> WorkerResult<()> {
        let generation = self.load(generation_id).await?;
        let started = Instant::now();

        match generation.status {
            GenerationStatus::WaitingForReview => {
                let request = Self::request_of(&generation)?;
                let scenario_value = generation.scenario.clone().ok_or_else(|| {
                    WorkerError::InvalidState("generation has no scenario to resume from".into())
                })?;
                info!(%generation_id, "resuming from scenario review");
                let result = self
                    .run_from_construction(&generation, &request, scenario_value)
                    .await;
                self.finish(generation_id, started, result).await
            }
            GenerationStatus::WaitingForSceneReview => {
                info!(%generation_id, "resuming from scene review");
                let result = self
                    .compose_and_complete(generation_id)
                    .await
                    .map(|()| RunEnd::Completed);
                self.finish(generation_id, started, result).await
            }
            other => Err(WorkerError::InvalidState(format!(
                "cannot continue generation in status {}",
                other.as_str()
            ))),
        }
    }

    /// `regenerate-scene` ジョブの入口。
    pub(crate) async fn regenerate_scene(
        &self,
        generation_id: Uuid,
        scene_id: &str,
    ) -> WorkerResult<()> {
        let scene = self
            .dao
            .get_scene(generation_id, scene_id)
            .await
            .map_err(WorkerError::Internal)?
            .ok_or_else(|| WorkerError::NotFound(format!("scene {scene_id}")))?;
        self.stages.render.render_single(generation_id, &scene).await
    }

    async fn load(&self, generation_id: Uuid) -> WorkerResult<SceneGenerationRow> {
        self.dao
            .get_generation(generation_id)
            .await
            .map_err(WorkerError::Internal)?
            .ok_or_else(|| WorkerError::NotFound(format!("generation {generation_id}")))
    }

    fn request_of(generation: &SceneGenerationRow) -> WorkerResult<GenerationRequest> {
        serde_json::from_value(generation.request.clone()).map_err(|error| {
            WorkerError::Internal(anyhow::anyhow!(
                "stored generation request is unreadable: {error}"
            ))
        })
    }

    async fn finish(
        &self,
        generation_id: Uuid,
        started: Instant,
        result: WorkerResult<RunEnd>,
    ) -> WorkerResult<()> {
        match result {
            Ok(RunEnd::Completed) => {
                self.metrics
                    .record_generation_completed(started.elapsed().as_secs_f64());
                Ok(())
            }
            Ok(RunEnd::Paused | RunEnd::Cancelled) => Ok(()),
            Err(err) => {
                error!(%generation_id, error = %err, "generation failed");
                if let Err(dao_error) = self
                    .dao
                    .mark_failed(generation_id, &err.to_string())
                    .await
                {
                    error!(%generation_id, error = %dao_error, "failed to record generation failure");
                }
                self.events.publish(EventPayload::Error {
                    generation_id,
                    error: err.to_string(),
                });
                self.metrics.record_generation_failed();
                // Re-raise so the job layer applies its retry policy.
                Err(err)
            }
        }
    }

    async fn run_from_start(&self, generation: &SceneGenerationRow) -> WorkerResult<RunEnd> {
        let generation_id = generation.id;
        let request = Self::request_of(generation)?;

        // Phase 0 — resource understanding
        self.begin_phase(generation_id, GenerationPhase::Phase0).await?;
        let progress = self.phase_progress(generation_id, GenerationPhase::Phase0);
        let enriched = self
            .stages
            .understand
            .enrich(generation_id, &request, &progress)
            .await?;
        let enriched_json = serde_json::to_value(&enriched)
            .map_err(|error| WorkerError::Internal(error.into()))?;
        self.dao
            .set_enriched_context(generation_id, &enriched_json)
            .await
            .map_err(WorkerError::Internal)?;
        if self.observe_cancelled(generation_id).await? {
            return Ok(RunEnd::Cancelled);
        }

        // Phase 1 — scenario generation
        self.begin_phase(generation_id, GenerationPhase::Phase1).await?;
        let scenario_value = self.stages.scenario.generate(&request, &enriched).await?;
        self.dao
            .set_scenario(generation_id, &scenario_value)
            .await
            .map_err(WorkerError::Internal)?;
        self.phase_progress(generation_id, GenerationPhase::Phase1)
            .report(100)
            .await;
        if self.observe_cancelled(generation_id).await? {
            return Ok(RunEnd::Cancelled);
        }

        if generation.review_scenario {
            self.dao
                .set_phase(
                    generation_id,
                    GenerationStatus::WaitingForReview,
                    GenerationPhase::Phase1,
                    GenerationPhase::Phase1.scale_progress(100),
                )
                .await
                .map_err(WorkerError::Internal)?;
            info!(%generation_id, "paused for scenario review");
            return Ok(RunEnd::Paused);
        }

        self.run_from_construction(generation, &request, scenario_value)
            .await
    }

    /// フェーズ2以降。`continue`（シナリオレビュー後）もここへ入る。
    async fn run_from_construction(
        &self,
        generation: &SceneGenerationRow,
        request: &GenerationRequest,
        scenario_value: Value,
    ) -> WorkerResult<RunEnd> {
        let generation_id = generation.id;

        // Phase 2 — scene project construction
        self.begin_phase(generation_id, GenerationPhase::Phase2).await?;
        let scenario = parse_scenario(&scenario_value)?;
        let projects = self.stages.construct.build(&scenario, request).await?;

        let new_scenes: Vec<NewScene> = projects
            .iter()
            .enumerate()
            .map(|(index, project)| NewScene {
                scene_id: project.scene_id.clone(),
                kind: project.kind,
                order_index: index as i32,
                scene_project: serde_json::to_value(project).unwrap_or(Value::Null),
            })
            .collect();
        self.dao
            .insert_scenes(generation_id, &new_scenes)
            .await
            .map_err(WorkerError::Internal)?;
        let projects_json = serde_json::to_value(&projects)
            .map_err(|error| WorkerError::Internal(error.into()))?;
        self.dao
            .set_scene_projects(generation_id, &projects_json)
            .await
            .map_err(WorkerError::Internal)?;
        self.phase_progress(generation_id, GenerationPhase::Phase2)
            .report(100)
            .await;
        if self.observe_cancelled(generation_id).await? {
            return Ok(RunEnd::Cancelled);
        }

        // Phase 3 — scene rendering
        self.begin_phase(generation_id, GenerationPhase::Phase3).await?;
        let progress = self.phase_progress(generation_id, GenerationPhase::Phase3);
        self.stages
            .render
            .render_scenes(generation_id, &projects, &progress)
            .await?;
        if self.observe_cancelled(generation_id).await? {
            return Ok(RunEnd::Cancelled);
        }

        if generation.review_scenes {
            self.dao
                .set_phase(
                    generation_id,
                    GenerationStatus::WaitingForSceneReview,
                    GenerationPhase::Phase3,
                    GenerationPhase::Phase3.scale_progress(100),
                )
                .await
                .map_err(WorkerError::Internal)?;
            info!(%generation_id, "paused for scene review");
            return Ok(RunEnd::Paused);
        }

        self.compose_and_complete(generation_id).await?;
        Ok(RunEnd::Completed)
    }

    /// フェーズ4。合成して完了状態を書き、完了イベントを流す。
    async fn compose_and_complete(&self, generation_id: Uuid) -> WorkerResult<()> {
        self.begin_phase(generation_id, GenerationPhase::Phase4).await?;
        let (result_url, result_path) = self.stages.compose.compose(generation_id).await?;
        self.dao
            .mark_completed(generation_id, &result_url, &result_path)
            .await
            .map_err(WorkerError::Internal)?;
        self.events.publish(EventPayload::Progress {
            generation_id,
            progress: 100,
            phase: GenerationPhase::Phase4,
        });
        self.events.publish(EventPayload::GenerationComplete {
            generation_id,
            result_url,
        });
        info!(%generation_id, "generation completed");
        Ok(())
    }

    async fn begin_phase(
        &self,
        generation_id: Uuid,
        phase: GenerationPhase,
    ) -> WorkerResult<()> {
        let (base, _) = phase.progress_band();
        self.dao
            .set_phase(generation_id, GenerationStatus::Processing, phase, base)
            .await
            .map_err(WorkerError::Internal)?;
        self.events.publish(EventPayload::PhaseChange {
            generation_id,
            phase,
            progress: base,
        });
        Ok(())
    }

    fn phase_progress(&self, generation_id: Uuid, phase: GenerationPhase) -> PhaseProgress {
        PhaseProgress::new(
            Arc::clone(&self.dao),
            self.events.clone(),
            generation_id,
            phase,
        )
    }

    /// フェーズ境界のキャンセル検出。書き込み後に読み直す。
    async fn observe_cancelled(&self, generation_id: Uuid) -> WorkerResult<bool> {
        let status = self
            .dao
            .get_status(generation_id)
            .await
            .map_err(WorkerError::Internal)?;
        if status == Some(GenerationStatus::Cancelled) {
            info!(%generation_id, "cancellation observed at phase boundary");
            self.metrics.record_generation_cancelled();
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use prometheus::Registry;
    use serde_json::json;

    use super::*;
    use crate::model::context::EnrichedContext;
    use crate::model::project::SceneProject;
    use crate::model::scenario::Scenario;
    use crate::pipeline::render::{RenderOutcome, RenderStage};
    use crate::store::mock::MemorySceneDao;
    use crate::store::models::{NewSceneGeneration, SceneRow, SceneStatus};

    fn metrics() -> Arc<Metrics> {
        Arc::new(Metrics::new(&Registry::new()).expect("metrics build"))
    }

    fn banner_scenario_json() -> Value {
        json!({
            "timeline": [{
                "id": "s1",
                "kind": "banner",
                "durationSeconds": 2.0,
                "detailedRequest": { "textContent": "hello world" }
            }]
        })
    }

    struct RecordingUnderstand {
        order: Arc<Mutex<Vec<&'static str>>>,
        cancel_during: bool,
        dao: Arc<MemorySceneDao>,
    }

    #[async_trait]
    impl UnderstandStage for RecordingUnderstand {
        async fn enrich(
            &self,
            generation_id: Uuid,
            request: &GenerationRequest,
            progress: &PhaseProgress,
        ) -> WorkerResult<EnrichedContext> {
            self.order.lock().expect("order lock").push("understand");
            progress.report(50).await;
            if self.cancel_during {
                // Simulates DELETE arriving while transcription is in flight.
                self.dao
                    .cancel_generation(generation_id)
                    .await
                    .expect("cancel");
            }
            Ok(EnrichedContext {
                prompt: request.prompt.clone(),
                ..EnrichedContext::default()
            })
        }
    }

    struct RecordingScenario {
        order: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl ScenarioStage for RecordingScenario {
        async fn generate(
            &self,
            _request: &GenerationRequest,
            _context: &EnrichedContext,
        ) -> WorkerResult<Value> {
            self.order.lock().expect("order lock").push("scenario");
            if self.fail {
                return Err(WorkerError::ScenarioInvalid("empty timeline".into()));
            }
            Ok(banner_scenario_json())
        }
    }

    struct RecordingConstruct {
        order: Arc<Mutex<Vec<&'static str>>>,
        seen_text: Arc<Mutex<Option<String>>>,
    }

    #[async_trait]
    impl crate::pipeline::construct::ConstructStage for RecordingConstruct {
        async fn build(
            &self,
            scenario: &Scenario,
            request: &GenerationRequest,
        ) -> WorkerResult<Vec<SceneProject>> {
            self.order.lock().expect("order lock").push("construct");
            *self.seen_text.lock().expect("seen lock") = scenario.timeline[0]
                .detailed_request
                .text_content
                .clone();
            let stage = crate::pipeline::construct::ProjectConstructStage::new(1920, 30);
            stage.build(scenario, request).await
        }
    }

    struct RecordingRender {
        order: Arc<Mutex<Vec<&'static str>>>,
        dao: Arc<MemorySceneDao>,
    }

    #[async_trait]
    impl RenderStage for RecordingRender {
        async fn render_scenes(
            &self,
            generation_id: Uuid,
            projects: &[SceneProject],
            progress: &PhaseProgress,
        ) -> WorkerResult<RenderOutcome> {
            self.order.lock().expect("order lock").push("render");
            for project in projects {
                self.dao
                    .mark_scene_completed(
                        generation_id,
                        &project.scene_id,
                        &format!("scene-generation/scenes/{}/rendered.mp4", project.scene_id),
                        &format!("http://files/scenes/{}.mp4", project.scene_id),
                        &serde_json::to_value(project).expect("snapshot"),
                    )
                    .await
                    .expect("mark completed");
            }
            progress.report(100).await;
            Ok(RenderOutcome {
                completed: projects.len(),
                failed: 0,
            })
        }

        async fn render_single(
            &self,
            _generation_id: Uuid,
            _scene: &SceneRow,
        ) -> WorkerResult<()> {
            self.order.lock().expect("order lock").push("render_single");
            Ok(())
        }
    }

    struct RecordingCompose {
        order: Arc<Mutex<Vec<&'static str>>>,
        dao: Arc<MemorySceneDao>,
        fail_when_empty: bool,
    }

    #[async_trait]
    impl ComposeStage for RecordingCompose {
        async fn compose(&self, generation_id: Uuid) -> WorkerResult<(String, String)> {
            self.order.lock().expect("order lock").push("compose");
            let completed = self
                .dao
                .list_completed_scenes(generation_id)
                .await
                .expect("list scenes");
            if self.fail_when_empty && completed.is_empty() {
                return Err(WorkerError::NothingToCompose);
            }
            Ok((
                format!("http://files/generations/{generation_id}/final.mp4"),
                format!("scene-generation/generations/{generation_id}/final.mp4"),
            ))
        }
    }

    struct Fixture {
        dao: Arc<MemorySceneDao>,
        orchestrator: SceneOrchestrator,
        order: Arc<Mutex<Vec<&'static str>>>,
        seen_text: Arc<Mutex<Option<String>>>,
    }

    fn fixture(cancel_during_phase0: bool, scenario_fails: bool) -> Fixture {
        let dao = Arc::new(MemorySceneDao::new());
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_text = Arc::new(Mutex::new(None));

        let orchestrator = SceneOrchestrator::builder()
            .with_understand_stage(Arc::new(RecordingUnderstand {
                order: Arc::clone(&order),
                cancel_during: cancel_during_phase0,
                dao: Arc::clone(&dao),
            }))
            .with_scenario_stage(Arc::new(RecordingScenario {
                order: Arc::clone(&order),
                fail: scenario_fails,
            }))
            .with_construct_stage(Arc::new(RecordingConstruct {
                order: Arc::clone(&order),
                seen_text: Arc::clone(&seen_text),
            }))
            .with_render_stage(Arc::new(RecordingRender {
                order: Arc::clone(&order),
                dao: Arc::clone(&dao),
            }))
            .with_compose_stage(Arc::new(RecordingCompose {
                order: Arc::clone(&order),
                dao: Arc::clone(&dao),
                fail_when_empty: true,
            }))
            .build(
                dao.clone() as Arc<dyn SceneDao>,
                EventBus::new(),
                metrics(),
            );

        Fixture {
            dao,
            orchestrator,
            order,
            seen_text,
        }
    }

    async fn create_generation(
        dao: &MemorySceneDao,
        review_scenario: bool,
        review_scenes: bool,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let request = json!({ "prompt": "hello", "aspectRatio": 1.0 });
        dao.create_generation(NewSceneGeneration {
            id,
            prompt: "hello".into(),
            aspect_ratio: 1.0,
            review_scenario,
            review_scenes,
            request,
            task_id: None,
            publication_id: None,
        })
        .await
        .expect("create generation");
        id
    }

    #[tokio::test]
    async fn phases_run_in_order_and_generation_completes() {
        let fx = fixture(false, false);
        let id = create_generation(&fx.dao, false, false).await;

        fx.orchestrator.execute(id).await.expect("executes");

        let order = fx.order.lock().expect("order lock").clone();
        assert_eq!(order, vec!["understand", "scenario", "construct", "render", "compose"]);

        let row = fx.dao.generation_snapshot(id).expect("row");
        assert_eq!(row.status, GenerationStatus::Completed);
        assert_eq!(row.progress, 100);
        assert!(row.result_url.is_some());
        assert!(row.result_path.is_some());
        assert!(row.scenario.is_some());
        assert!(row.scene_projects.is_some());

        let scenes = fx.dao.list_scenes(id).await.expect("scenes");
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].scene_id, "s1");
        assert_eq!(scenes[0].status, SceneStatus::Completed);
    }

    #[tokio::test]
    async fn scenario_review_pauses_and_resume_uses_edited_scenario() {
        let fx = fixture(false, false);
        let id = create_generation(&fx.dao, true, false).await;

        fx.orchestrator.execute(id).await.expect("executes");

        let row = fx.dao.generation_snapshot(id).expect("row");
        assert_eq!(row.status, GenerationStatus::WaitingForReview);
        assert_eq!(row.phase, GenerationPhase::Phase1);
        assert_eq!(row.progress, 40);
        assert_eq!(
            fx.order.lock().expect("order lock").clone(),
            vec!["understand", "scenario"]
        );

        // Reviewer edits the scenario text before continuing.
        let mut edited = banner_scenario_json();
        edited["timeline"][0]["detailedRequest"]["textContent"] = json!("edited");
        assert!(
            fx.dao
                .replace_scenario_for_review(id, &edited)
                .await
                .expect("replace scenario")
        );

        fx.orchestrator.resume(id).await.expect("resumes");

        let row = fx.dao.generation_snapshot(id).expect("row");
        assert_eq!(row.status, GenerationStatus::Completed);
        assert_eq!(
            fx.seen_text.lock().expect("seen lock").as_deref(),
            Some("edited")
        );
    }

    #[tokio::test]
    async fn scene_review_pauses_at_eighty_percent() {
        let fx = fixture(false, false);
        let id = create_generation(&fx.dao, false, true).await;

        fx.orchestrator.execute(id).await.expect("executes");

        let row = fx.dao.generation_snapshot(id).expect("row");
        assert_eq!(row.status, GenerationStatus::WaitingForSceneReview);
        assert_eq!(row.phase, GenerationPhase::Phase3);
        assert_eq!(row.progress, 80);

        fx.orchestrator.resume(id).await.expect("resumes");
        let row = fx.dao.generation_snapshot(id).expect("row");
        assert_eq!(row.status, GenerationStatus::Completed);
    }

    #[tokio::test]
    async fn cancellation_is_observed_at_the_next_phase_boundary() {
        let fx = fixture(true, false);
        let id = create_generation(&fx.dao, false, false).await;

        fx.orchestrator.execute(id).await.expect("executes");

        let row = fx.dao.generation_snapshot(id).expect("row");
        assert_eq!(row.status, GenerationStatus::Cancelled);
        // Later stages never ran.
        assert_eq!(fx.order.lock().expect("order lock").clone(), vec!["understand"]);
        assert!(row.result_url.is_none());
    }

    #[tokio::test]
    async fn scenario_failure_marks_generation_failed_and_reraises() {
        let fx = fixture(false, true);
        let id = create_generation(&fx.dao, false, false).await;

        let error = fx.orchestrator.execute(id).await.expect_err("fails");
        assert!(matches!(error, WorkerError::ScenarioInvalid(_)));

        let row = fx.dao.generation_snapshot(id).expect("row");
        assert_eq!(row.status, GenerationStatus::Failed);
        assert!(row.error.expect("error text").contains("scenario invalid"));
    }

    #[tokio::test]
    async fn resume_rejects_non_paused_generations() {
        let fx = fixture(false, false);
        let id = create_generation(&fx.dao, false, false).await;

        let error = fx.orchestrator.resume(id).await.expect_err("invalid state");
        assert!(matches!(error, WorkerError::InvalidState(_)));
    }

    #[tokio::test]
    async fn executing_a_cancelled_generation_is_a_no_op() {
        let fx = fixture(false, false);
        let id = create_generation(&fx.dao, false, false).await;
        fx.dao.cancel_generation(id).await.expect("cancel");

        fx.orchestrator.execute(id).await.expect("no-op");
        assert!(fx.order.lock().expect("order lock").is_empty());
        let row = fx.dao.generation_snapshot(id).expect("row");
        assert_eq!(row.status, GenerationStatus::Cancelled);
    }

    #[tokio::test]
    async fn missing_generation_is_not_found() {
        let fx = fixture(false, false);
        let error = fx
            .orchestrator
            .execute(Uuid::new_v4())
            .await
            .expect_err("not found");
        assert!(matches!(error, WorkerError::NotFound(_)));
    }
}
