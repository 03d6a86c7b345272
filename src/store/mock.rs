// テスト用のインメモリSceneDao実装
// プロダクションコードから分離して、DB接続なしで状態遷移を検証する

#![cfg_attr(not(test), allow(dead_code))]

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::Mutex;

#[cfg(test)]
use anyhow::{Result, anyhow};
#[cfg(test)]
use async_trait::async_trait;
#[cfg(test)]
use chrono::Utc;
#[cfg(test)]
use serde_json::Value;
#[cfg(test)]
use uuid::Uuid;

#[cfg(test)]
use super::dao::SceneDao;
#[cfg(test)]
use super::models::{
    GenerationPhase, GenerationStatus, NewScene, NewSceneGeneration, SceneGenerationRow, SceneRow,
    SceneStatus,
};

/// DB接続なしで動作するインメモリDAO。
///
/// 単一プロセス内の直列テストを前提に `std::sync::Mutex` で十分としている。
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemorySceneDao {
    generations: Mutex<HashMap<Uuid, SceneGenerationRow>>,
    scenes: Mutex<HashMap<(Uuid, String), SceneRow>>,
}

#[cfg(test)]
impl MemorySceneDao {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 進捗書き込みの単調性検証に使う現在値スナップショット。
    pub(crate) fn generation_snapshot(&self, id: Uuid) -> Option<SceneGenerationRow> {
        self.generations.lock().expect("generations lock").get(&id).cloned()
    }
}

#[cfg(test)]
#[async_trait]
impl SceneDao for MemorySceneDao {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_generation(&self, new: NewSceneGeneration) -> Result<SceneGenerationRow> {
        let now = Utc::now();
        let row = SceneGenerationRow {
            id: new.id,
            prompt: new.prompt,
            aspect_ratio: new.aspect_ratio,
            review_scenario: new.review_scenario,
            review_scenes: new.review_scenes,
            status: GenerationStatus::Queued,
            phase: GenerationPhase::Phase0,
            progress: 0,
            request: new.request,
            enriched_context: None,
            scenario: None,
            scene_projects: None,
            result_url: None,
            result_path: None,
            error: None,
            task_id: new.task_id,
            publication_id: new.publication_id,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.generations
            .lock()
            .expect("generations lock")
            .insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_generation(&self, id: Uuid) -> Result<Option<SceneGenerationRow>> {
        Ok(self
            .generations
            .lock()
            .expect("generations lock")
            .get(&id)
            .cloned())
    }

    async fn list_generations(
        &self,
        status: Option<GenerationStatus>,
        phase: Option<GenerationPhase>,
        limit: i64,
    ) -> Result<Vec<SceneGenerationRow>> {
        let mut rows: Vec<SceneGenerationRow> = self
            .generations
            .lock()
            .expect("generations lock")
            .values()
            .filter(|row| status.is_none_or(|s| row.status == s))
            .filter(|row| phase.is_none_or(|p| row.phase == p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn get_status(&self, id: Uuid) -> Result<Option<GenerationStatus>> {
        Ok(self
            .generations
            .lock()
            .expect("generations lock")
            .get(&id)
            .map(|row| row.status))
    }

    async fn set_phase(
        &self,
        id: Uuid,
        status: GenerationStatus,
        phase: GenerationPhase,
        progress: i32,
    ) -> Result<()> {
        let mut generations = self.generations.lock().expect("generations lock");
        let row = generations
            .get_mut(&id)
            .ok_or_else(|| anyhow!("generation not found: {id}"))?;
        row.status = status;
        row.phase = phase;
        row.progress = progress;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn set_progress(&self, id: Uuid, progress: i32) -> Result<()> {
        let mut generations = self.generations.lock().expect("generations lock");
        let row = generations
            .get_mut(&id)
            .ok_or_else(|| anyhow!("generation not found: {id}"))?;
        row.progress = row.progress.max(progress);
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn set_enriched_context(&self, id: Uuid, context: &Value) -> Result<()> {
        let mut generations = self.generations.lock().expect("generations lock");
        let row = generations
            .get_mut(&id)
            .ok_or_else(|| anyhow!("generation not found: {id}"))?;
        row.enriched_context = Some(context.clone());
        Ok(())
    }

    async fn set_scenario(&self, id: Uuid, scenario: &Value) -> Result<()> {
        let mut generations = self.generations.lock().expect("generations lock");
        let row = generations
            .get_mut(&id)
            .ok_or_else(|| anyhow!("generation not found: {id}"))?;
        row.scenario = Some(scenario.clone());
        Ok(())
    }

    async fn replace_scenario_for_review(&self, id: Uuid, scenario: &Value) -> Result<bool> {
        let mut generations = self.generations.lock().expect("generations lock");
        let Some(row) = generations.get_mut(&id) else {
            return Ok(false);
        };
        if row.status != GenerationStatus::WaitingForReview {
            return Ok(false);
        }
        row.scenario = Some(scenario.clone());
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_scene_projects(&self, id: Uuid, projects: &Value) -> Result<()> {
        let mut generations = self.generations.lock().expect("generations lock");
        let row = generations
            .get_mut(&id)
            .ok_or_else(|| anyhow!("generation not found: {id}"))?;
        row.scene_projects = Some(projects.clone());
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, result_url: &str, result_path: &str) -> Result<()> {
        let mut generations = self.generations.lock().expect("generations lock");
        let row = generations
            .get_mut(&id)
            .ok_or_else(|| anyhow!("generation not found: {id}"))?;
        row.status = GenerationStatus::Completed;
        row.progress = 100;
        row.result_url = Some(result_url.to_string());
        row.result_path = Some(result_path.to_string());
        row.error = None;
        row.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let mut generations = self.generations.lock().expect("generations lock");
        let row = generations
            .get_mut(&id)
            .ok_or_else(|| anyhow!("generation not found: {id}"))?;
        if row.status != GenerationStatus::Cancelled {
            row.status = GenerationStatus::Failed;
            row.error = Some(error.to_string());
        }
        Ok(())
    }

    async fn cancel_generation(&self, id: Uuid) -> Result<Option<SceneGenerationRow>> {
        let mut generations = self.generations.lock().expect("generations lock");
        let Some(row) = generations.get_mut(&id) else {
            return Ok(None);
        };
        row.status = GenerationStatus::Cancelled;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn insert_scenes(&self, generation_id: Uuid, scenes: &[NewScene]) -> Result<()> {
        let mut map = self.scenes.lock().expect("scenes lock");
        let now = Utc::now();
        for scene in scenes {
            map.insert(
                (generation_id, scene.scene_id.clone()),
                SceneRow {
                    id: Uuid::new_v4(),
                    generation_id,
                    scene_id: scene.scene_id.clone(),
                    kind: scene.kind,
                    order_index: scene.order_index,
                    status: SceneStatus::Pending,
                    progress: 0,
                    rendered_asset_path: None,
                    rendered_asset_url: None,
                    error: None,
                    scene_project: scene.scene_project.clone(),
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Ok(())
    }

    async fn list_scenes(&self, generation_id: Uuid) -> Result<Vec<SceneRow>> {
        let mut rows: Vec<SceneRow> = self
            .scenes
            .lock()
            .expect("scenes lock")
            .values()
            .filter(|row| row.generation_id == generation_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.order_index);
        Ok(rows)
    }

    async fn list_completed_scenes(&self, generation_id: Uuid) -> Result<Vec<SceneRow>> {
        let rows = self.list_scenes(generation_id).await?;
        Ok(rows
            .into_iter()
            .filter(|row| {
                row.status == SceneStatus::Completed && row.rendered_asset_path.is_some()
            })
            .collect())
    }

    async fn get_scene(&self, generation_id: Uuid, scene_id: &str) -> Result<Option<SceneRow>> {
        Ok(self
            .scenes
            .lock()
            .expect("scenes lock")
            .get(&(generation_id, scene_id.to_string()))
            .cloned())
    }

    async fn mark_scene_processing(&self, generation_id: Uuid, scene_id: &str) -> Result<()> {
        let mut map = self.scenes.lock().expect("scenes lock");
        let row = map
            .get_mut(&(generation_id, scene_id.to_string()))
            .ok_or_else(|| anyhow!("scene not found: {scene_id}"))?;
        row.status = SceneStatus::Processing;
        row.progress = 0;
        row.error = None;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_scene_completed(
        &self,
        generation_id: Uuid,
        scene_id: &str,
        asset_path: &str,
        asset_url: &str,
        scene_project: &Value,
    ) -> Result<()> {
        let mut map = self.scenes.lock().expect("scenes lock");
        let row = map
            .get_mut(&(generation_id, scene_id.to_string()))
            .ok_or_else(|| anyhow!("scene not found: {scene_id}"))?;
        row.status = SceneStatus::Completed;
        row.progress = 100;
        row.rendered_asset_path = Some(asset_path.to_string());
        row.rendered_asset_url = Some(asset_url.to_string());
        row.scene_project = scene_project.clone();
        row.error = None;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_scene_failed(
        &self,
        generation_id: Uuid,
        scene_id: &str,
        error: &str,
    ) -> Result<()> {
        let mut map = self.scenes.lock().expect("scenes lock");
        let row = map
            .get_mut(&(generation_id, scene_id.to_string()))
            .ok_or_else(|| anyhow!("scene not found: {scene_id}"))?;
        row.status = SceneStatus::Failed;
        row.error = Some(error.to_string());
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn reset_scene(&self, generation_id: Uuid, scene_id: &str) -> Result<bool> {
        let mut map = self.scenes.lock().expect("scenes lock");
        let Some(row) = map.get_mut(&(generation_id, scene_id.to_string())) else {
            return Ok(false);
        };
        row.status = SceneStatus::Pending;
        row.progress = 0;
        row.error = None;
        row.updated_at = Utc::now();
        Ok(true)
    }
}
