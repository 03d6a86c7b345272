use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::models::{
    GenerationPhase, GenerationStatus, NewScene, NewSceneGeneration, SceneGenerationRow, SceneRow,
    SceneStatus,
};
use crate::model::scenario::SceneKind;

/// 生成レコードとシーン行の永続化層。
///
/// オーケストレータとRESTハンドラはこのトレイト越しにのみDBへ触れる。
/// 生成行の書き込みはオーケストレータが単一ライターで、シーン行は
/// フェーズ3（と再生成ジョブ）だけが書く。
#[async_trait]
pub(crate) trait SceneDao: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn create_generation(&self, new: NewSceneGeneration) -> Result<SceneGenerationRow>;
    async fn get_generation(&self, id: Uuid) -> Result<Option<SceneGenerationRow>>;
    async fn list_generations(
        &self,
        status: Option<GenerationStatus>,
        phase: Option<GenerationPhase>,
        limit: i64,
    ) -> Result<Vec<SceneGenerationRow>>;
    async fn get_status(&self, id: Uuid) -> Result<Option<GenerationStatus>>;

    async fn set_phase(
        &self,
        id: Uuid,
        status: GenerationStatus,
        phase: GenerationPhase,
        progress: i32,
    ) -> Result<()>;
    async fn set_progress(&self, id: Uuid, progress: i32) -> Result<()>;
    async fn set_enriched_context(&self, id: Uuid, context: &Value) -> Result<()>;
    async fn set_scenario(&self, id: Uuid, scenario: &Value) -> Result<()>;
    /// レビュー待ちの生成に限ってシナリオを差し替える。
    ///
    /// # Returns
    /// 行が更新された場合は `true`。対象が存在しないかレビュー待ちで
    /// なければ `false`。
    async fn replace_scenario_for_review(&self, id: Uuid, scenario: &Value) -> Result<bool>;
    async fn set_scene_projects(&self, id: Uuid, projects: &Value) -> Result<()>;
    async fn mark_completed(&self, id: Uuid, result_url: &str, result_path: &str) -> Result<()>;
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()>;
    /// 生成をキャンセル状態にする（冪等）。
    async fn cancel_generation(&self, id: Uuid) -> Result<Option<SceneGenerationRow>>;

    async fn insert_scenes(&self, generation_id: Uuid, scenes: &[NewScene]) -> Result<()>;
    async fn list_scenes(&self, generation_id: Uuid) -> Result<Vec<SceneRow>>;
    /// 合成対象: status=completed かつ renderedAssetPath 非NULL、orderIndex 昇順。
    async fn list_completed_scenes(&self, generation_id: Uuid) -> Result<Vec<SceneRow>>;
    async fn get_scene(&self, generation_id: Uuid, scene_id: &str) -> Result<Option<SceneRow>>;
    async fn mark_scene_processing(&self, generation_id: Uuid, scene_id: &str) -> Result<()>;
    async fn mark_scene_completed(
        &self,
        generation_id: Uuid,
        scene_id: &str,
        asset_path: &str,
        asset_url: &str,
        scene_project: &Value,
    ) -> Result<()>;
    async fn mark_scene_failed(
        &self,
        generation_id: Uuid,
        scene_id: &str,
        error: &str,
    ) -> Result<()>;
    async fn reset_scene(&self, generation_id: Uuid, scene_id: &str) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub(crate) struct PgSceneDao {
    pool: PgPool,
}

impl PgSceneDao {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_generation(row: &PgRow) -> Result<SceneGenerationRow> {
        let status_raw: String = row.try_get("status").context("status column")?;
        let phase_raw: String = row.try_get("phase").context("phase column")?;
        Ok(SceneGenerationRow {
            id: row.try_get("id").context("id column")?,
            prompt: row.try_get("prompt").context("prompt column")?,
            aspect_ratio: row.try_get("aspect_ratio").context("aspect_ratio column")?,
            review_scenario: row
                .try_get("review_scenario")
                .context("review_scenario column")?,
            review_scenes: row
                .try_get("review_scenes")
                .context("review_scenes column")?,
            status: GenerationStatus::from_str(&status_raw)
                .ok_or_else(|| anyhow!("unknown generation status: {status_raw}"))?,
            phase: GenerationPhase::from_str(&phase_raw)
                .ok_or_else(|| anyhow!("unknown generation phase: {phase_raw}"))?,
            progress: row.try_get("progress").context("progress column")?,
            request: row.try_get("request").context("request column")?,
            enriched_context: row
                .try_get("enriched_context")
                .context("enriched_context column")?,
            scenario: row.try_get("scenario").context("scenario column")?,
            scene_projects: row
                .try_get("scene_projects")
                .context("scene_projects column")?,
            result_url: row.try_get("result_url").context("result_url column")?,
            result_path: row.try_get("result_path").context("result_path column")?,
            error: row.try_get("error").context("error column")?,
            task_id: row.try_get("task_id").context("task_id column")?,
            publication_id: row
                .try_get("publication_id")
                .context("publication_id column")?,
            created_at: row.try_get("created_at").context("created_at column")?,
            updated_at: row.try_get("updated_at").context("updated_at column")?,
            completed_at: row.try_get("completed_at").context("completed_at column")?,
        })
    }

    fn row_to_scene(row: &PgRow) -> Result<SceneRow> {
        let status_raw: String = row.try_get("status").context("status column")?;
        let kind_raw: String = row.try_get("kind").context("kind column")?;
        let kind: SceneKind = serde_json::from_value(Value::String(kind_raw.clone()))
            .map_err(|_| anyhow!("unknown scene kind: {kind_raw}"))?;
        Ok(SceneRow {
            id: row.try_get("id").context("id column")?,
            generation_id: row
                .try_get("generation_id")
                .context("generation_id column")?,
            scene_id: row.try_get("scene_id").context("scene_id column")?,
            kind,
            order_index: row.try_get("order_index").context("order_index column")?,
            status: SceneStatus::from_str(&status_raw)
                .ok_or_else(|| anyhow!("unknown scene status: {status_raw}"))?,
            progress: row.try_get("progress").context("progress column")?,
            rendered_asset_path: row
                .try_get("rendered_asset_path")
                .context("rendered_asset_path column")?,
            rendered_asset_url: row
                .try_get("rendered_asset_url")
                .context("rendered_asset_url column")?,
            error: row.try_get("error").context("error column")?,
            scene_project: row
                .try_get("scene_project")
                .context("scene_project column")?,
            created_at: row.try_get("created_at").context("created_at column")?,
            updated_at: row.try_get("updated_at").context("updated_at column")?,
        })
    }
}

const GENERATION_COLUMNS: &str = "id, prompt, aspect_ratio, review_scenario, review_scenes, \
     status, phase, progress, request, enriched_context, scenario, scene_projects, \
     result_url, result_path, error, task_id, publication_id, created_at, updated_at, completed_at";

const SCENE_COLUMNS: &str = "id, generation_id, scene_id, kind, order_index, status, progress, \
     rendered_asset_path, rendered_asset_url, error, scene_project, created_at, updated_at";

#[async_trait]
impl SceneDao for PgSceneDao {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("database ping failed")?;
        Ok(())
    }

    async fn create_generation(&self, new: NewSceneGeneration) -> Result<SceneGenerationRow> {
        let row = sqlx::query(&format!(
            r"
            INSERT INTO scene_generations
                (id, prompt, aspect_ratio, review_scenario, review_scenes,
                 status, phase, progress, request, task_id, publication_id)
            VALUES ($1, $2, $3, $4, $5, 'queued', 'phase0', 0, $6, $7, $8)
            RETURNING {GENERATION_COLUMNS}
            "
        ))
        .bind(new.id)
        .bind(&new.prompt)
        .bind(new.aspect_ratio)
        .bind(new.review_scenario)
        .bind(new.review_scenes)
        .bind(&new.request)
        .bind(&new.task_id)
        .bind(&new.publication_id)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert scene generation")?;

        Self::row_to_generation(&row)
    }

    async fn get_generation(&self, id: Uuid) -> Result<Option<SceneGenerationRow>> {
        let row = sqlx::query(&format!(
            "SELECT {GENERATION_COLUMNS} FROM scene_generations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch scene generation")?;

        row.as_ref().map(Self::row_to_generation).transpose()
    }

    async fn list_generations(
        &self,
        status: Option<GenerationStatus>,
        phase: Option<GenerationPhase>,
        limit: i64,
    ) -> Result<Vec<SceneGenerationRow>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {GENERATION_COLUMNS}
            FROM scene_generations
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR phase = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "
        ))
        .bind(status.map(GenerationStatus::as_str))
        .bind(phase.map(GenerationPhase::as_str))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to list scene generations")?;

        rows.iter().map(Self::row_to_generation).collect()
    }

    async fn get_status(&self, id: Uuid) -> Result<Option<GenerationStatus>> {
        let row = sqlx::query("SELECT status FROM scene_generations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch generation status")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("status").context("status column")?;
        GenerationStatus::from_str(&raw)
            .map(Some)
            .ok_or_else(|| anyhow!("unknown generation status: {raw}"))
    }

    async fn set_phase(
        &self,
        id: Uuid,
        status: GenerationStatus,
        phase: GenerationPhase,
        progress: i32,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE scene_generations
            SET status = $2, phase = $3, progress = $4, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(phase.as_str())
        .bind(progress)
        .execute(&self.pool)
        .await
        .context("failed to update generation phase")?;
        Ok(())
    }

    async fn set_progress(&self, id: Uuid, progress: i32) -> Result<()> {
        sqlx::query(
            r"
            UPDATE scene_generations
            SET progress = GREATEST(progress, $2), updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(progress)
        .execute(&self.pool)
        .await
        .context("failed to update generation progress")?;
        Ok(())
    }

    async fn set_enriched_context(&self, id: Uuid, context: &Value) -> Result<()> {
        sqlx::query(
            "UPDATE scene_generations SET enriched_context = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(context)
        .execute(&self.pool)
        .await
        .context("failed to store enriched context")?;
        Ok(())
    }

    async fn set_scenario(&self, id: Uuid, scenario: &Value) -> Result<()> {
        sqlx::query("UPDATE scene_generations SET scenario = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(scenario)
            .execute(&self.pool)
            .await
            .context("failed to store scenario")?;
        Ok(())
    }

    async fn replace_scenario_for_review(&self, id: Uuid, scenario: &Value) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE scene_generations
            SET scenario = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'waiting_for_review'
            ",
        )
        .bind(id)
        .bind(scenario)
        .execute(&self.pool)
        .await
        .context("failed to replace scenario")?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_scene_projects(&self, id: Uuid, projects: &Value) -> Result<()> {
        sqlx::query(
            "UPDATE scene_generations SET scene_projects = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(projects)
        .execute(&self.pool)
        .await
        .context("failed to store scene projects")?;
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, result_url: &str, result_path: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE scene_generations
            SET status = 'completed', progress = 100, result_url = $2, result_path = $3,
                error = NULL, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(result_url)
        .bind(result_path)
        .execute(&self.pool)
        .await
        .context("failed to mark generation completed")?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE scene_generations
            SET status = 'failed', error = $2, updated_at = NOW()
            WHERE id = $1 AND status <> 'cancelled'
            ",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("failed to mark generation failed")?;
        Ok(())
    }

    async fn cancel_generation(&self, id: Uuid) -> Result<Option<SceneGenerationRow>> {
        let row = sqlx::query(&format!(
            r"
            UPDATE scene_generations
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1
            RETURNING {GENERATION_COLUMNS}
            "
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to cancel generation")?;

        row.as_ref().map(Self::row_to_generation).transpose()
    }

    async fn insert_scenes(&self, generation_id: Uuid, scenes: &[NewScene]) -> Result<()> {
        if scenes.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        for scene in scenes {
            sqlx::query(
                r"
                INSERT INTO scenes
                    (id, generation_id, scene_id, kind, order_index, status, progress, scene_project)
                VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6)
                ON CONFLICT (generation_id, scene_id) DO UPDATE
                SET kind = EXCLUDED.kind,
                    order_index = EXCLUDED.order_index,
                    status = 'pending',
                    progress = 0,
                    error = NULL,
                    scene_project = EXCLUDED.scene_project,
                    updated_at = NOW()
                ",
            )
            .bind(Uuid::new_v4())
            .bind(generation_id)
            .bind(&scene.scene_id)
            .bind(scene.kind.as_str())
            .bind(scene.order_index)
            .bind(&scene.scene_project)
            .execute(&mut *tx)
            .await
            .context("failed to insert scene row")?;
        }

        tx.commit().await.context("failed to commit scene rows")?;
        Ok(())
    }

    async fn list_scenes(&self, generation_id: Uuid) -> Result<Vec<SceneRow>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {SCENE_COLUMNS}
            FROM scenes
            WHERE generation_id = $1
            ORDER BY order_index ASC
            "
        ))
        .bind(generation_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list scenes")?;

        rows.iter().map(Self::row_to_scene).collect()
    }

    async fn list_completed_scenes(&self, generation_id: Uuid) -> Result<Vec<SceneRow>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {SCENE_COLUMNS}
            FROM scenes
            WHERE generation_id = $1
              AND status = 'completed'
              AND rendered_asset_path IS NOT NULL
            ORDER BY order_index ASC
            "
        ))
        .bind(generation_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list completed scenes")?;

        rows.iter().map(Self::row_to_scene).collect()
    }

    async fn get_scene(&self, generation_id: Uuid, scene_id: &str) -> Result<Option<SceneRow>> {
        let row = sqlx::query(&format!(
            "SELECT {SCENE_COLUMNS} FROM scenes WHERE generation_id = $1 AND scene_id = $2"
        ))
        .bind(generation_id)
        .bind(scene_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch scene")?;

        row.as_ref().map(Self::row_to_scene).transpose()
    }

    async fn mark_scene_processing(&self, generation_id: Uuid, scene_id: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE scenes
            SET status = 'processing', progress = 0, error = NULL, updated_at = NOW()
            WHERE generation_id = $1 AND scene_id = $2
            ",
        )
        .bind(generation_id)
        .bind(scene_id)
        .execute(&self.pool)
        .await
        .context("failed to mark scene processing")?;
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
        sqlx::query(
            r"
            UPDATE scenes
            SET status = 'completed', progress = 100,
                rendered_asset_path = $3, rendered_asset_url = $4,
                scene_project = $5, error = NULL, updated_at = NOW()
            WHERE generation_id = $1 AND scene_id = $2
            ",
        )
        .bind(generation_id)
        .bind(scene_id)
        .bind(asset_path)
        .bind(asset_url)
        .bind(scene_project)
        .execute(&self.pool)
        .await
        .context("failed to mark scene completed")?;
        Ok(())
    }

    async fn mark_scene_failed(
        &self,
        generation_id: Uuid,
        scene_id: &str,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE scenes
            SET status = 'failed', error = $3, updated_at = NOW()
            WHERE generation_id = $1 AND scene_id = $2
            ",
        )
        .bind(generation_id)
        .bind(scene_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("failed to mark scene failed")?;
        Ok(())
    }

    async fn reset_scene(&self, generation_id: Uuid, scene_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE scenes
            SET status = 'pending', progress = 0, error = NULL, updated_at = NOW()
            WHERE generation_id = $1 AND scene_id = $2
            ",
        )
        .bind(generation_id)
        .bind(scene_id)
        .execute(&self.pool)
        .await
        .context("failed to reset scene")?;
        Ok(result.rows_affected() > 0)
    }
}
