use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{error_response, validation_response, worker_error_response};
use crate::app::AppState;
use crate::error::WorkerError;
use crate::queue::NewJob;
use crate::store::models::{
    GenerationPhase, GenerationStatus, SceneGenerationRow, SceneRow,
};

const LIST_LIMIT: i64 = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationResponse {
    id: Uuid,
    prompt: String,
    aspect_ratio: f64,
    review_scenario: bool,
    review_scenes: bool,
    status: &'static str,
    phase: &'static str,
    progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    enriched_context: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scene_projects: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    publication_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenes: Option<Vec<SceneResponse>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SceneResponse {
    id: Uuid,
    scene_id: String,
    kind: &'static str,
    order_index: i32,
    status: &'static str,
    progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    rendered_asset_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rendered_asset_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    scene_project: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GenerationResponse {
    pub(crate) fn from_row(row: SceneGenerationRow, scenes: Option<Vec<SceneRow>>) -> Self {
        Self {
            id: row.id,
            prompt: row.prompt,
            aspect_ratio: row.aspect_ratio,
            review_scenario: row.review_scenario,
            review_scenes: row.review_scenes,
            status: row.status.as_str(),
            phase: row.phase.as_str(),
            progress: row.progress,
            enriched_context: row.enriched_context,
            scenario: row.scenario,
            scene_projects: row.scene_projects,
            result_url: row.result_url,
            result_path: row.result_path,
            error: row.error,
            task_id: row.task_id,
            publication_id: row.publication_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
            scenes: scenes.map(|rows| rows.into_iter().map(SceneResponse::from_row).collect()),
        }
    }
}

impl SceneResponse {
    fn from_row(row: SceneRow) -> Self {
        Self {
            id: row.id,
            scene_id: row.scene_id,
            kind: row.kind.as_str(),
            order_index: row.order_index,
            status: row.status.as_str(),
            progress: row.progress,
            rendered_asset_path: row.rendered_asset_path,
            rendered_asset_url: row.rendered_asset_url,
            error: row.error,
            scene_project: row.scene_project,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    phase: Option<String>,
}

/// GET / — 直近100件、status / phase で絞り込み可能。
pub(crate) async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match GenerationStatus::from_str(raw) {
            Some(status) => Some(status),
            None => return validation_response(vec![format!("unknown status filter: {raw}")]),
        },
    };
    let phase = match query.phase.as_deref() {
        None => None,
        Some(raw) => match GenerationPhase::from_str(raw) {
            Some(phase) => Some(phase),
            None => return validation_response(vec![format!("unknown phase filter: {raw}")]),
        },
    };

    match state.dao().list_generations(status, phase, LIST_LIMIT).await {
        Ok(rows) => {
            let body: Vec<GenerationResponse> = rows
                .into_iter()
                .map(|row| GenerationResponse::from_row(row, None))
                .collect();
            Json(body).into_response()
        }
        Err(dao_error) => {
            error!(error = %dao_error, "failed to list generations");
            worker_error_response(
                &WorkerError::Internal(dao_error),
                state.config().development(),
            )
        }
    }
}

/// GET /{id} — シーンを orderIndex 順で同梱する。
pub(crate) async fn fetch(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let generation = match state.dao().get_generation(id).await {
        Ok(Some(row)) => row,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "generation not found"),
        Err(dao_error) => {
            error!(error = %dao_error, "failed to fetch generation");
            return worker_error_response(
                &WorkerError::Internal(dao_error),
                state.config().development(),
            );
        }
    };

    let scenes = match state.dao().list_scenes(id).await {
        Ok(scenes) => scenes,
        Err(dao_error) => {
            error!(error = %dao_error, "failed to fetch scenes");
            return worker_error_response(
                &WorkerError::Internal(dao_error),
                state.config().development(),
            );
        }
    };

    Json(GenerationResponse::from_row(generation, Some(scenes))).into_response()
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    id: Uuid,
    status: &'static str,
}

/// DELETE /{id} — キャンセル（冪等）。キュー上の未実行ジョブも取り除く。
pub(crate) async fn cancel(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.dao().cancel_generation(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "generation not found"),
        Err(dao_error) => {
            error!(error = %dao_error, "failed to cancel generation");
            return worker_error_response(
                &WorkerError::Internal(dao_error),
                state.config().development(),
            );
        }
    }

    match state.queue().remove_queued(id).await {
        Ok(removed) if removed > 0 => {
            info!(generation_id = %id, removed, "removed queued jobs for cancelled generation");
        }
        Ok(_) => {}
        Err(queue_error) => {
            warn!(generation_id = %id, error = %queue_error, "failed to remove queued jobs");
        }
    }

    Json(CancelResponse {
        id,
        status: "cancelled",
    })
    .into_response()
}

#[derive(Debug, Serialize)]
struct ContinueResponse {
    id: Uuid,
    status: &'static str,
}

/// POST /{id}/continue — レビュー待ちからの再開。
pub(crate) async fn resume(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let generation = match state.dao().get_generation(id).await {
        Ok(Some(row)) => row,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "generation not found"),
        Err(dao_error) => {
            error!(error = %dao_error, "failed to fetch generation");
            return worker_error_response(
                &WorkerError::Internal(dao_error),
                state.config().development(),
            );
        }
    };

    if !generation.status.is_waiting() {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!(
                "cannot continue generation in status {}",
                generation.status.as_str()
            ),
        );
    }

    if let Err(submit_error) = state.queue().submit(NewJob::continuation(id)).await {
        error!(generation_id = %id, error = %submit_error, "continue job submission failed");
    }

    Json(ContinueResponse {
        id,
        status: "processing",
    })
    .into_response()
}
