use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use super::error::{error_response, worker_error_response};
use crate::app::AppState;
use crate::error::WorkerError;
use crate::queue::NewJob;
use crate::storage::debug_frames_base;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegenerateResponse {
    id: Uuid,
    scene_id: String,
    status: &'static str,
}

/// POST /{id}/scenes/{scene_id}/regenerate
///
/// シーンを pending へ戻し、保存済みスナップショットからの再レンダリング
/// ジョブを投入する。orderIndex と sceneId は保たれる。
pub(crate) async fn regenerate(
    State(state): State<AppState>,
    Path((id, scene_id)): Path<(Uuid, String)>,
) -> Response {
    match state.dao().get_scene(id, &scene_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "scene not found"),
        Err(dao_error) => {
            error!(error = %dao_error, "failed to fetch scene");
            return worker_error_response(
                &WorkerError::Internal(dao_error),
                state.config().development(),
            );
        }
    }

    if let Err(dao_error) = state.dao().reset_scene(id, &scene_id).await {
        error!(error = %dao_error, "failed to reset scene");
        return worker_error_response(
            &WorkerError::Internal(dao_error),
            state.config().development(),
        );
    }

    if let Err(submit_error) = state
        .queue()
        .submit(NewJob::regenerate_scene(id, scene_id.clone()))
        .await
    {
        error!(generation_id = %id, scene_id, error = %submit_error, "regenerate job submission failed");
    }

    info!(generation_id = %id, scene_id, "scene regeneration requested");
    Json(RegenerateResponse {
        id,
        scene_id,
        status: "pending",
    })
    .into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugFramesResponse {
    scene_id: String,
    generation_id: Uuid,
    debug_frames_path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    debug_frame_urls: Vec<String>,
}

/// GET /{id}/scenes/{scene_id}/debug-frames
///
/// ベースパスと、スナップショットに記録済みのフレームURLを返す。
/// ストレージの列挙は行わない。
pub(crate) async fn debug_frames(
    State(state): State<AppState>,
    Path((id, scene_id)): Path<(Uuid, String)>,
) -> Response {
    let scene = match state.dao().get_scene(id, &scene_id).await {
        Ok(Some(row)) => row,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "scene not found"),
        Err(dao_error) => {
            error!(error = %dao_error, "failed to fetch scene");
            return worker_error_response(
                &WorkerError::Internal(dao_error),
                state.config().development(),
            );
        }
    };

    let debug_frame_urls = scene
        .scene_project
        .get("debugFrames")
        .and_then(|value| value.as_array())
        .map(|frames| {
            frames
                .iter()
                .filter_map(|frame| frame.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Json(DebugFramesResponse {
        scene_id,
        generation_id: id,
        debug_frames_path: debug_frames_base(&scene.scene_id),
        debug_frame_urls,
    })
    .into_response()
}
