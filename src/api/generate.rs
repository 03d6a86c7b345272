use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use super::error::{validation_response, worker_error_response};
use crate::app::AppState;
use crate::error::WorkerError;
use crate::model::context::GenerationRequest;
use crate::queue::NewJob;
use crate::store::models::NewSceneGeneration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    id: Uuid,
    status: &'static str,
    phase: &'static str,
    progress: i32,
}

/// POST /generate — 生成レコードを作成し、`generate` ジョブを投入する。
///
/// レート制限は専用ミドルウェアが先に適用する。JSONの形状エラーは
/// 400 と details 配列で返す。
pub(crate) async fn create(State(state): State<AppState>, Json(payload): Json<Value>) -> Response {
    let request: GenerationRequest = match serde_json::from_value(payload.clone()) {
        Ok(request) => request,
        Err(parse_error) => {
            return validation_response(vec![parse_error.to_string()]);
        }
    };
    let violations = request.validate();
    if !violations.is_empty() {
        return validation_response(violations);
    }

    let id = Uuid::new_v4();
    let new_generation = NewSceneGeneration {
        id,
        prompt: request.prompt.clone(),
        aspect_ratio: request.aspect_ratio,
        review_scenario: request.review_scenario,
        review_scenes: request.review_scenes,
        request: serde_json::to_value(&request).unwrap_or(payload),
        task_id: request.task_id.clone(),
        publication_id: request.publication_id.clone(),
    };

    let created = match state.dao().create_generation(new_generation).await {
        Ok(row) => row,
        Err(dao_error) => {
            error!(error = %dao_error, "failed to create scene generation");
            return worker_error_response(
                &WorkerError::Internal(dao_error),
                state.config().development(),
            );
        }
    };

    info!(
        generation_id = %id,
        review_scenario = request.review_scenario,
        review_scenes = request.review_scenes,
        "scene generation created"
    );

    // Degraded queue mode runs the whole generation on this task; the record
    // is the source of truth either way, so submission problems are not
    // surfaced as a creation failure.
    if let Err(submit_error) = state.queue().submit(NewJob::generate(id)).await {
        error!(generation_id = %id, error = %submit_error, "generate job submission failed");
    }

    (
        StatusCode::CREATED,
        Json(CreateResponse {
            id: created.id,
            status: created.status.as_str(),
            phase: created.phase.as_str(),
            progress: created.progress,
        }),
    )
        .into_response()
}
