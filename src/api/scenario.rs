use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use super::error::{error_response, validation_response, worker_error_response};
use crate::app::AppState;
use crate::error::WorkerError;
use crate::model::scenario::validate_scenario_value;
use crate::store::models::GenerationStatus;

#[derive(Debug, Serialize)]
struct ScenarioResponse {
    id: Uuid,
    scenario: Value,
    status: &'static str,
    phase: &'static str,
}

/// GET /{id}/scenario
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

    let Some(scenario) = generation.scenario else {
        return error_response(StatusCode::NOT_FOUND, "scenario not yet produced");
    };

    Json(ScenarioResponse {
        id,
        scenario,
        status: generation.status.as_str(),
        phase: generation.phase.as_str(),
    })
    .into_response()
}

/// PUT /{id}/scenario — シナリオレビュー中のみ差し替え可能。
///
/// 形状検証はフェーズ1と同じ緩い構造スキーマ。時間制約などの厳密な
/// 検証は再開後のフェーズ2が行う。
pub(crate) async fn replace(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<Value>,
) -> Response {
    let violations = validate_scenario_value(&payload);
    if !violations.is_empty() {
        return validation_response(violations);
    }

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

    if generation.status != GenerationStatus::WaitingForReview {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!(
                "scenario can only be replaced while waiting for review, status is {}",
                generation.status.as_str()
            ),
        );
    }

    match state.dao().replace_scenario_for_review(id, &payload).await {
        Ok(true) => {
            info!(generation_id = %id, "scenario replaced during review");
            Json(ScenarioResponse {
                id,
                scenario: payload,
                status: GenerationStatus::WaitingForReview.as_str(),
                phase: generation.phase.as_str(),
            })
            .into_response()
        }
        // Lost the race with a continue job that already moved the record on.
        Ok(false) => error_response(
            StatusCode::BAD_REQUEST,
            "generation is no longer waiting for review",
        ),
        Err(dao_error) => {
            error!(error = %dao_error, "failed to replace scenario");
            worker_error_response(
                &WorkerError::Internal(dao_error),
                state.config().development(),
            )
        }
    }
}
