use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::WorkerError;

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub(crate) error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) details: Option<Vec<String>>,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
            details: None,
        }),
    )
        .into_response()
}

pub(crate) fn validation_response(details: Vec<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: "validation failed".into(),
            details: Some(details),
        }),
    )
        .into_response()
}

/// コアのエラー分類をHTTPステータスへ写像する。
///
/// 内部エラーの本文は開発モード以外では伏せる。
pub(crate) fn worker_error_response(error: &WorkerError, development: bool) -> Response {
    match error {
        WorkerError::Validation { details } => validation_response(details.clone()),
        WorkerError::NotFound(what) => {
            error_response(StatusCode::NOT_FOUND, format!("{what} not found"))
        }
        WorkerError::InvalidState(_) | WorkerError::ScenarioInvalid(_) => {
            error_response(StatusCode::BAD_REQUEST, error.to_string())
        }
        _ => {
            let message = if development {
                error.to_string()
            } else {
                "internal server error".to_string()
            };
            error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }
}
