use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::error;

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub(crate) struct HealthReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// GET /health — DB疎通で判定する。
pub(crate) async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthReport>, (StatusCode, Json<HealthReport>)> {
    if let Err(ping_error) = state.dao().ping().await {
        error!(error = %ping_error, "database health check failed");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthReport {
                status: "error",
                detail: Some(format!("database: {ping_error:#}")),
            }),
        ));
    }

    Ok(Json(HealthReport {
        status: "ok",
        detail: None,
    }))
}
