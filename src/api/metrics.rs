use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};

use crate::app::AppState;

/// GET /metrics — Prometheusテキスト形式。
pub(crate) async fn exporter(State(state): State<AppState>) -> Response {
    let body = state.telemetry().render_prometheus();
    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
}
