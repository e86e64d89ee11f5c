// GET handlers: report page, plot data, version

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use super::AppState;
use crate::report::ReportInputs;
use crate::version::{NAME, VERSION};

/// GET /: the rendered monitor page, read from the stores at request time.
pub(super) async fn index_handler(State(state): State<AppState>) -> Response {
    match ReportInputs::load(&*state.samples, &*state.feed, state.recent_samples).await {
        Ok(inputs) => Html(inputs.render()).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, operation = "render_index", "report render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
    }
}

/// GET /get_plots: chart figures + status list for the page's periodic refresh.
pub(super) async fn plots_handler(State(state): State<AppState>) -> Response {
    match ReportInputs::load(&*state.samples, &*state.feed, state.recent_samples).await {
        Ok(inputs) => axum::Json(inputs.plots()).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}
