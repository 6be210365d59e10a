use axum::extract::State;
use axum::Json;

use crate::state::AppState;
use crate::tracker::RunsOverview;

/// GET /services/runs: active orchestration runs and recent summaries.
pub async fn list_runs(State(app): State<AppState>) -> Json<RunsOverview> {
    Json(app.tracker.overview().await)
}
