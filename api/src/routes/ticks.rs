use alert_engine::TickReport;
use axum::{extract::State, routing::post, Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ticks", post(run_tick))
}

/// Runs one evaluation cycle now. Queues behind a tick that is already running.
async fn run_tick(State(state): State<AppState>) -> Json<TickReport> {
    Json(state.scheduler.run_tick().await)
}
