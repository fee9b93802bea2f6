use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use domain::{normalize_symbol, CreateWatchRequest, RemoveWatchResponse, UserId, Watch};
use tracing::info;

use crate::{error::ApiError, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/watches", post(create_watch))
        .route("/users/:user_id/watches", get(list_watches))
        .route("/users/:user_id/watches/:symbol", delete(remove_watches))
}

async fn create_watch(
    State(state): State<AppState>,
    Json(payload): Json<CreateWatchRequest>,
) -> Result<(StatusCode, Json<Watch>), ApiError> {
    let watch = state.registry.add(
        payload.user_id,
        &payload.symbol,
        payload.min_price,
        payload.max_price,
    )?;
    info!(
        user_id = %watch.user_id,
        symbol = %watch.symbol,
        min_price = watch.min_price,
        max_price = watch.max_price,
        "watch registered"
    );
    Ok((StatusCode::CREATED, Json(watch)))
}

async fn list_watches(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Vec<Watch>> {
    Json(state.registry.list_for_user(&UserId::from(user_id)))
}

async fn remove_watches(
    State(state): State<AppState>,
    Path((user_id, symbol)): Path<(String, String)>,
) -> Json<RemoveWatchResponse> {
    let user_id = UserId::from(user_id);
    let removed = state.registry.remove(&user_id, &symbol);
    // A blank symbol was never tracked; echo it back trimmed.
    let symbol = normalize_symbol(&symbol).unwrap_or_else(|| symbol.trim().to_string());
    info!(%user_id, %symbol, removed, "watch removal requested");
    Json(RemoveWatchResponse {
        symbol,
        removed,
        tracked: removed > 0,
    })
}
