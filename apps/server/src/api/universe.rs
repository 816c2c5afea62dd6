use std::sync::Arc;

use crate::{error::ApiResult, main_lib::AppState};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use capindex_core::universe::UniverseSnapshot;

/// Cached universe while fresh, otherwise a new selection.
async fn get_universe(State(state): State<Arc<AppState>>) -> ApiResult<Json<UniverseSnapshot>> {
    let snapshot = state.universe_service.select(false).await?;
    Ok(Json(snapshot))
}

async fn refresh_universe(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<UniverseSnapshot>> {
    let snapshot = state.universe_service.select(true).await?;
    Ok(Json(snapshot))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/universe", get(get_universe))
        .route("/universe/refresh", post(refresh_universe))
}
