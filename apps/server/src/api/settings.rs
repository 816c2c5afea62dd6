use std::sync::Arc;

use crate::{error::ApiResult, main_lib::AppState};
use axum::{extract::State, routing::get, Json, Router};
use capindex_core::settings::{FetcherSettings, SettingsUpdate};

async fn get_settings(State(state): State<Arc<AppState>>) -> Json<FetcherSettings> {
    Json(state.settings_service.get_settings())
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<Json<FetcherSettings>> {
    let settings = state.settings_service.update_settings(&update).await?;
    Ok(Json(settings))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/config/data-fetcher",
        get(get_settings).put(update_settings),
    )
}
