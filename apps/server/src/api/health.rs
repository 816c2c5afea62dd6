use std::sync::Arc;

use crate::{error::ApiResult, main_lib::AppState};
use axum::{extract::State, routing::get, Json, Router};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    providers: usize,
    /// Size of the last selected universe, if any.
    universe_size: Option<usize>,
    latest_data_date: Option<NaiveDate>,
}

async fn health(State(state): State<Arc<AppState>>) -> ApiResult<Json<HealthResponse>> {
    let latest_data_date = state.market_data_store.latest_date()?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        providers: state.chain.summaries().len(),
        universe_size: state.universe_service.current().map(|u| u.symbols.len()),
        latest_data_date,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}
