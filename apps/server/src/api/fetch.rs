use std::sync::Arc;

use crate::{
    api::RangeBody,
    error::{ApiError, ApiResult},
    main_lib::AppState,
};
use axum::{extract::State, routing::post, Json, Router};
use capindex_core::fetch::FetchReport;

/// Runs one acquisition cycle and answers with its report.
async fn run_fetch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RangeBody>,
) -> ApiResult<Json<FetchReport>> {
    let range = body.range()?;
    let _running = state
        .fetch_lock
        .try_lock()
        .map_err(|_| ApiError::Conflict("a fetch cycle is already running".to_string()))?;

    let report = state
        .fetch_service
        .run(range, state.shutdown.subscribe())
        .await?;
    Ok(Json(report))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/data/fetch", post(run_fetch))
}
