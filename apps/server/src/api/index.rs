use std::sync::Arc;

use crate::{
    api::{RangeBody, RangeQuery},
    error::ApiResult,
    main_lib::AppState,
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use capindex_core::index::IndexPerformanceRecord;

async fn get_performance(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<Vec<IndexPerformanceRecord>>> {
    let range = query.resolve()?;
    let records = state.index_service.performance(&range).await?;
    Ok(Json(records))
}

async fn build_index(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RangeBody>,
) -> ApiResult<Json<Vec<IndexPerformanceRecord>>> {
    let range = body.range()?;
    let records = state.index_service.rebuild(&range).await?;
    Ok(Json(records))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/index/performance", get(get_performance))
        .route("/index/build", post(build_index))
}
