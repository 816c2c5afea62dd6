use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use capindex_core::constants::DEFAULT_TOP_COMPANIES;
use capindex_core::market_data::{MarketDataQuery, MarketDataRecord};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

const MAX_TOP_COMPANIES: i64 = 500;

async fn get_market_data(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MarketDataQuery>,
) -> ApiResult<Json<Vec<MarketDataRecord>>> {
    let range = query.range(Utc::now().date_naive())?;
    let symbols = query.symbol_list();
    let rows = state
        .market_data_store
        .observations_in_range(&range, symbols.as_deref())?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
struct TopCompaniesQuery {
    date: Option<NaiveDate>,
    limit: Option<i64>,
}

/// Largest companies on `date`, or on the latest stored date when omitted.
async fn get_top_companies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopCompaniesQuery>,
) -> ApiResult<Json<Vec<MarketDataRecord>>> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_COMPANIES);
    if !(1..=MAX_TOP_COMPANIES).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_TOP_COMPANIES}"
        )));
    }

    let date = match query.date {
        Some(date) => date,
        None => match state.market_data_store.latest_date()? {
            Some(date) => date,
            None => return Ok(Json(Vec::new())),
        },
    };
    let rows = state.market_data_store.top_companies(date, limit)?;
    Ok(Json(rows))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/market-data", get(get_market_data))
        .route("/companies/top", get(get_top_companies))
}
