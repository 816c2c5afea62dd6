use std::sync::Arc;

use crate::{api::RangeQuery, error::ApiResult, main_lib::AppState};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use capindex_market_data::{FetchDiagnostics, MarketCapQuote, ProviderSummary, Symbol};
use chrono::NaiveDate;
use serde::Serialize;

async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Vec<ProviderSummary>> {
    Json(state.chain.summaries())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainReport<T> {
    result: T,
    summary: String,
    diagnostics: FetchDiagnostics,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SeriesOverview {
    observations: usize,
    first_date: Option<NaiveDate>,
    last_date: Option<NaiveDate>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SymbolDebugResponse {
    symbol: Symbol,
    daily_series: ChainReport<SeriesOverview>,
    market_cap: ChainReport<Option<MarketCapQuote>>,
}

/// Runs both chains for one symbol, bypassing every cache.
async fn debug_symbol(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<SymbolDebugResponse>> {
    let range = query.resolve()?;
    let symbol = Symbol::new(&symbol);

    let (rows, series_diagnostics) = state
        .chain
        .fetch_daily_series_with_diagnostics(&symbol, &range)
        .await;
    let (quote, cap_diagnostics) = state
        .chain
        .fetch_market_cap_with_diagnostics(&symbol)
        .await;

    tracing::info!(
        "Debug {}: series [{}], market cap [{}]",
        symbol,
        series_diagnostics.summary(),
        cap_diagnostics.summary()
    );

    Ok(Json(SymbolDebugResponse {
        symbol,
        daily_series: ChainReport {
            result: SeriesOverview {
                observations: rows.len(),
                first_date: rows.first().map(|r| r.date),
                last_date: rows.last().map(|r| r.date),
            },
            summary: series_diagnostics.summary(),
            diagnostics: series_diagnostics,
        },
        market_cap: ChainReport {
            result: quote,
            summary: cap_diagnostics.summary(),
            diagnostics: cap_diagnostics,
        },
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/providers", get(list_providers))
        .route("/debug/symbols/{symbol}", get(debug_symbol))
}
