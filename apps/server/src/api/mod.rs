use std::sync::Arc;

use axum::{http::HeaderValue, Router};
use capindex_core::market_data::MarketDataQuery;
use capindex_market_data::DateRange;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{
    config::Config,
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

mod fetch;
mod health;
mod index;
mod market_data;
mod providers;
mod settings;
mod universe;

pub fn app_router(state: Arc<AppState>, config: &Config) -> Router {
    let api = Router::new()
        .merge(health::router())
        .merge(fetch::router())
        .merge(market_data::router())
        .merge(index::router())
        .merge(universe::router())
        .merge(settings::router())
        .merge(providers::router());

    Router::new()
        .nest("/api/v1", api)
        .layer(cors_layer(&config.cors_allow_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Optional `startDate`/`endDate` query parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RangeQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl RangeQuery {
    pub fn resolve(&self) -> ApiResult<DateRange> {
        let query = MarketDataQuery {
            start_date: self.start_date,
            end_date: self.end_date,
            symbols: None,
        };
        Ok(query.range(Utc::now().date_naive())?)
    }
}

/// Required `{startDate, endDate}` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RangeBody {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl RangeBody {
    pub fn range(&self) -> ApiResult<DateRange> {
        DateRange::new(self.start_date, self.end_date)
            .map_err(|e| ApiError::BadRequest(e.to_string()))
    }
}
