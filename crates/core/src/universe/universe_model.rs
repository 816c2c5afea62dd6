use chrono::{DateTime, Utc};
use capindex_market_data::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a universe was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Reference list ranked by real market caps.
    MarketCapRanked,
    /// Curated list used because no ranking was possible.
    CuratedFallback,
}

impl SelectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMethod::MarketCapRanked => "market_cap_ranked",
            SelectionMethod::CuratedFallback => "curated_fallback",
        }
    }
}

/// A selected universe.
///
/// `symbols` is ordered by market cap at selection time, largest first. For
/// a curated fallback the order is the curated order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniverseSnapshot {
    pub symbols: Vec<Symbol>,
    pub observed_at: DateTime<Utc>,
    pub candidate_pool_size: usize,
    pub final_pool_size: usize,
    pub selection_method: SelectionMethod,
    /// Candidates whose market cap was looked up.
    #[serde(default)]
    pub candidates_evaluated: usize,
    /// Candidates no provider had a market cap for.
    #[serde(default)]
    pub failed_symbols: Vec<Symbol>,
}

/// A candidate with the market cap it was ranked by.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedSymbol {
    pub symbol: Symbol,
    pub market_cap: Decimal,
}
