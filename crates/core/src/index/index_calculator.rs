//! Market-cap-weighted index returns.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::warn;
use rust_decimal::Decimal;

use super::index_model::IndexPerformanceRecord;
use crate::constants::RETURN_PRECISION;
use crate::market_data::MarketDataRecord;

pub trait IndexCalculator: Send + Sync {
    /// One record per date that has qualifying rows, in date order.
    fn calculate(&self, rows: &[MarketDataRecord]) -> Vec<IndexPerformanceRecord>;
}

/// Per date, over rows with `market_cap > 0` and `price > 0`:
///
/// ```text
/// total_market_cap = Σ market_cap
/// weighted_price   = Σ(price · market_cap) / total_market_cap
/// daily_return     = weighted_price[d] / weighted_price[d-1] − 1   (0 on the first date)
/// cumulative       = Π(1 + daily_return) − 1
/// ```
///
/// Dates without qualifying rows are left out, so the date axis may have gaps.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapWeightedIndex;

#[derive(Default)]
struct DayTotals {
    market_cap: Decimal,
    price_times_cap: Decimal,
}

impl IndexCalculator for CapWeightedIndex {
    fn calculate(&self, rows: &[MarketDataRecord]) -> Vec<IndexPerformanceRecord> {
        let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
        for row in rows {
            if row.market_cap <= Decimal::ZERO || row.price <= Decimal::ZERO {
                continue;
            }
            let Some(weighted) = row.price.checked_mul(row.market_cap) else {
                warn!(
                    "Skipping {} on {}: price {} x market cap {} overflows",
                    row.symbol, row.date, row.price, row.market_cap
                );
                continue;
            };
            let totals = days.entry(row.date).or_default();
            match (
                totals.market_cap.checked_add(row.market_cap),
                totals.price_times_cap.checked_add(weighted),
            ) {
                (Some(market_cap), Some(price_times_cap)) => {
                    totals.market_cap = market_cap;
                    totals.price_times_cap = price_times_cap;
                }
                _ => warn!("Skipping {} on {}: day totals overflow", row.symbol, row.date),
            }
        }

        let mut records = Vec::with_capacity(days.len());
        let mut previous_weighted: Option<Decimal> = None;
        let mut growth = Decimal::ONE;

        for (date, totals) in days {
            let weighted = totals
                .price_times_cap
                .checked_div(totals.market_cap)
                .unwrap_or(Decimal::ZERO);

            let daily_return = match previous_weighted {
                Some(prev) if !prev.is_zero() => weighted
                    .checked_div(prev)
                    .map(|ratio| (ratio - Decimal::ONE).round_dp(RETURN_PRECISION))
                    .unwrap_or(Decimal::ZERO),
                _ => Decimal::ZERO,
            };

            match Decimal::ONE
                .checked_add(daily_return)
                .and_then(|factor| growth.checked_mul(factor))
            {
                Some(next) => growth = next.round_dp(RETURN_PRECISION),
                None => warn!("Cumulative return overflows on {}; carried forward", date),
            }

            records.push(IndexPerformanceRecord {
                date,
                daily_return,
                cumulative_return: growth - Decimal::ONE,
                total_market_cap: totals.market_cap,
            });
            previous_weighted = Some(weighted);
        }

        records
    }
}
