use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One date of the cap-weighted index. Always derived, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexPerformanceRecord {
    pub date: NaiveDate,
    pub daily_return: Decimal,
    pub cumulative_return: Decimal,
    pub total_market_cap: Decimal,
}
