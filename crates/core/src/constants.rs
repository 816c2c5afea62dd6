use rust_decimal::Decimal;

/// Volume above which a row is suspected of having volume and market cap swapped.
pub const ANOMALY_VOLUME_THRESHOLD: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Decimal places kept for index returns
pub const RETURN_PRECISION: u32 = 12;

/// Snapshot file names inside the cache directory
pub const MARKET_CAP_CACHE_FILE: &str = "market_caps.json";
pub const UNIVERSE_CACHE_FILE: &str = "universe.json";

/// Default number of companies returned by the top-companies query
pub const DEFAULT_TOP_COMPANIES: i64 = 10;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_anomaly_threshold_is_one_trillion() {
        assert_eq!(ANOMALY_VOLUME_THRESHOLD, dec!(1_000_000_000_000));
    }
}
