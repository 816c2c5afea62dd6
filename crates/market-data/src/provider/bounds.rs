use rust_decimal::Decimal;

use crate::errors::MarketDataError;

/// Smallest market cap accepted from any source ($1M).
pub const MIN_MARKET_CAP: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Largest market cap accepted from any source ($50T).
pub const MAX_MARKET_CAP: Decimal = Decimal::from_parts(2_285_707_264, 11_641, 0, false, 0);

/// Rejects market caps outside `[MIN_MARKET_CAP, MAX_MARKET_CAP]`.
pub fn check_market_cap(provider: &str, value: Decimal) -> Result<Decimal, MarketDataError> {
    if value < MIN_MARKET_CAP || value > MAX_MARKET_CAP {
        return Err(MarketDataError::DataQualityAnomaly {
            provider: provider.to_string(),
            message: format!("market cap {} outside sane bounds", value),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bound_constants() {
        assert_eq!(MIN_MARKET_CAP, dec!(1000000));
        assert_eq!(MAX_MARKET_CAP, dec!(50000000000000));
    }

    #[test]
    fn test_bounds_inclusive() {
        assert!(check_market_cap("X", dec!(1000000)).is_ok());
        assert!(check_market_cap("X", dec!(50000000000000)).is_ok());
        assert!(check_market_cap("X", dec!(999999)).is_err());
        assert!(check_market_cap("X", dec!(50000000000001)).is_err());
    }
}
