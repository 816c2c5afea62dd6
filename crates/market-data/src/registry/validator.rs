//! Daily series validation.
//!
//! Applied to every successful provider payload before the chain returns it:
//! - rows outside the requested inclusive range are dropped
//! - rows with a non-positive price are dropped
//! - one row per date, ascending

use log::{debug, warn};
use rust_decimal::Decimal;

use crate::models::{DailyObservation, DateRange};

/// Outcome counts from one validation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub out_of_range: usize,
    pub non_positive_price: usize,
    pub duplicate_dates: usize,
}

impl ValidationReport {
    pub fn dropped(&self) -> usize {
        self.out_of_range + self.non_positive_price + self.duplicate_dates
    }
}

#[derive(Clone, Debug, Default)]
pub struct SeriesValidator;

impl SeriesValidator {
    pub fn new() -> Self {
        Self
    }

    /// Returns the cleaned rows and what was removed.
    pub fn validate(
        &self,
        mut rows: Vec<DailyObservation>,
        range: &DateRange,
    ) -> (Vec<DailyObservation>, ValidationReport) {
        let mut report = ValidationReport::default();

        rows.retain(|row| {
            if !range.contains(row.date) {
                report.out_of_range += 1;
                return false;
            }
            if row.price <= Decimal::ZERO {
                report.non_positive_price += 1;
                return false;
            }
            true
        });

        rows.sort_by_key(|r| r.date);
        let before = rows.len();
        rows.dedup_by_key(|r| r.date);
        report.duplicate_dates = before - rows.len();

        if report.dropped() > 0 {
            let source = rows.first().map(|r| r.source.as_ref()).unwrap_or("?");
            warn!(
                "Series from {} trimmed: {} out of range, {} non-positive price, {} duplicate dates",
                source, report.out_of_range, report.non_positive_price, report.duplicate_dates
            );
        } else {
            debug!("Series validated: {} rows", rows.len());
        }

        (rows, report)
    }
}
