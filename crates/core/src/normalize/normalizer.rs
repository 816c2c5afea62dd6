use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use capindex_market_data::{DailyObservation, Symbol};
use chrono::NaiveDate;
use log::warn;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::constants::ANOMALY_VOLUME_THRESHOLD;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeReport {
    pub input: usize,
    pub output: usize,
    pub duplicates_dropped: usize,
    /// Keys of rows discarded as likely volume/market-cap swaps.
    pub anomalies: Vec<(NaiveDate, Symbol)>,
}

/// Collapses raw rows to one canonical row per `(date, symbol)`.
///
/// Winner selection: the row from the better-ranked provider; on a tie or an
/// unknown provider, the row with the larger market cap; otherwise the first
/// row seen.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    ranking: HashMap<String, usize>,
}

impl Normalizer {
    /// `ranking` maps provider id to chain position, 0 being the best.
    pub fn new(ranking: HashMap<String, usize>) -> Self {
        Self { ranking }
    }

    pub fn normalize(&self, rows: Vec<DailyObservation>) -> (Vec<DailyObservation>, NormalizeReport) {
        let mut report = NormalizeReport {
            input: rows.len(),
            ..NormalizeReport::default()
        };
        let mut canonical: BTreeMap<(NaiveDate, Symbol), DailyObservation> = BTreeMap::new();

        for mut row in rows {
            clamp_non_negative(&mut row);

            if is_field_swap(&row) {
                warn!(
                    "Discarding {} {}: volume {} exceeds market cap {} (likely swapped fields)",
                    row.symbol, row.date, row.volume, row.market_cap
                );
                report.anomalies.push((row.date, row.symbol.clone()));
                continue;
            }

            let key = (row.date, row.symbol.clone());
            match canonical.get(&key) {
                Some(current) => {
                    report.duplicates_dropped += 1;
                    if self.prefer(&row, current) == Ordering::Greater {
                        canonical.insert(key, row);
                    }
                }
                None => {
                    canonical.insert(key, row);
                }
            }
        }

        let out: Vec<DailyObservation> = canonical.into_values().collect();
        report.output = out.len();
        (out, report)
    }

    fn rank(&self, row: &DailyObservation) -> Option<usize> {
        self.ranking.get(row.source.as_ref()).copied()
    }

    /// `Greater` when `candidate` should replace `current`.
    fn prefer(&self, candidate: &DailyObservation, current: &DailyObservation) -> Ordering {
        match (self.rank(candidate), self.rank(current)) {
            (Some(a), Some(b)) if a != b => b.cmp(&a),
            _ => candidate.market_cap.cmp(&current.market_cap),
        }
    }
}

fn clamp_non_negative(row: &mut DailyObservation) {
    for value in [&mut row.price, &mut row.volume, &mut row.market_cap] {
        if *value < Decimal::ZERO {
            *value = Decimal::ZERO;
        }
    }
}

/// Volume of market-cap magnitude next to a much smaller market cap.
fn is_field_swap(row: &DailyObservation) -> bool {
    row.volume > ANOMALY_VOLUME_THRESHOLD && row.market_cap < row.volume
}
