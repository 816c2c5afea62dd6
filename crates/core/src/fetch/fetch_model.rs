use capindex_market_data::Symbol;
use serde::Serialize;

use crate::universe::SelectionMethod;

/// Outcome of one fetch cycle. Per-symbol failures are counted, not raised.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchReport {
    pub universe: usize,
    pub selection_method: Option<SelectionMethod>,
    pub succeeded: Vec<Symbol>,
    /// Symbols that ended their batch without a usable row.
    pub failed: Vec<Symbol>,
    pub observations_written: usize,
    pub anomalies_discarded: usize,
    pub duplicates_dropped: usize,
    pub index_records: usize,
    /// Stopped early on shutdown; committed batches are intact.
    pub cancelled: bool,
}

impl FetchReport {
    pub fn summary(&self) -> String {
        format!(
            "{} of {} symbols fetched ({} failed), {} observations written, {} anomalies discarded, {} duplicates dropped, {} index dates{}",
            self.succeeded.len(),
            self.universe,
            self.failed.len(),
            self.observations_written,
            self.anomalies_discarded,
            self.duplicates_dropped,
            self.index_records,
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}
