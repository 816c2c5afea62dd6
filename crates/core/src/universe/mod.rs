//! Universe selection: rank a reference pool by real market cap, keep the top N.

mod fallback;
mod reference;
mod universe_model;
mod universe_service;

pub use fallback::FALLBACK_SYMBOLS;
pub use reference::{parse_constituents, ReferenceListSource, WikipediaSp500Source};
pub use universe_model::{RankedSymbol, SelectionMethod, UniverseSnapshot};
pub use universe_service::{rank_by_market_cap, UniverseService, UniverseServiceTrait};
