//! Market data module - persisted records, store contract and market-cap lookups.

mod market_cap_service;
mod market_data_model;
mod market_data_traits;

pub use market_cap_service::{MarketCapLookup, MarketCapService, MarketCapServiceTrait};
pub use market_data_model::{MarketDataQuery, MarketDataRecord};
pub use market_data_traits::MarketDataStore;
