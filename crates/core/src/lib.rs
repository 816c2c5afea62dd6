//! Capindex Core - selection, caching, normalization and index services.
//!
//! This crate contains the acquisition engine's business logic. It is
//! store-agnostic and defines the `MarketDataStore` trait implemented by the
//! `storage-sqlite` crate. Source providers and the provider chain live in
//! `capindex-market-data`.

pub mod cache;
pub mod constants;
pub mod errors;
pub mod fetch;
pub mod index;
pub mod market_data;
pub mod normalize;
pub mod settings;
pub mod universe;

#[cfg(test)]
pub(crate) mod testing;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
