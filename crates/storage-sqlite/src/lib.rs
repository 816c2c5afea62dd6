//! SQLite storage implementation for capindex.
//!
//! This crate provides the Diesel-backed implementation of the store trait
//! defined in `capindex-core`. It owns:
//! - connection pooling and embedded migrations
//! - a single writer actor that serializes every write transaction
//! - the `market_data` and `index_performance` tables
//!
//! Reads go straight to the pool; writes are sent to the writer actor so a
//! batch upsert commits all-or-nothing inside one immediate transaction.

pub mod db;
pub mod errors;
pub mod market_data;
pub mod schema;

pub use db::{
    create_pool, get_connection, get_db_path, init, run_migrations, spawn_writer, DbConnection,
    DbPool, WriteHandle,
};
pub use errors::{IntoCore, StorageError};
pub use market_data::MarketDataRepository;

// Re-export core error types for callers that only depend on this crate.
pub use capindex_core::errors::{DatabaseError, Error, Result};
