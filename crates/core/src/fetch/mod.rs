//! Fetch cycle: universe -> daily series -> normalize -> store -> index.

mod fetch_model;
mod fetch_service;

pub use fetch_model::FetchReport;
pub use fetch_service::{FetchService, FetchServiceTrait};
