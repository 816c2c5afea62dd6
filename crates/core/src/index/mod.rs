//! Index calculation over normalized observations.

mod index_calculator;
mod index_model;
mod index_service;

pub use index_calculator::{CapWeightedIndex, IndexCalculator};
pub use index_model::IndexPerformanceRecord;
pub use index_service::{IndexService, IndexServiceTrait};
