//! Deduplication and sanity checks for raw observations.

mod normalizer;

pub use normalizer::{NormalizeReport, Normalizer};
