mod model;
mod repository;

pub use model::{IndexPerformanceDB, MarketDataDB};
pub use repository::MarketDataRepository;
