//! Domain types shared by providers, the provider chain and downstream crates.

mod numeric;
mod observation;
mod outcome;
mod range;
mod symbol;
mod types;

pub use numeric::{coerce_f64, coerce_json, coerce_str, parse_magnitude};
pub use observation::{Capability, DailyObservation, MarketCapQuote};
pub use outcome::ProviderOutcome;
pub use range::DateRange;
pub use symbol::Symbol;
pub use types::ProviderId;
