//! Curated list of US large caps used when no ranked selection is possible.

/// Ordered roughly by size; the first N form a degraded universe.
pub const FALLBACK_SYMBOLS: &[&str] = &[
    "AAPL", "MSFT", "NVDA", "GOOG", "GOOGL", "AMZN", "META", "BRK-B", "LLY", "AVGO", "TSLA", "WMT",
    "JPM", "V", "UNH", "XOM", "ORCL", "MA", "HD", "PG", "JNJ", "NFLX", "BAC", "CVX", "ABBV", "CRM",
    "COST", "AMD", "KO", "PEP", "TMO", "LIN", "CSCO", "ACN", "ABT", "DHR", "VZ", "MRK", "CMCSA",
    "ADBE", "WFC", "NOW", "TXN", "NEE", "QCOM", "PM", "DIS", "IBM", "SPGI", "UBER", "INTU", "ISRG",
    "CAT", "BKNG", "HON", "GS", "AXP", "T", "LOW", "AMGN", "SYK", "DE", "PANW", "AMAT", "PLD", "GE",
    "C", "MDT", "ETN", "VRTX", "BLK", "MDLZ", "ADI", "SCHW", "ADP", "GILD", "CB", "LRCX", "FI",
    "SO", "MU", "KLAC", "REGN", "PYPL", "PGR", "CI", "MELI", "MMC", "EOG", "SBUX", "BMY", "PFE",
    "INTC", "NKE", "UPS", "RTX", "LMT", "MO", "DUK", "BA", "MS",
];
