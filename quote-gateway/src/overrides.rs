use exchange_api::{Quote, QuoteSource, Symbol};

/// Last-known real prices for the hard-coded watchlist. Used only when
/// every provider fails and nothing is cached.
const EMERGENCY_OVERRIDES: [(&str, f64); 6] = [
    ("RUM", 5.52),
    ("TIRX", 0.09),
    ("AITX", 0.0006),
    ("FAT", 0.29),
    ("DJT", 12.21),
    ("ASST", 0.82),
];

pub fn override_price(symbol: &Symbol) -> Option<f64> {
    EMERGENCY_OVERRIDES
        .iter()
        .find(|(s, _)| *s == symbol.as_str())
        .map(|(_, price)| *price)
}

/// Fixed minimal quote so downstream arithmetic never divides by zero
/// or blocks. Flagged via `Placeholder` provenance.
pub fn placeholder_quote(symbol: &Symbol) -> Quote {
    Quote::new(symbol.clone(), 0.01, QuoteSource::Placeholder)
}
