//! American to decimal odds conversion.

/// Convert an American moneyline to decimal odds.
///
/// `+150` pays 1.5 units on a 1 unit stake, so its decimal price is 2.5.
/// `-150` needs a 1.5 unit stake to win 1, so its decimal price is 1 + 100/150.
/// Every non-null result is strictly greater than 1. A price of exactly zero
/// is not a valid American price and converts to `None`.
pub fn american_to_decimal(american: Option<i64>) -> Option<f64> {
    match american? {
        0 => None,
        a if a > 0 => Some(a as f64 / 100.0 + 1.0),
        a => Some(1.0 + 100.0 / a.unsigned_abs() as f64),
    }
}

/// Read an American moneyline out of a JSON value.
///
/// ESPN reports moneylines as integers, but occasionally as floats ("-110.0")
/// or numeric strings. Anything that is not a whole number is rejected.
pub fn moneyline_from_json(value: &serde_json::Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    if let Some(f) = value.as_f64() {
        return (f.fract() == 0.0).then_some(f as i64);
    }
    value.as_str().and_then(|s| s.trim().trim_start_matches('+').parse().ok())
}
