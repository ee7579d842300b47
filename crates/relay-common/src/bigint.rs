//! Big-integer helpers for the persistence boundary.
//!
//! Amounts are persisted as decimal strings. An empty string means
//! "absent": cumulative counters read back as zero, price-like fields as
//! `None`. Parsing is lossless; anything that is not a plain decimal
//! integer is an error, never a silent zero.

use alloy_primitives::U256;

/// Decode failure for a persisted decimal string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid big integer string: {0:?}")]
pub struct BigIntError(pub String);

/// Encode a U256 as a decimal string.
pub fn big_int_string(v: U256) -> String {
    v.to_string()
}

/// Parse a persisted decimal string; empty decodes to zero.
///
/// Used for cumulative counters (dealt/cancelled amounts) where a row
/// written before the counter existed reads back as zero.
pub fn parse_big_int(s: &str) -> Result<U256, BigIntError> {
    if s.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(s, 10).map_err(|_| BigIntError(s.to_string()))
}

/// Parse a persisted decimal string; empty decodes to `None`.
///
/// Used for price-like fields where "absent" and "zero" mean different
/// things.
pub fn parse_big_int_opt(s: &str) -> Result<Option<U256>, BigIntError> {
    if s.is_empty() {
        return Ok(None);
    }
    U256::from_str_radix(s, 10)
        .map(Some)
        .map_err(|_| BigIntError(s.to_string()))
}
