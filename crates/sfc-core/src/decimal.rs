//! 18-decimal fixed-point helpers
//!
//! Products of two `u128` amounts are formed in 256 bits so that
//! `amount * ratio / UNIT` style expressions never overflow. All divisions
//! truncate toward zero, which always rounds in the ledger's favour.

use crate::error::{Result, SfcError};
use primitive_types::U256;

/// One whole token, and 100% when used as a ratio
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// Number of decimal places in [`UNIT`]
pub const DECIMALS: usize = 18;

/// `a * b / denom`, truncating. Returns 0 when `denom` is zero and saturates
/// at `u128::MAX` if the quotient does not fit.
pub fn mul_div(a: u128, b: u128, denom: u128) -> u128 {
    if denom == 0 {
        return 0;
    }
    let q = U256::from(a) * U256::from(b) / U256::from(denom);
    if q > U256::from(u128::MAX) {
        u128::MAX
    } else {
        q.as_u128()
    }
}

/// `num / denom` as a ratio of [`UNIT`]
pub fn ratio(num: u128, denom: u128) -> u128 {
    mul_div(num, UNIT, denom)
}

/// `amount * ratio / UNIT`
pub fn apply_ratio(amount: u128, ratio: u128) -> u128 {
    mul_div(amount, ratio, UNIT)
}

/// Checked addition mapped to [`SfcError::Overflow`]
pub fn add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(SfcError::Overflow)
}

/// Checked subtraction mapped to [`SfcError::Overflow`]
pub fn sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(SfcError::Overflow)
}

/// Parse a decimal token string (`"0.3175"`, `"12"`) into base units
pub fn parse_tokens(s: &str) -> Result<u128> {
    let invalid = || SfcError::InvalidAmount(s.to_string());
    let s = s.trim();
    if s.is_empty() {
        return Err(invalid());
    }
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if frac.len() > DECIMALS
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
        || (whole.is_empty() && frac.is_empty())
    {
        return Err(invalid());
    }
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let mut frac_units: u128 = 0;
    for (i, c) in frac.chars().enumerate() {
        let digit = u128::from(c.to_digit(10).ok_or_else(invalid)?);
        frac_units += digit * 10u128.pow((DECIMALS - 1 - i) as u32);
    }
    whole
        .checked_mul(UNIT)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(invalid)
}

/// Render base units as a decimal token string without trailing zeros
pub fn format_tokens(amount: u128) -> String {
    let whole = amount / UNIT;
    let frac = amount % UNIT;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:018}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Serde adapter storing amounts as decimal token strings
///
/// Used by configuration and genesis files, where TOML has no 128-bit
/// integers.
pub mod as_tokens {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_tokens(*amount))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_tokens(&s).map_err(D::Error::custom)
    }
}

/// Serde adapter storing raw base-unit amounts as integer strings
pub mod as_wei {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.trim().parse().map_err(D::Error::custom)
    }
}
