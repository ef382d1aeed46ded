//! Fixed-point math utilities
//!
//! Thin wrappers over `model_safety::math` that speak `ProtocolError`, plus a
//! decimal newtype for human-entered ratios, prices and amounts.

use crate::error::{ProtocolError, Result};
use core::fmt;
use core::str::FromStr;
use model_safety::math as fp;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

pub use model_safety::math::{Rounding, BPS_DENOMINATOR, WAD, WAD_DECIMALS};

/// `a * b / d` with a 256-bit intermediate
#[inline]
pub fn mul_div(a: u128, b: u128, d: u128, rounding: Rounding) -> Result<u128> {
    Ok(fp::mul_div(a, b, d, rounding)?)
}

/// WAD value of `amount` native units at `price` (WAD per whole token)
#[inline]
pub fn value_of(amount: u128, price: u128, decimals: u8, rounding: Rounding) -> Result<u128> {
    Ok(fp::value_of(amount, price, decimals, rounding)?)
}

/// Native units worth `value` at `price`
#[inline]
pub fn amount_of(value: u128, price: u128, decimals: u8, rounding: Rounding) -> Result<u128> {
    Ok(fp::amount_of(value, price, decimals, rounding)?)
}

#[inline]
pub fn to_wad_units(amount: u128, decimals: u8, rounding: Rounding) -> Result<u128> {
    Ok(fp::to_wad_units(amount, decimals, rounding)?)
}

#[inline]
pub fn from_wad_units(amount: u128, decimals: u8, rounding: Rounding) -> Result<u128> {
    Ok(fp::from_wad_units(amount, decimals, rounding)?)
}

/// `amount * bps / 10_000`
#[inline]
pub fn apply_bps(amount: u128, bps: u16, rounding: Rounding) -> Result<u128> {
    Ok(fp::apply_bps(amount, bps as u128, rounding)?)
}

/// `a + b`, failing with `MathOverflow`
#[inline]
pub fn checked_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(ProtocolError::MathOverflow)
}

/// Non-negative decimal held at 18-decimal precision
///
/// Parses and prints as a plain decimal string ("2.3", "30000"), which keeps
/// scenario files readable while every computation stays integral.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Wad(pub u128);

impl Wad {
    pub const ONE: Self = Self(WAD);

    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Whole tokens to native units of a token with `decimals`
    pub fn to_units(self, decimals: u8) -> Result<u128> {
        from_wad_units(self.0, decimals, Rounding::Down)
    }

    /// Native units of a token with `decimals` to whole tokens
    pub fn from_units(amount: u128, decimals: u8) -> Result<Self> {
        to_wad_units(amount, decimals, Rounding::Down).map(Self)
    }
}

impl From<u128> for Wad {
    fn from(raw: u128) -> Self {
        Self(raw)
    }
}

/// Error parsing a decimal string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWadError(pub String);

impl fmt::Display for ParseWadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid decimal '{}'", self.0)
    }
}

impl std::error::Error for ParseWadError {}

impl FromStr for Wad {
    type Err = ParseWadError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let err = || ParseWadError(s.to_string());
        let trimmed = s.trim().replace('_', "");
        let (whole, frac) = match trimmed.split_once('.') {
            Some((w, f)) => (w, f),
            None => (trimmed.as_str(), ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(err());
        }
        if frac.len() > WAD_DECIMALS as usize {
            return Err(err());
        }
        let digits_only = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if !digits_only(whole) || !digits_only(frac) {
            return Err(err());
        }

        let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| err())? };
        let frac_scaled: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = WAD_DECIMALS as usize);
            padded.parse().map_err(|_| err())?
        };

        whole
            .checked_mul(WAD)
            .and_then(|w| w.checked_add(frac_scaled))
            .map(Self)
            .ok_or_else(err)
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / WAD;
        let frac = self.0 % WAD;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let frac = format!("{:018}", frac);
        write!(f, "{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl fmt::Debug for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wad({})", self)
    }
}

impl Serialize for Wad {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct WadVisitor;

impl<'de> de::Visitor<'de> for WadVisitor {
    type Value = Wad;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative decimal number or string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> core::result::Result<Wad, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> core::result::Result<Wad, E> {
        (v as u128)
            .checked_mul(WAD)
            .map(Wad)
            .ok_or_else(|| E::custom("decimal too large"))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> core::result::Result<Wad, E> {
        if v < 0 {
            return Err(E::custom("decimal must not be negative"));
        }
        self.visit_u64(v as u64)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> core::result::Result<Wad, E> {
        if !v.is_finite() || v < 0.0 {
            return Err(E::custom("decimal must be finite and non-negative"));
        }
        self.visit_str(&format!("{}", v))
    }
}

impl<'de> Deserialize<'de> for Wad {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        deserializer.deserialize_any(WadVisitor)
    }
}
