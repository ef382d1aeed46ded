//! Fixed-point primitives shared by the leverage and share models
//!
//! All ratios and USD values are WAD-scaled (1e18). Token amounts stay in
//! their native decimals until converted with [`value_of`] / [`amount_of`].
//! Every division takes an explicit [`Rounding`] so callers decide which side
//! of an ambiguous result they land on.

/// 1.0 in 18-decimal fixed point
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Basis points denominator (10,000 bps = 100%)
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Decimals of the WAD scale (and of vault shares)
pub const WAD_DECIMALS: u8 = 18;

/// Largest decimals value accepted for a token (10^38 still fits in u128)
pub const MAX_DECIMALS: u8 = 38;

/// Direction of rounding for a division
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero
    Down,
    /// Away from zero
    Up,
}

/// Arithmetic failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    /// Result does not fit in u128
    Overflow,
    /// Divisor was zero
    DivisionByZero,
}

const LOW_MASK: u128 = u64::MAX as u128;

/// Full 256-bit product of two u128 values, returned as (high, low)
pub const fn full_mul(a: u128, b: u128) -> (u128, u128) {
    let a0 = a & LOW_MASK;
    let a1 = a >> 64;
    let b0 = b & LOW_MASK;
    let b1 = b >> 64;

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    // Each term is < 2^64, so the sum of three fits in u128
    let mid = (p00 >> 64) + (p01 & LOW_MASK) + (p10 & LOW_MASK);
    let low = (p00 & LOW_MASK) | (mid << 64);
    let high = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);

    (high, low)
}

/// Divide a 256-bit value by a u128, returning (quotient, remainder)
///
/// Fails with `Overflow` when the quotient needs more than 128 bits.
fn div_wide(high: u128, low: u128, divisor: u128) -> Result<(u128, u128), MathError> {
    if divisor == 0 {
        return Err(MathError::DivisionByZero);
    }
    if high == 0 {
        return Ok((low / divisor, low % divisor));
    }
    if high >= divisor {
        return Err(MathError::Overflow);
    }

    // Restoring long division, one bit of `low` at a time. The running
    // remainder stays below `divisor`, so one carry bit is enough.
    let mut rem = high;
    let mut quotient: u128 = 0;
    let mut i = 128;
    while i > 0 {
        i -= 1;
        let carry = rem >> 127;
        rem = (rem << 1) | ((low >> i) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= divisor {
            rem = rem.wrapping_sub(divisor);
            quotient |= 1;
        }
    }

    Ok((quotient, rem))
}

/// Compute `a * b / d` with a 256-bit intermediate
pub fn mul_div(a: u128, b: u128, d: u128, rounding: Rounding) -> Result<u128, MathError> {
    let (high, low) = full_mul(a, b);
    let (q, r) = div_wide(high, low, d)?;
    match rounding {
        Rounding::Down => Ok(q),
        Rounding::Up if r > 0 => q.checked_add(1).ok_or(MathError::Overflow),
        Rounding::Up => Ok(q),
    }
}

/// `a * b / WAD`
pub fn wad_mul(a: u128, b: u128, rounding: Rounding) -> Result<u128, MathError> {
    mul_div(a, b, WAD, rounding)
}

/// `a * WAD / b`
pub fn wad_div(a: u128, b: u128, rounding: Rounding) -> Result<u128, MathError> {
    mul_div(a, WAD, b, rounding)
}

/// `10^decimals`
pub fn pow10(decimals: u8) -> Result<u128, MathError> {
    if decimals > MAX_DECIMALS {
        return Err(MathError::Overflow);
    }
    Ok(10u128.pow(decimals as u32))
}

/// WAD-scaled USD value of `amount` tokens priced at `price` (WAD per whole token)
pub fn value_of(amount: u128, price: u128, decimals: u8, rounding: Rounding) -> Result<u128, MathError> {
    mul_div(amount, price, pow10(decimals)?, rounding)
}

/// Token amount worth `value` (WAD USD) at `price`
pub fn amount_of(value: u128, price: u128, decimals: u8, rounding: Rounding) -> Result<u128, MathError> {
    if price == 0 {
        return Err(MathError::DivisionByZero);
    }
    mul_div(value, pow10(decimals)?, price, rounding)
}

/// Rescale a native token amount to 18 decimals
pub fn to_wad_units(amount: u128, decimals: u8, rounding: Rounding) -> Result<u128, MathError> {
    if decimals <= WAD_DECIMALS {
        amount
            .checked_mul(pow10(WAD_DECIMALS - decimals)?)
            .ok_or(MathError::Overflow)
    } else {
        mul_div(amount, 1, pow10(decimals - WAD_DECIMALS)?, rounding)
    }
}

/// Rescale an 18-decimal amount back to native token decimals
pub fn from_wad_units(amount: u128, decimals: u8, rounding: Rounding) -> Result<u128, MathError> {
    if decimals <= WAD_DECIMALS {
        mul_div(amount, 1, pow10(WAD_DECIMALS - decimals)?, rounding)
    } else {
        amount
            .checked_mul(pow10(decimals - WAD_DECIMALS)?)
            .ok_or(MathError::Overflow)
    }
}

/// `amount * bps / 10_000`
pub fn apply_bps(amount: u128, bps: u128, rounding: Rounding) -> Result<u128, MathError> {
    mul_div(amount, bps, BPS_DENOMINATOR, rounding)
}
