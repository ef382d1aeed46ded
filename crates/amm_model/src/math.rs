//! Constant product AMM math (x·y=k)

use crate::{AmmError, BPS_SCALE};
use model_safety::math::{mul_div, Rounding, WAD};

fn fee_multiplier(fee_bps: u16) -> Result<u128, AmmError> {
    let fee = fee_bps as u128;
    if fee >= BPS_SCALE {
        return Err(AmmError::InvalidAmount);
    }
    Ok(BPS_SCALE - fee)
}

/// Output for an exact input (fee on input)
///
/// - Δx_net = Δx_in · (1 - fee)
/// - Δy_out = y0 · Δx_net / (x0 + Δx_net)
///
/// # Arguments
/// * `amount_in` - Exact input amount
/// * `reserve_in` - Reserve of the input token
/// * `reserve_out` - Reserve of the output token
/// * `fee_bps` - Pool fee in basis points (e.g., 30 = 0.30%)
pub fn get_amount_out(
    amount_in: u128,
    reserve_in: u128,
    reserve_out: u128,
    fee_bps: u16,
) -> Result<u128, AmmError> {
    if amount_in == 0 {
        return Err(AmmError::InvalidAmount);
    }
    if reserve_in == 0 || reserve_out == 0 {
        return Err(AmmError::InvalidReserves);
    }

    let amount_in_with_fee = amount_in
        .checked_mul(fee_multiplier(fee_bps)?)
        .ok_or(AmmError::Overflow)?;
    let denominator = reserve_in
        .checked_mul(BPS_SCALE)
        .and_then(|d| d.checked_add(amount_in_with_fee))
        .ok_or(AmmError::Overflow)?;

    let out = mul_div(amount_in_with_fee, reserve_out, denominator, Rounding::Down)?;
    if out == 0 {
        return Err(AmmError::InsufficientLiquidity);
    }
    Ok(out)
}

/// Input required for an exact output (fee on input)
///
/// - Δx_in = x0 · Δy_out / ((y0 - Δy_out) · (1 - fee)) + 1
pub fn get_amount_in(
    amount_out: u128,
    reserve_in: u128,
    reserve_out: u128,
    fee_bps: u16,
) -> Result<u128, AmmError> {
    if amount_out == 0 {
        return Err(AmmError::InvalidAmount);
    }
    if reserve_in == 0 || reserve_out == 0 {
        return Err(AmmError::InvalidReserves);
    }
    if amount_out >= reserve_out {
        return Err(AmmError::InsufficientLiquidity);
    }

    let numerator = reserve_in.checked_mul(BPS_SCALE).ok_or(AmmError::Overflow)?;
    let denominator = (reserve_out - amount_out)
        .checked_mul(fee_multiplier(fee_bps)?)
        .ok_or(AmmError::Overflow)?;

    let amount_in = mul_div(numerator, amount_out, denominator, Rounding::Down)?;
    amount_in.checked_add(1).ok_or(AmmError::Overflow)
}

/// Equivalent amount of the other asset at the current reserve ratio (no fee)
pub fn quote(amount_a: u128, reserve_a: u128, reserve_b: u128) -> Result<u128, AmmError> {
    if amount_a == 0 {
        return Err(AmmError::InvalidAmount);
    }
    if reserve_a == 0 || reserve_b == 0 {
        return Err(AmmError::InvalidReserves);
    }
    Ok(mul_div(amount_a, reserve_b, reserve_a, Rounding::Down)?)
}

/// Spot price of one raw unit of `a` in raw units of `b`, WAD-scaled
pub fn spot_price_wad(reserve_a: u128, reserve_b: u128) -> Result<u128, AmmError> {
    if reserve_a == 0 || reserve_b == 0 {
        return Err(AmmError::InvalidReserves);
    }
    Ok(mul_div(reserve_b, WAD, reserve_a, Rounding::Down)?)
}
