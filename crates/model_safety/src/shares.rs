//! Share Accounting Model
//!
//! Mint/burn arithmetic for vault shares, each share being a proportional
//! claim on the position's collateral and debt.
//!
//! # Properties
//! - **S1**: the first deposit mints 1:1 at 18-decimal share precision
//! - **S2**: later deposits mint `amount * total_shares / value_before`, rounded down
//! - **S3**: a withdrawal claim rounds collateral down and debt up, so the
//!   remaining holders are never diluted by rounding
//! - **S4**: share deltas never overflow or drive a balance negative

use crate::math::{apply_bps, mul_div, MathError, Rounding, BPS_DENOMINATOR};

/// Errors from share arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareError {
    /// Amount (or resulting share count) is zero
    ZeroAmount,
    /// Burning more shares than exist / are held
    InsufficientShares,
    /// Shares outstanding but the position carries no value
    Insolvent,
    /// Fee rate above 100%
    InvalidFee,
    /// Fixed-point failure
    Math(MathError),
}

impl From<MathError> for ShareError {
    fn from(e: MathError) -> Self {
        ShareError::Math(e)
    }
}

/// Shares to mint for a deposit worth `amount_wad` (S1, S2)
///
/// `value_before_wad` is the position value in the same 18-decimal collateral
/// units, measured before the deposit lands.
pub fn shares_for_deposit(
    amount_wad: u128,
    total_shares: u128,
    value_before_wad: u128,
) -> Result<u128, ShareError> {
    if amount_wad == 0 {
        return Err(ShareError::ZeroAmount);
    }
    if total_shares == 0 {
        return Ok(amount_wad);
    }
    if value_before_wad == 0 {
        return Err(ShareError::Insolvent);
    }

    let minted = mul_div(amount_wad, total_shares, value_before_wad, Rounding::Down)?;
    if minted == 0 {
        return Err(ShareError::ZeroAmount);
    }
    Ok(minted)
}

/// Proportional slice of the position owed to a withdrawing holder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    /// Collateral released (rounded down)
    pub collateral: u128,
    /// Debt that must be repaid first (rounded up)
    pub debt: u128,
}

/// Claim of `shares` out of `total_shares` on a position (S3)
pub fn withdraw_claim(
    collateral: u128,
    debt: u128,
    total_shares: u128,
    shares: u128,
) -> Result<Claim, ShareError> {
    if shares == 0 {
        return Err(ShareError::ZeroAmount);
    }
    if shares > total_shares {
        return Err(ShareError::InsufficientShares);
    }
    if shares == total_shares {
        return Ok(Claim { collateral, debt });
    }

    Ok(Claim {
        collateral: mul_div(collateral, shares, total_shares, Rounding::Down)?,
        debt: mul_div(debt, shares, total_shares, Rounding::Up)?,
    })
}

/// Split a withdrawal into (burned, fee) shares
///
/// The fee portion is rounded down and is transferred rather than burned.
pub fn split_exit_fee(shares: u128, fee_bps: u16) -> Result<(u128, u128), ShareError> {
    if fee_bps as u128 > BPS_DENOMINATOR {
        return Err(ShareError::InvalidFee);
    }
    let fee = apply_bps(shares, fee_bps as u128, Rounding::Down)?;
    Ok((shares - fee, fee))
}

/// Apply a signed share delta to a balance (S4)
pub fn apply_shares_delta(current: u128, delta: i128) -> Result<u128, ShareError> {
    if delta >= 0 {
        current
            .checked_add(delta as u128)
            .ok_or(ShareError::Math(MathError::Overflow))
    } else {
        let abs_delta = delta.unsigned_abs();
        if current < abs_delta {
            return Err(ShareError::InsufficientShares);
        }
        Ok(current - abs_delta)
    }
}

/// Value of one whole share (1e18 units), in the position's value units
pub fn share_price(value_wad: u128, total_shares: u128) -> Result<u128, ShareError> {
    if total_shares == 0 {
        return Ok(crate::math::WAD);
    }
    Ok(mul_div(value_wad, crate::math::WAD, total_shares, Rounding::Down)?)
}
