//! Leverage Model
//!
//! Pure functions for valuing a collateral/debt position, computing its
//! leverage ratio and sizing the trade that brings it back to target.
//!
//! # Properties
//! - **L1**: leverage = collateral / (collateral - debt), WAD-scaled, rounded up
//! - **L2**: an empty position has leverage 1.0 and never needs a rebalance
//! - **L3**: a position inside the band is never traded (`Hold`)
//! - **L4**: lever-up sizes round down, lever-down sizes round up, so the
//!   planned trade never overshoots the target on the levered side

use crate::math::{mul_div, wad_mul, MathError, Rounding, WAD};

/// Errors from the leverage model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeverageError {
    /// Debt value is at or above collateral value
    Insolvent,
    /// Band is not ordered `1 <= lower <= target <= upper`, `lower < upper`
    InvalidBounds,
    /// Fixed-point failure
    Math(MathError),
}

impl From<MathError> for LeverageError {
    fn from(e: MathError) -> Self {
        LeverageError::Math(e)
    }
}

/// WAD-scaled USD values of both legs of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Valuation {
    /// Collateral value (rounded down when priced)
    pub collateral_value: u128,
    /// Debt value (rounded up when priced)
    pub debt_value: u128,
}

impl Valuation {
    pub fn new(collateral_value: u128, debt_value: u128) -> Self {
        Self { collateral_value, debt_value }
    }

    /// True when neither leg holds any value
    pub fn is_empty(&self) -> bool {
        self.collateral_value == 0 && self.debt_value == 0
    }

    /// Net equity: collateral - debt
    pub fn equity(&self) -> Result<u128, LeverageError> {
        if self.is_empty() {
            return Ok(0);
        }
        match self.collateral_value.checked_sub(self.debt_value) {
            Some(equity) if equity > 0 => Ok(equity),
            _ => Err(LeverageError::Insolvent),
        }
    }
}

/// Leverage band with the target the rebalancer aims for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub lower: u128,
    pub target: u128,
    pub upper: u128,
}

impl Band {
    /// Build a validated band
    pub fn new(lower: u128, target: u128, upper: u128) -> Result<Self, LeverageError> {
        if lower < WAD || lower > target || target > upper || lower == upper {
            return Err(LeverageError::InvalidBounds);
        }
        Ok(Self { lower, target, upper })
    }

    /// Inclusive membership test
    pub fn contains(&self, leverage: u128) -> bool {
        leverage >= self.lower && leverage <= self.upper
    }

    /// True when this band lies inside `envelope`
    pub fn is_within(&self, envelope: &Band) -> bool {
        self.lower >= envelope.lower && self.upper <= envelope.upper
    }
}

/// Leverage ratio of a position (L1, L2)
///
/// Rounded up so a position is never reported as less levered than it is.
pub fn leverage_ratio(valuation: Valuation) -> Result<u128, LeverageError> {
    if valuation.is_empty() {
        return Ok(WAD);
    }
    let equity = valuation.equity()?;
    Ok(mul_div(valuation.collateral_value, WAD, equity, Rounding::Up)?)
}

/// What the rebalancer must do to restore the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalancePlan {
    /// Already inside the band
    Hold,
    /// Borrow this much debt value, swap into collateral, supply
    LeverUp { debt_value: u128 },
    /// Borrow this much collateral value, swap into debt, repay
    LeverDown { collateral_value: u128 },
}

/// Size the trade that returns a drifted position to target (L3, L4)
///
/// Equity is held constant (swap costs ignored), so the collateral the
/// position should carry is `target * equity`. The difference to the current
/// collateral is the notional moved by the flash cycle.
pub fn plan_rebalance(valuation: Valuation, band: &Band) -> Result<RebalancePlan, LeverageError> {
    if valuation.is_empty() {
        return Ok(RebalancePlan::Hold);
    }

    let leverage = leverage_ratio(valuation)?;
    if band.contains(leverage) {
        return Ok(RebalancePlan::Hold);
    }

    let equity = valuation.equity()?;
    let desired_collateral = wad_mul(equity, band.target, Rounding::Down)?;

    if desired_collateral > valuation.collateral_value {
        Ok(RebalancePlan::LeverUp {
            debt_value: desired_collateral - valuation.collateral_value,
        })
    } else {
        // desired_collateral was floored, so this delta is the rounded-up side
        Ok(RebalancePlan::LeverDown {
            collateral_value: valuation.collateral_value - desired_collateral,
        })
    }
}

/// Leverage after moving `debt_delta` of value into collateral, at zero cost
///
/// Used to sanity check plans: `(C + d) / (C + d - (D + d))`.
pub fn leverage_after_lever_up(valuation: Valuation, debt_delta: u128) -> Result<u128, LeverageError> {
    let collateral_value = valuation
        .collateral_value
        .checked_add(debt_delta)
        .ok_or(MathError::Overflow)?;
    let debt_value = valuation
        .debt_value
        .checked_add(debt_delta)
        .ok_or(MathError::Overflow)?;
    leverage_ratio(Valuation::new(collateral_value, debt_value))
}

/// Leverage after using `collateral_delta` of collateral to repay debt, at zero cost
pub fn leverage_after_lever_down(valuation: Valuation, collateral_delta: u128) -> Result<u128, LeverageError> {
    let collateral_value = valuation
        .collateral_value
        .checked_sub(collateral_delta)
        .ok_or(LeverageError::Insolvent)?;
    let debt_value = valuation.debt_value.saturating_sub(collateral_delta);
    leverage_ratio(Valuation::new(collateral_value, debt_value))
}
