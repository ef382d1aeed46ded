//! AMM Model - Pure constant product math (x·y=k)
//!
//! This crate contains the constant product formulas used by the simulated
//! exchange router. Amounts are raw token units; fees are charged on input.
//!
//! The simulated router imports and uses these functions directly, so the
//! property tests and the router share one implementation.

#![no_std]
#![forbid(unsafe_code)]

pub mod math;

pub use math::{get_amount_in, get_amount_out, quote, spot_price_wad};

/// Basis points scale (10,000 bps = 100%)
pub const BPS_SCALE: u128 = 10_000;

/// SushiSwap/UniswapV2 pool fee (0.30%)
pub const DEFAULT_FEE_BPS: u16 = 30;

/// Error types for AMM operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmmError {
    /// Invalid reserves (zero)
    InvalidReserves,
    /// Invalid amount (zero, or fee at/above 100%)
    InvalidAmount,
    /// Insufficient liquidity in pool
    InsufficientLiquidity,
    /// Arithmetic overflow
    Overflow,
}

impl From<model_safety::MathError> for AmmError {
    fn from(_: model_safety::MathError) -> Self {
        AmmError::Overflow
    }
}
