//! Pure Rust model of the leverage vault arithmetic
//! No host dependencies, no unwrap/panic, all functions total
//!
//! This crate is no_std compatible so the same functions back the vault
//! logic, the simulation and the property tests.

#![no_std]
#![forbid(unsafe_code)]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod math;
pub mod leverage;
pub mod shares;


// Re-export commonly used types
pub use leverage::{leverage_ratio, plan_rebalance, Band, LeverageError, RebalancePlan, Valuation};
pub use math::{MathError, Rounding, BPS_DENOMINATOR, WAD};
pub use shares::{shares_for_deposit, withdraw_claim, Claim, ShareError};
