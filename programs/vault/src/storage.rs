//! Persistent vault storage
//!
//! Field order is part of the upgrade contract: a logic version declares the
//! layout it expects via `storage_layout()`, and the proxy refuses to pair
//! logic and storage whose layouts differ unless a migration is supplied.

use dango_common::{Address, ProtocolError, Result};
use model_safety::shares::apply_shares_delta;
use serde::Serialize;
use std::collections::BTreeMap;

/// Layout written by the current logic
pub const STORAGE_LAYOUT: u16 = 1;

/// Aggregate position the shares claim
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Position {
    /// Collateral supplied at the money market, native units
    pub collateral_amount: u128,
    /// Debt owed to the money market, native units
    pub debt_amount: u128,
    /// Outstanding shares (18 decimals)
    pub total_shares: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultStorage {
    pub layout_version: u16,
    pub initialized: bool,
    pub name: String,
    pub symbol: String,
    pub adapter: Address,
    pub fee_recipient: Address,
    /// Operative band (WAD); the target comes from the logic
    pub lower_bound: u128,
    pub upper_bound: u128,
    pub capacity: u128,
    pub exit_fee_bps: u16,
    pub position: Position,
    balances: BTreeMap<Address, u128>,
}

impl VaultStorage {
    pub fn new(layout_version: u16) -> Self {
        Self { layout_version, ..Self::default() }
    }

    pub fn balance_of(&self, holder: Address) -> u128 {
        self.balances.get(&holder).copied().unwrap_or(0)
    }

    /// Sum of all share balances; always equals `position.total_shares`
    pub fn sum_of_balances(&self) -> u128 {
        self.balances.values().sum()
    }

    pub(crate) fn mint(&mut self, to: Address, shares: u128) -> Result<()> {
        let delta = i128::try_from(shares).map_err(|_| ProtocolError::MathOverflow)?;
        let total = apply_shares_delta(self.position.total_shares, delta)?;
        let balance = apply_shares_delta(self.balance_of(to), delta)?;
        self.position.total_shares = total;
        self.set_balance(to, balance);
        Ok(())
    }

    pub(crate) fn burn(&mut self, from: Address, shares: u128) -> Result<()> {
        let delta = i128::try_from(shares).map_err(|_| ProtocolError::MathOverflow)?;
        let balance = apply_shares_delta(self.balance_of(from), -delta)?;
        let total = apply_shares_delta(self.position.total_shares, -delta)?;
        self.position.total_shares = total;
        self.set_balance(from, balance);
        Ok(())
    }

    pub(crate) fn transfer_shares(&mut self, from: Address, to: Address, shares: u128) -> Result<()> {
        let from_balance = self.balance_of(from);
        let from_after = from_balance.checked_sub(shares).ok_or(ProtocolError::InsufficientShares)?;
        if from == to || shares == 0 {
            return Ok(());
        }
        let to_after = self
            .balance_of(to)
            .checked_add(shares)
            .ok_or(ProtocolError::MathOverflow)?;
        self.set_balance(from, from_after);
        self.set_balance(to, to_after);
        Ok(())
    }

    fn set_balance(&mut self, holder: Address, shares: u128) {
        if shares == 0 {
            self.balances.remove(&holder);
        } else {
            self.balances.insert(holder, shares);
        }
    }
}

/// Versioned rewrite of storage from one layout to the next
pub trait StorageMigration {
    fn from_layout(&self) -> u16;
    fn to_layout(&self) -> u16;
    fn migrate(&self, storage: &mut VaultStorage) -> Result<()>;
}
