//! The interface the proxy dispatches through
//!
//! A logic version is a stateless object: every entrypoint receives the
//! proxy's `VaultStorage`, the venues of the current call and the call
//! context. Swapping the `Arc<dyn VaultLogic>` behind a proxy changes
//! behavior without touching storage.

use crate::config::{InitParams, VaultConfig};
use crate::storage::{Position, VaultStorage};
use adapter_core::{IncentivesController, MoneyMarket, Venues};
use dango_common::{Address, CallContext, Ledger, Result};
use dango_flashloan::{FlashloanAdapter, FlashloanReport};
use serde::Serialize;
use std::fmt::Debug;

/// Everything a state-changing vault call may touch
pub struct Env<'a> {
    pub venues: Venues<'a>,
    pub adapter: &'a mut FlashloanAdapter,
    pub incentives: Option<&'a mut dyn IncentivesController>,
}

impl<'a> Env<'a> {
    pub fn new(
        venues: Venues<'a>,
        adapter: &'a mut FlashloanAdapter,
        incentives: Option<&'a mut dyn IncentivesController>,
    ) -> Self {
        Self { venues, adapter, incentives }
    }
}

/// Read-only venues for views
#[derive(Clone, Copy)]
pub struct MarketView<'a> {
    pub ledger: &'a Ledger,
    pub market: &'a dyn MoneyMarket,
}

impl<'a> MarketView<'a> {
    pub fn new(ledger: &'a Ledger, market: &'a dyn MoneyMarket) -> Self {
        Self { ledger, market }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepositReceipt {
    pub shares_minted: u128,
    /// Leverage after the call (WAD)
    pub leverage: u128,
    pub rebalance: Option<FlashloanReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WithdrawReceipt {
    pub shares_burned: u128,
    /// Shares moved to the fee recipient instead of burned
    pub fee_shares: u128,
    /// Collateral paid out to the holder
    pub collateral_out: u128,
    /// Debt repaid on the holder's behalf
    pub debt_repaid: u128,
    pub leverage: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RebalanceOutcome {
    /// Already within the band
    Skipped { leverage: u128 },
    Rebalanced { before: u128, after: u128, report: FlashloanReport },
}

impl RebalanceOutcome {
    /// Leverage after the call
    pub fn leverage(&self) -> u128 {
        match self {
            RebalanceOutcome::Skipped { leverage } => *leverage,
            RebalanceOutcome::Rebalanced { after, .. } => *after,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HarvestReceipt {
    pub claimed: u128,
    pub supplied: u128,
    pub leverage: u128,
}

/// Position together with its valuation at current oracle prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionSnapshot {
    pub collateral_amount: u128,
    pub debt_amount: u128,
    pub total_shares: u128,
    pub collateral_value: u128,
    pub debt_value: u128,
    /// Equity in WAD collateral units
    pub equity_value: u128,
    pub leverage: u128,
}

impl PositionSnapshot {
    pub fn position(&self) -> Position {
        Position {
            collateral_amount: self.collateral_amount,
            debt_amount: self.debt_amount,
            total_shares: self.total_shares,
        }
    }
}

/// One version of the vault's behavior
pub trait VaultLogic: Debug + Send + Sync {
    /// Human readable version, reported by the proxy as its implementation
    fn version(&self) -> &str;

    /// Storage layout this logic reads and writes
    fn storage_layout(&self) -> u16;

    fn config(&self) -> &VaultConfig;

    fn initialize(
        &self,
        storage: &mut VaultStorage,
        env: &mut Env<'_>,
        ctx: CallContext,
        params: InitParams,
    ) -> Result<()>;

    fn deposit(
        &self,
        storage: &mut VaultStorage,
        env: &mut Env<'_>,
        ctx: CallContext,
        amount: u128,
    ) -> Result<DepositReceipt>;

    fn withdraw(
        &self,
        storage: &mut VaultStorage,
        env: &mut Env<'_>,
        ctx: CallContext,
        shares: u128,
    ) -> Result<WithdrawReceipt>;

    fn rebalance(&self, storage: &mut VaultStorage, env: &mut Env<'_>, ctx: CallContext) -> Result<RebalanceOutcome>;

    fn harvest(&self, storage: &mut VaultStorage, env: &mut Env<'_>, ctx: CallContext) -> Result<HarvestReceipt>;

    fn transfer(&self, storage: &mut VaultStorage, ctx: CallContext, to: Address, shares: u128) -> Result<()>;

    fn set_exit_fee(&self, storage: &mut VaultStorage, ctx: CallContext, fee_bps: u16) -> Result<()>;

    fn leverage(&self, storage: &VaultStorage, view: MarketView<'_>, this: Address) -> Result<u128>;

    /// Equity in WAD collateral units
    fn position_value(&self, storage: &VaultStorage, view: MarketView<'_>, this: Address) -> Result<u128>;

    /// Equity per whole share, WAD collateral units
    fn share_price(&self, storage: &VaultStorage, view: MarketView<'_>, this: Address) -> Result<u128>;

    fn needs_rebalance(&self, storage: &VaultStorage, view: MarketView<'_>, this: Address) -> Result<bool>;

    fn snapshot(&self, storage: &VaultStorage, view: MarketView<'_>, this: Address) -> Result<PositionSnapshot>;

    fn name<'s>(&self, storage: &'s VaultStorage) -> &'s str {
        &storage.name
    }

    fn symbol<'s>(&self, storage: &'s VaultStorage) -> &'s str {
        &storage.symbol
    }

    fn decimals(&self) -> u8 {
        18
    }

    fn balance_of(&self, storage: &VaultStorage, holder: Address) -> u128 {
        storage.balance_of(holder)
    }

    fn total_supply(&self, storage: &VaultStorage) -> u128 {
        storage.position.total_shares
    }
}
