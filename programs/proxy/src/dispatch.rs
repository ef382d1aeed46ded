//! Forwardable vault calls

use dango_common::Address;
use dango_vault::{DepositReceipt, HarvestReceipt, RebalanceOutcome, WithdrawReceipt};
use serde::Serialize;

/// A state-changing call the proxy forwards to its logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum VaultCall {
    Deposit { amount: u128 },
    Withdraw { shares: u128 },
    Rebalance,
    Harvest,
    Transfer { to: Address, shares: u128 },
    SetExitFee { fee_bps: u16 },
}

impl VaultCall {
    pub fn name(&self) -> &'static str {
        match self {
            VaultCall::Deposit { .. } => "Deposit",
            VaultCall::Withdraw { .. } => "Withdraw",
            VaultCall::Rebalance => "Rebalance",
            VaultCall::Harvest => "Harvest",
            VaultCall::Transfer { .. } => "Transfer",
            VaultCall::SetExitFee { .. } => "SetExitFee",
        }
    }
}

/// What a forwarded call returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "call", content = "receipt", rename_all = "snake_case")]
pub enum CallOutcome {
    Deposit(DepositReceipt),
    Withdraw(WithdrawReceipt),
    Rebalance(RebalanceOutcome),
    Harvest(HarvestReceipt),
    Transfer,
    SetExitFee,
}
