//! Liquidity-mining incentives controller

use adapter_core::IncentivesController;
use dango_common::{Address, Ledger, ProtocolError, Result};
use log::{debug, info};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncentivesConfig {
    pub address: Address,
    pub reward_token: Address,
    /// May register claimers on behalf of users
    pub emission_manager: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incentives {
    config: IncentivesConfig,
    accrued: BTreeMap<Address, u128>,
    claimers: BTreeMap<Address, Address>,
}

impl Incentives {
    pub fn new(config: IncentivesConfig) -> Self {
        Self { config, accrued: BTreeMap::new(), claimers: BTreeMap::new() }
    }

    /// Credit `amount` of rewards to `user`, minting them into the controller
    pub fn accrue(&mut self, ledger: &mut Ledger, user: Address, amount: u128) -> Result<()> {
        ledger.mint(self.config.reward_token, self.config.address, amount)?;
        let balance = self.accrued.entry(user).or_default();
        *balance = balance.checked_add(amount).ok_or(ProtocolError::MathOverflow)?;
        debug!("incentives: {} accrued {} (total {})", user, amount, balance);
        Ok(())
    }

    pub fn set_claimer(&mut self, caller: Address, user: Address, claimer: Address) -> Result<()> {
        if caller != self.config.emission_manager {
            return Err(ProtocolError::Unauthorized);
        }
        self.claimers.insert(user, claimer);
        info!("incentives: {} may claim for {}", claimer, user);
        Ok(())
    }

    pub fn claimer_of(&self, user: Address) -> Option<Address> {
        self.claimers.get(&user).copied()
    }
}

impl IncentivesController for Incentives {
    fn address(&self) -> Address {
        self.config.address
    }

    fn reward_token(&self) -> Address {
        self.config.reward_token
    }

    fn rewards_balance(&self, user: Address) -> u128 {
        self.accrued.get(&user).copied().unwrap_or(0)
    }

    fn claim_rewards(&mut self, ledger: &mut Ledger, caller: Address, user: Address, to: Address) -> Result<u128> {
        if caller != user && self.claimer_of(user) != Some(caller) {
            return Err(ProtocolError::Unauthorized);
        }
        let amount = self.rewards_balance(user);
        if amount == 0 {
            return Ok(0);
        }
        ledger.transfer(self.config.reward_token, self.config.address, to, amount)?;
        self.accrued.remove(&user);
        Ok(amount)
    }
}
