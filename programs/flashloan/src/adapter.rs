//! Flashloan adapter state and entrypoints
//!
//! The adapter owns the trade path registry, the authorized-vault allow-list
//! and its venue configuration. It holds no funds between calls.

use crate::cycle::{FlashCycle, FlashloanReport, FlashloanRequest};
use crate::registry::{TradePath, TradePathRegistry};
use adapter_core::{oracle_quote, IncentivesController, MoneyMarket, SlippageGuard, SwapRouter, Venues};
use dango_common::{Address, ProtocolError, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeSet;

/// Incentives wiring of a version-2 adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardsConfig {
    pub incentives_controller: Address,
    pub reward_token: Address,
}

/// Which constructor shape the adapter was deployed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfigVersion {
    /// Provider, data provider, router, slippage, vaults
    V1,
    /// V1 plus incentives controller and reward token
    V2,
}

impl ConfigVersion {
    /// Rewards wiring decides the version
    pub fn of(rewards: Option<&RewardsConfig>) -> Self {
        match rewards {
            Some(_) => ConfigVersion::V2,
            None => ConfigVersion::V1,
        }
    }
}

/// Construction-time adapter parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub addresses_provider: Address,
    pub data_provider: Address,
    pub router: Address,
    pub rewards: Option<RewardsConfig>,
    pub slippage_bps: u16,
    pub authorized_vaults: Vec<Address>,
}

impl AdapterConfig {
    pub fn v1(
        addresses_provider: Address,
        data_provider: Address,
        router: Address,
        slippage_bps: u16,
        authorized_vaults: Vec<Address>,
    ) -> Self {
        Self { addresses_provider, data_provider, router, rewards: None, slippage_bps, authorized_vaults }
    }

    pub fn v2(
        addresses_provider: Address,
        data_provider: Address,
        router: Address,
        incentives_controller: Address,
        reward_token: Address,
        slippage_bps: u16,
        authorized_vaults: Vec<Address>,
    ) -> Self {
        Self {
            addresses_provider,
            data_provider,
            router,
            rewards: Some(RewardsConfig { incentives_controller, reward_token }),
            slippage_bps,
            authorized_vaults,
        }
    }

    pub fn version(&self) -> ConfigVersion {
        ConfigVersion::of(self.rewards.as_ref())
    }
}

/// Result of a reward harvest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    /// Reward tokens claimed
    pub claimed: u128,
    /// Collateral supplied on the vault's behalf
    pub supplied: u128,
}

#[derive(Debug, Clone)]
pub struct FlashloanAdapter {
    address: Address,
    admin: Address,
    addresses_provider: Address,
    data_provider: Address,
    router: Address,
    rewards: Option<RewardsConfig>,
    guard: SlippageGuard,
    authorized: BTreeSet<Address>,
    registry: TradePathRegistry,
    /// Set while a cycle is in flight
    entered: bool,
}

impl FlashloanAdapter {
    pub fn new(address: Address, admin: Address, config: AdapterConfig) -> Result<Self> {
        let guard = SlippageGuard::new(config.slippage_bps)?;
        info!(
            "flashloan adapter {} deployed ({:?}, slippage {} bps, {} vaults)",
            address,
            config.version(),
            config.slippage_bps,
            config.authorized_vaults.len()
        );
        Ok(Self {
            address,
            admin,
            addresses_provider: config.addresses_provider,
            data_provider: config.data_provider,
            router: config.router,
            rewards: config.rewards,
            guard,
            authorized: config.authorized_vaults.into_iter().collect(),
            registry: TradePathRegistry::new(),
            entered: false,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn config_version(&self) -> ConfigVersion {
        ConfigVersion::of(self.rewards.as_ref())
    }

    pub fn rewards(&self) -> Option<RewardsConfig> {
        self.rewards
    }

    pub fn slippage_bps(&self) -> u16 {
        self.guard.max_slippage_bps
    }

    pub fn is_authorized(&self, vault: Address) -> bool {
        self.authorized.contains(&vault)
    }

    pub fn trade_path(&self, token_in: Address, token_out: Address) -> Result<&TradePath> {
        self.registry.resolve(token_in, token_out)
    }

    pub fn registry(&self) -> &TradePathRegistry {
        &self.registry
    }

    fn only_admin(&self, caller: Address) -> Result<()> {
        if caller != self.admin {
            warn!("adapter {}: admin call from {}", self.address, caller);
            return Err(ProtocolError::Unauthorized);
        }
        Ok(())
    }

    fn only_vault(&self, caller: Address, vault: Address) -> Result<()> {
        if caller != vault || !self.authorized.contains(&vault) {
            warn!("adapter {}: rejected call from {} for vault {}", self.address, caller, vault);
            return Err(ProtocolError::UnauthorizedCaller);
        }
        Ok(())
    }

    fn check_venues(&self, market: &dyn MoneyMarket, router: &dyn SwapRouter) -> Result<()> {
        if market.addresses_provider() != self.addresses_provider
            || market.data_provider() != self.data_provider
            || router.address() != self.router
        {
            return Err(ProtocolError::CollaboratorMismatch);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------------

    /// Register or overwrite the route for `token_in -> token_out`
    pub fn add_trade_path(
        &mut self,
        caller: Address,
        token_in: Address,
        token_out: Address,
        hops: &[Address],
    ) -> Result<()> {
        self.only_admin(caller)?;
        self.registry.insert(token_in, token_out, hops)?;
        info!("trade path {} -> {} set ({} tokens)", token_in, token_out, hops.len());
        Ok(())
    }

    pub fn add_authorized_vault(&mut self, caller: Address, vault: Address) -> Result<()> {
        self.only_admin(caller)?;
        self.authorized.insert(vault);
        info!("vault {} authorized on adapter {}", vault, self.address);
        Ok(())
    }

    pub fn remove_authorized_vault(&mut self, caller: Address, vault: Address) -> Result<()> {
        self.only_admin(caller)?;
        self.authorized.remove(&vault);
        info!("vault {} deauthorized on adapter {}", vault, self.address);
        Ok(())
    }

    pub fn set_slippage_bps(&mut self, caller: Address, slippage_bps: u16) -> Result<()> {
        self.only_admin(caller)?;
        self.guard = SlippageGuard::new(slippage_bps)?;
        Ok(())
    }

    pub fn transfer_admin(&mut self, caller: Address, new_admin: Address) -> Result<()> {
        self.only_admin(caller)?;
        self.admin = new_admin;
        info!("adapter {} admin -> {}", self.address, new_admin);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Vault entrypoints
    // ------------------------------------------------------------------------

    /// Run one flash-loan-funded swap for `request.vault`
    ///
    /// The caller must be the vault itself and the vault must be authorized.
    /// Nested entry while a cycle is in flight is rejected.
    pub fn execute_flashloan(
        &mut self,
        venues: &mut Venues<'_>,
        caller: Address,
        request: FlashloanRequest,
    ) -> Result<FlashloanReport> {
        if self.entered {
            return Err(ProtocolError::Reentrancy);
        }
        self.only_vault(caller, request.vault)?;
        if request.borrow_amount == 0 {
            return Err(ProtocolError::ZeroAmount);
        }
        self.check_venues(&*venues.market, &*venues.router)?;

        self.entered = true;
        let result = self.run_cycle(venues, request);
        self.entered = false;

        match &result {
            Ok(report) => debug!(
                "flashloan {:?} for {}: borrowed {} premium {} out {}",
                report.direction, request.vault, report.borrowed, report.premium, report.swapped_out
            ),
            Err(e) => warn!("flashloan for {} aborted: {}", request.vault, e),
        }
        result
    }

    fn run_cycle(&self, venues: &mut Venues<'_>, request: FlashloanRequest) -> Result<FlashloanReport> {
        let Venues { ledger, market, router } = venues;
        let mut cycle = FlashCycle::new(self.address, request, &self.registry, &mut **router, self.guard);
        market.flash_loan(ledger, self.address, &mut cycle, request.borrow_token, request.borrow_amount)?;
        cycle.report().ok_or(ProtocolError::CollaboratorMismatch)
    }

    /// Claim the vault's accrued incentives, swap them into `collateral` and
    /// supply the proceeds on the vault's behalf
    pub fn harvest_rewards(
        &mut self,
        venues: &mut Venues<'_>,
        incentives: &mut dyn IncentivesController,
        caller: Address,
        vault: Address,
        collateral: Address,
    ) -> Result<HarvestReport> {
        let rewards = self.rewards.ok_or(ProtocolError::RewardsNotConfigured)?;
        if self.entered {
            return Err(ProtocolError::Reentrancy);
        }
        self.only_vault(caller, vault)?;
        self.check_venues(&*venues.market, &*venues.router)?;
        if incentives.address() != rewards.incentives_controller
            || incentives.reward_token() != rewards.reward_token
        {
            return Err(ProtocolError::CollaboratorMismatch);
        }

        self.entered = true;
        let result = self.run_harvest(venues, incentives, rewards, vault, collateral);
        self.entered = false;
        result
    }

    fn run_harvest(
        &self,
        venues: &mut Venues<'_>,
        incentives: &mut dyn IncentivesController,
        rewards: RewardsConfig,
        vault: Address,
        collateral: Address,
    ) -> Result<HarvestReport> {
        let reward = rewards.reward_token;
        let before = venues.ledger.balance_of(reward, self.address);
        incentives.claim_rewards(venues.ledger, self.address, vault, self.address)?;
        let claimed = venues.ledger.balance_of(reward, self.address).saturating_sub(before);
        if claimed == 0 {
            return Ok(HarvestReport::default());
        }

        let path = self.registry.resolve(reward, collateral)?;
        let expected = oracle_quote(&*venues.market, venues.ledger, reward, collateral, claimed)?;
        let min_out = self.guard.min_amount_out(expected)?;

        let collateral_before = venues.ledger.balance_of(collateral, self.address);
        venues.router.swap_exact_tokens_for_tokens(
            venues.ledger,
            self.address,
            claimed,
            min_out,
            path.tokens(),
            self.address,
        )?;
        let received = venues
            .ledger
            .balance_of(collateral, self.address)
            .saturating_sub(collateral_before);

        venues.market.supply(venues.ledger, self.address, collateral, received, vault)?;
        info!("harvested {} rewards for {}: supplied {} collateral", claimed, vault, received);
        Ok(HarvestReport { claimed, supplied: received })
    }
}

#[cfg(test)]
mod tests;
