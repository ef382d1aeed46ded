//! Proxy state and call forwarding
//!
//! Every forwarded call runs the current logic against the proxy's own
//! storage with a `CallContext` whose `this` is the proxy address, so the
//! logic acts with the proxy's identity on behalf of the original sender.

use crate::dispatch::{CallOutcome, VaultCall};
use dango_common::{Address, CallContext, ProtocolError, Result};
use dango_vault::{
    DepositReceipt, Env, HarvestReceipt, InitParams, MarketView, PositionSnapshot, RebalanceOutcome, StorageMigration,
    VaultLogic, VaultStorage, WithdrawReceipt,
};
use log::{debug, info, warn};
use std::sync::Arc;

/// Proxy-private state, opaque to the logic
#[derive(Debug, Clone)]
pub struct ProxyState {
    pub logic: Arc<dyn VaultLogic>,
    pub admin: Address,
    pub initialized: bool,
}

#[derive(Debug, Clone)]
pub struct UpgradeableProxy {
    address: Address,
    state: ProxyState,
    storage: VaultStorage,
}

impl UpgradeableProxy {
    /// Deploy pointing at `logic`; storage is laid out for that logic
    pub fn deploy(address: Address, logic: Arc<dyn VaultLogic>, admin: Address) -> Self {
        let storage = VaultStorage::new(logic.storage_layout());
        info!("proxy {} deployed at logic {} (admin {})", address, logic.version(), admin);
        Self { address, state: ProxyState { logic, admin, initialized: false }, storage }
    }

    /// Deploy and run `initialize` in the same call
    pub fn deploy_and_initialize(
        address: Address,
        logic: Arc<dyn VaultLogic>,
        admin: Address,
        env: &mut Env<'_>,
        params: InitParams,
    ) -> Result<Self> {
        let mut proxy = Self::deploy(address, logic, admin);
        proxy.initialize(env, admin, params)?;
        Ok(proxy)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn admin(&self) -> Address {
        self.state.admin
    }

    /// Version of the logic currently behind the proxy
    pub fn implementation(&self) -> &str {
        self.state.logic.version()
    }

    pub fn logic(&self) -> &Arc<dyn VaultLogic> {
        &self.state.logic
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized
    }

    pub fn storage(&self) -> &VaultStorage {
        &self.storage
    }

    fn only_admin(&self, caller: Address) -> Result<()> {
        if caller != self.state.admin {
            warn!("proxy {}: admin call from {}", self.address, caller);
            return Err(ProtocolError::Unauthorized);
        }
        Ok(())
    }

    fn context(&self, sender: Address) -> CallContext {
        CallContext::new(sender, self.address)
    }

    // ------------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------------

    pub fn initialize(&mut self, env: &mut Env<'_>, caller: Address, params: InitParams) -> Result<()> {
        self.only_admin(caller)?;
        if self.state.initialized {
            return Err(ProtocolError::AlreadyInitialized);
        }
        let ctx = self.context(caller);
        self.state.logic.initialize(&mut self.storage, env, ctx, params)?;
        self.state.initialized = true;
        Ok(())
    }

    /// Point the proxy at new logic; storage and initialization are untouched
    pub fn upgrade_to(&mut self, caller: Address, logic: Arc<dyn VaultLogic>) -> Result<()> {
        self.only_admin(caller)?;
        let expected = self.storage.layout_version;
        let found = logic.storage_layout();
        if expected != found {
            warn!("proxy {}: refusing logic {} with layout {} over layout {}", self.address, logic.version(), found, expected);
            return Err(ProtocolError::StorageLayoutMismatch { expected, found });
        }
        info!("proxy {} upgraded: {} -> {}", self.address, self.state.logic.version(), logic.version());
        self.state.logic = logic;
        Ok(())
    }

    /// Upgrade across a layout change, rewriting storage with `migration`
    ///
    /// The migration must start from the current layout and end at the new
    /// logic's layout. Storage is only replaced if the migration succeeds.
    pub fn upgrade_to_and_migrate(
        &mut self,
        caller: Address,
        logic: Arc<dyn VaultLogic>,
        migration: &dyn StorageMigration,
    ) -> Result<()> {
        self.only_admin(caller)?;
        let current = self.storage.layout_version;
        if migration.from_layout() != current {
            return Err(ProtocolError::StorageLayoutMismatch { expected: current, found: migration.from_layout() });
        }
        if migration.to_layout() != logic.storage_layout() {
            return Err(ProtocolError::StorageLayoutMismatch {
                expected: migration.to_layout(),
                found: logic.storage_layout(),
            });
        }

        let mut migrated = self.storage.clone();
        migration.migrate(&mut migrated)?;
        migrated.layout_version = migration.to_layout();

        info!(
            "proxy {} upgraded: {} -> {} (layout {} -> {})",
            self.address,
            self.state.logic.version(),
            logic.version(),
            current,
            migrated.layout_version
        );
        self.storage = migrated;
        self.state.logic = logic;
        Ok(())
    }

    pub fn change_admin(&mut self, caller: Address, new_admin: Address) -> Result<()> {
        self.only_admin(caller)?;
        info!("proxy {} admin -> {}", self.address, new_admin);
        self.state.admin = new_admin;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Forwarding
    // ------------------------------------------------------------------------

    /// Forward one state-changing call to the current logic
    pub fn forward(&mut self, env: &mut Env<'_>, sender: Address, call: VaultCall) -> Result<CallOutcome> {
        debug!("proxy {}: {} from {}", self.address, call.name(), sender);
        let ctx = self.context(sender);
        let logic = Arc::clone(&self.state.logic);
        let storage = &mut self.storage;
        match call {
            VaultCall::Deposit { amount } => logic.deposit(storage, env, ctx, amount).map(CallOutcome::Deposit),
            VaultCall::Withdraw { shares } => logic.withdraw(storage, env, ctx, shares).map(CallOutcome::Withdraw),
            VaultCall::Rebalance => logic.rebalance(storage, env, ctx).map(CallOutcome::Rebalance),
            VaultCall::Harvest => logic.harvest(storage, env, ctx).map(CallOutcome::Harvest),
            VaultCall::Transfer { to, shares } => {
                logic.transfer(storage, ctx, to, shares).map(|_| CallOutcome::Transfer)
            }
            VaultCall::SetExitFee { fee_bps } => {
                logic.set_exit_fee(storage, ctx, fee_bps).map(|_| CallOutcome::SetExitFee)
            }
        }
    }

    pub fn deposit(&mut self, env: &mut Env<'_>, sender: Address, amount: u128) -> Result<DepositReceipt> {
        let ctx = self.context(sender);
        self.state.logic.deposit(&mut self.storage, env, ctx, amount)
    }

    pub fn withdraw(&mut self, env: &mut Env<'_>, sender: Address, shares: u128) -> Result<WithdrawReceipt> {
        let ctx = self.context(sender);
        self.state.logic.withdraw(&mut self.storage, env, ctx, shares)
    }

    pub fn rebalance(&mut self, env: &mut Env<'_>, sender: Address) -> Result<RebalanceOutcome> {
        let ctx = self.context(sender);
        self.state.logic.rebalance(&mut self.storage, env, ctx)
    }

    pub fn harvest(&mut self, env: &mut Env<'_>, sender: Address) -> Result<HarvestReceipt> {
        let ctx = self.context(sender);
        self.state.logic.harvest(&mut self.storage, env, ctx)
    }

    pub fn transfer(&mut self, sender: Address, to: Address, shares: u128) -> Result<()> {
        let ctx = self.context(sender);
        self.state.logic.transfer(&mut self.storage, ctx, to, shares)
    }

    pub fn set_exit_fee(&mut self, sender: Address, fee_bps: u16) -> Result<()> {
        let ctx = self.context(sender);
        self.state.logic.set_exit_fee(&mut self.storage, ctx, fee_bps)
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    pub fn name(&self) -> &str {
        self.state.logic.name(&self.storage)
    }

    pub fn symbol(&self) -> &str {
        self.state.logic.symbol(&self.storage)
    }

    pub fn decimals(&self) -> u8 {
        self.state.logic.decimals()
    }

    pub fn balance_of(&self, holder: Address) -> u128 {
        self.state.logic.balance_of(&self.storage, holder)
    }

    pub fn total_supply(&self) -> u128 {
        self.state.logic.total_supply(&self.storage)
    }

    pub fn leverage(&self, view: MarketView<'_>) -> Result<u128> {
        self.state.logic.leverage(&self.storage, view, self.address)
    }

    pub fn position_value(&self, view: MarketView<'_>) -> Result<u128> {
        self.state.logic.position_value(&self.storage, view, self.address)
    }

    pub fn share_price(&self, view: MarketView<'_>) -> Result<u128> {
        self.state.logic.share_price(&self.storage, view, self.address)
    }

    pub fn needs_rebalance(&self, view: MarketView<'_>) -> Result<bool> {
        self.state.logic.needs_rebalance(&self.storage, view, self.address)
    }

    pub fn snapshot(&self, view: MarketView<'_>) -> Result<PositionSnapshot> {
        self.state.logic.snapshot(&self.storage, view, self.address)
    }
}
