//! Leverage vault logic
//!
//! Holds one collateral/debt position at the money market on behalf of all
//! share holders and keeps its leverage inside the band chosen at
//! initialization. Leverage changes are funded by the flashloan adapter:
//! lever up borrows the debt asset and buys collateral, lever down borrows
//! collateral and buys back debt.

use crate::config::{InitParams, VaultConfig};
use crate::logic::{
    DepositReceipt, Env, HarvestReceipt, MarketView, PositionSnapshot, RebalanceOutcome, VaultLogic,
    WithdrawReceipt,
};
use crate::storage::{VaultStorage, STORAGE_LAYOUT};
use dango_common::{
    amount_of, checked_add, to_wad_units, value_of, Address, CallContext, ProtocolError, Result, Rounding,
    WAD_DECIMALS,
};
use dango_flashloan::{Direction, FlashloanReport, FlashloanRequest};
use log::{debug, info, warn};
use model_safety::shares::{share_price, split_exit_fee};
use model_safety::leverage::{leverage_after_lever_down, leverage_after_lever_up};
use model_safety::{leverage_ratio, plan_rebalance, shares_for_deposit, withdraw_claim, Band, RebalancePlan, Valuation};

/// Version string of this logic
pub const LOGIC_VERSION: &str = "1.0.0";

/// Highest exit fee the fee recipient may set (1%)
pub const MAX_EXIT_FEE_BPS: u16 = 100;

#[derive(Debug, Clone)]
pub struct LeverageVault {
    config: VaultConfig,
    version: String,
    storage_layout: u16,
}

impl LeverageVault {
    pub fn new(config: VaultConfig) -> Self {
        Self::with_version(config, LOGIC_VERSION)
    }

    pub fn with_version(config: VaultConfig, version: &str) -> Self {
        Self { config, version: version.to_string(), storage_layout: STORAGE_LAYOUT }
    }

    /// Same behavior, declared against a different storage layout
    pub fn with_storage_layout(mut self, layout: u16) -> Self {
        self.storage_layout = layout;
        self
    }

    /// Operative band: stored bounds around the logic's target
    fn band(&self, storage: &VaultStorage) -> Result<Band> {
        Ok(Band::new(storage.lower_bound, self.config.target_lever_ratio, storage.upper_bound)?)
    }

    fn only_initialized(&self, storage: &VaultStorage) -> Result<()> {
        if !storage.initialized {
            return Err(ProtocolError::NotInitialized);
        }
        Ok(())
    }

    /// The env must carry the adapter this vault was initialized with and
    /// the market named in the config
    fn check_collaborators(&self, storage: &VaultStorage, env: &Env<'_>) -> Result<()> {
        if env.adapter.address() != storage.adapter {
            return Err(ProtocolError::CollaboratorMismatch);
        }
        self.check_market(env)
    }

    fn check_market(&self, env: &Env<'_>) -> Result<()> {
        let market = &*env.venues.market;
        if market.addresses_provider() != self.config.addresses_provider
            || market.data_provider() != self.config.data_provider
        {
            return Err(ProtocolError::CollaboratorMismatch);
        }
        Ok(())
    }

    /// Value the live position at current oracle prices
    fn measure(&self, total_shares: u128, view: MarketView<'_>, this: Address) -> Result<PositionSnapshot> {
        let collateral = self.config.collateral_token;
        let debt = self.config.debt_token;
        let collateral_amount = view.market.position_of(this, collateral).supplied;
        let debt_amount = view.market.position_of(this, debt).borrowed;

        let collateral_price = view.market.asset_price(collateral)?;
        let collateral_value = value_of(
            collateral_amount,
            collateral_price,
            view.ledger.decimals(collateral)?,
            Rounding::Down,
        )?;
        let debt_value = value_of(
            debt_amount,
            view.market.asset_price(debt)?,
            view.ledger.decimals(debt)?,
            Rounding::Up,
        )?;

        let valuation = Valuation::new(collateral_value, debt_value);
        let leverage = leverage_ratio(valuation)?;
        let equity_value = amount_of(valuation.equity()?, collateral_price, WAD_DECIMALS, Rounding::Down)?;

        Ok(PositionSnapshot {
            collateral_amount,
            debt_amount,
            total_shares,
            collateral_value,
            debt_value,
            equity_value,
            leverage,
        })
    }

    fn measure_env(&self, storage: &VaultStorage, env: &Env<'_>, this: Address) -> Result<PositionSnapshot> {
        let view = MarketView::new(&*env.venues.ledger, &*env.venues.market);
        self.measure(storage.position.total_shares, view, this)
    }

    /// Put idle balances to work and refresh the cached position
    ///
    /// Idle debt tokens repay outstanding debt; idle collateral is supplied.
    fn sync(&self, storage: &mut VaultStorage, env: &mut Env<'_>, this: Address) -> Result<()> {
        let collateral = self.config.collateral_token;
        let debt = self.config.debt_token;
        let venues = &mut env.venues;

        let idle_debt = venues.ledger.balance_of(debt, this);
        let outstanding = venues.market.position_of(this, debt).borrowed;
        let to_repay = idle_debt.min(outstanding);
        if to_repay > 0 {
            venues.market.repay(venues.ledger, this, debt, to_repay, this)?;
        }

        let idle_collateral = venues.ledger.balance_of(collateral, this);
        if idle_collateral > 0 {
            venues.market.supply(venues.ledger, this, collateral, idle_collateral, this)?;
        }

        storage.position.collateral_amount = venues.market.position_of(this, collateral).supplied;
        storage.position.debt_amount = venues.market.position_of(this, debt).borrowed;
        Ok(())
    }

    /// Restore the target if the position left the band
    ///
    /// Returns `(before, after, report)` when a cycle ran, `None` when the
    /// position was already inside the band.
    fn rebalance_position(
        &self,
        storage: &mut VaultStorage,
        env: &mut Env<'_>,
        this: Address,
    ) -> Result<Option<(u128, u128, FlashloanReport)>> {
        let band = self.band(storage)?;
        let snapshot = self.measure_env(storage, env, this)?;
        let valuation = Valuation::new(snapshot.collateral_value, snapshot.debt_value);
        let out_of_bounds = |leverage| ProtocolError::LeverageOutOfBounds {
            leverage,
            lower: band.lower,
            upper: band.upper,
        };

        let collateral = self.config.collateral_token;
        let debt = self.config.debt_token;
        let plan = plan_rebalance(valuation, &band)?;
        let planned = match plan {
            RebalancePlan::Hold => return Ok(None),
            RebalancePlan::LeverUp { debt_value } => leverage_after_lever_up(valuation, debt_value)?,
            RebalancePlan::LeverDown { collateral_value } => leverage_after_lever_down(valuation, collateral_value)?,
        };
        // Zero-cost outcome of the plan must already sit inside the band
        if !band.contains(planned) {
            warn!("vault {}: plan {:?} lands at leverage {}", this, plan, planned);
            return Err(out_of_bounds(planned));
        }

        let request = match plan {
            RebalancePlan::Hold => return Ok(None),
            RebalancePlan::LeverUp { debt_value } => FlashloanRequest {
                vault: this,
                borrow_token: debt,
                target_token: collateral,
                borrow_amount: amount_of(
                    debt_value,
                    env.venues.market.asset_price(debt)?,
                    env.venues.ledger.decimals(debt)?,
                    Rounding::Down,
                )?,
                direction: Direction::LeverUp,
            },
            RebalancePlan::LeverDown { collateral_value } => FlashloanRequest {
                vault: this,
                borrow_token: collateral,
                target_token: debt,
                borrow_amount: amount_of(
                    collateral_value,
                    env.venues.market.asset_price(collateral)?,
                    env.venues.ledger.decimals(collateral)?,
                    Rounding::Up,
                )?,
                direction: Direction::LeverDown,
            },
        };
        debug!(
            "vault {}: leverage {} outside [{}, {}], {:?} borrowing {} (planned {})",
            this, snapshot.leverage, band.lower, band.upper, request.direction, request.borrow_amount, planned
        );
        if request.borrow_amount == 0 {
            return Err(out_of_bounds(snapshot.leverage));
        }

        let report = env.adapter.execute_flashloan(&mut env.venues, this, request)?;
        self.sync(storage, env, this)?;

        let after = self.measure_env(storage, env, this)?.leverage;
        if !band.contains(after) {
            warn!("vault {}: rebalance left leverage at {}", this, after);
            return Err(out_of_bounds(after));
        }
        info!("vault {} rebalanced {:?}: leverage {} -> {}", this, report.direction, snapshot.leverage, after);
        Ok(Some((snapshot.leverage, after, report)))
    }

    /// Pay out everything left once the last shares are burned
    fn sweep(&self, env: &mut Env<'_>, this: Address, to: Address) -> Result<u128> {
        let collateral = self.config.collateral_token;
        let debt = self.config.debt_token;
        let venues = &mut env.venues;

        let idle_debt = venues.ledger.balance_of(debt, this);
        let outstanding = venues.market.position_of(this, debt).borrowed;
        if idle_debt.min(outstanding) > 0 {
            venues.market.repay(venues.ledger, this, debt, idle_debt.min(outstanding), this)?;
        }
        if venues.market.position_of(this, debt).borrowed > 0 {
            return Err(ProtocolError::WithdrawBreaksInvariant);
        }

        let supplied = venues.market.position_of(this, collateral).supplied;
        let mut paid = 0;
        if supplied > 0 {
            paid = venues.market.withdraw(venues.ledger, this, collateral, supplied, this, to)?;
        }
        let idle_collateral = venues.ledger.balance_of(collateral, this);
        venues.ledger.transfer(collateral, this, to, idle_collateral)?;
        let idle_debt = venues.ledger.balance_of(debt, this);
        venues.ledger.transfer(debt, this, to, idle_debt)?;
        debug!("vault {}: swept {} collateral and {} debt dust to {}", this, paid + idle_collateral, idle_debt, to);
        checked_add(paid, idle_collateral)
    }
}

impl VaultLogic for LeverageVault {
    fn version(&self) -> &str {
        &self.version
    }

    fn storage_layout(&self) -> u16 {
        self.storage_layout
    }

    fn config(&self) -> &VaultConfig {
        &self.config
    }

    fn initialize(
        &self,
        storage: &mut VaultStorage,
        env: &mut Env<'_>,
        ctx: CallContext,
        params: InitParams,
    ) -> Result<()> {
        if storage.initialized {
            return Err(ProtocolError::AlreadyInitialized);
        }
        let band = Band::new(params.lower_bound, self.config.target_lever_ratio, params.upper_bound)?;
        if !band.is_within(&self.config.envelope()?) {
            warn!(
                "vault {}: band [{}, {}] outside envelope [{}, {}]",
                ctx.this, band.lower, band.upper, self.config.lower_lever_ratio, self.config.upper_lever_ratio
            );
            return Err(ProtocolError::InvalidBounds);
        }
        if params.flashloan_adapter != env.adapter.address() {
            return Err(ProtocolError::CollaboratorMismatch);
        }
        self.check_market(env)?;

        env.venues.market.approve_delegation(ctx.this, params.flashloan_adapter, true);

        storage.name = params.name;
        storage.symbol = params.symbol;
        storage.adapter = params.flashloan_adapter;
        storage.fee_recipient = params.fee_recipient;
        storage.lower_bound = band.lower;
        storage.upper_bound = band.upper;
        storage.capacity = params.capacity;
        storage.initialized = true;
        info!(
            "vault {} ({}) initialized: band [{}, {}], capacity {}",
            ctx.this, storage.symbol, band.lower, band.upper, storage.capacity
        );
        Ok(())
    }

    fn deposit(
        &self,
        storage: &mut VaultStorage,
        env: &mut Env<'_>,
        ctx: CallContext,
        amount: u128,
    ) -> Result<DepositReceipt> {
        self.only_initialized(storage)?;
        if amount == 0 {
            return Err(ProtocolError::ZeroAmount);
        }
        self.check_collaborators(storage, env)?;
        let this = ctx.this;
        let collateral = self.config.collateral_token;
        self.sync(storage, env, this)?;

        let value_before = self.measure_env(storage, env, this)?.equity_value;
        let amount_wad = to_wad_units(amount, env.venues.ledger.decimals(collateral)?, Rounding::Down)?;
        if checked_add(value_before, amount_wad)? > storage.capacity {
            warn!(
                "vault {}: deposit of {} exceeds capacity ({} + {} > {})",
                this, amount, value_before, amount_wad, storage.capacity
            );
            return Err(ProtocolError::CapacityExceeded);
        }
        let shares = shares_for_deposit(amount_wad, storage.position.total_shares, value_before)?;
        debug!("vault {}: deposit {} ({} wad) against value {} -> {} shares", this, amount, amount_wad, value_before, shares);

        env.venues.ledger.transfer(collateral, ctx.sender, this, amount)?;
        env.venues.market.supply(env.venues.ledger, this, collateral, amount, this)?;
        storage.mint(ctx.sender, shares)?;
        self.sync(storage, env, this)?;

        let rebalance = self.rebalance_position(storage, env, this)?.map(|(_, _, report)| report);
        let leverage = self.measure_env(storage, env, this)?.leverage;
        info!("vault {}: {} deposited {}, minted {} shares, leverage {}", this, ctx.sender, amount, shares, leverage);
        Ok(DepositReceipt { shares_minted: shares, leverage, rebalance })
    }

    fn withdraw(
        &self,
        storage: &mut VaultStorage,
        env: &mut Env<'_>,
        ctx: CallContext,
        shares: u128,
    ) -> Result<WithdrawReceipt> {
        self.only_initialized(storage)?;
        if shares == 0 {
            return Err(ProtocolError::ZeroAmount);
        }
        if storage.balance_of(ctx.sender) < shares {
            return Err(ProtocolError::InsufficientShares);
        }
        self.check_collaborators(storage, env)?;
        let this = ctx.this;
        let collateral = self.config.collateral_token;
        let debt = self.config.debt_token;
        self.sync(storage, env, this)?;

        let (burned, fee_shares) = if ctx.sender == storage.fee_recipient {
            (shares, 0)
        } else {
            split_exit_fee(shares, storage.exit_fee_bps)?
        };
        let position = storage.position;
        let claim = withdraw_claim(position.collateral_amount, position.debt_amount, position.total_shares, burned)?;

        let mut cost = 0;
        let mut debt_repaid = 0;
        if claim.debt > 0 {
            let path = env.adapter.trade_path(collateral, debt)?.tokens().to_vec();
            let amounts = env.venues.router.get_amounts_in(claim.debt, &path)?;
            let borrow_amount = amounts.first().copied().ok_or(ProtocolError::InvalidPath)?;
            let report = env.adapter.execute_flashloan(
                &mut env.venues,
                this,
                FlashloanRequest {
                    vault: this,
                    borrow_token: collateral,
                    target_token: debt,
                    borrow_amount,
                    direction: Direction::LeverDown,
                },
            )?;
            cost = checked_add(report.borrowed, report.premium)?;
            debt_repaid = report.debt_repaid;
        }
        let released = claim.collateral.checked_sub(cost).ok_or_else(|| {
            warn!("vault {}: unwinding {} shares costs {} of a {} claim", this, burned, cost, claim.collateral);
            ProtocolError::WithdrawBreaksInvariant
        })?;
        debug!(
            "vault {}: claim {} collateral / {} debt, unwind cost {}, releasing {}",
            this, claim.collateral, claim.debt, cost, released
        );

        storage.burn(ctx.sender, burned)?;
        if fee_shares > 0 {
            storage.transfer_shares(ctx.sender, storage.fee_recipient, fee_shares)?;
        }

        let collateral_out = if storage.position.total_shares == 0 {
            self.sweep(env, this, ctx.sender)?
        } else if released > 0 {
            env.venues.market.withdraw(env.venues.ledger, this, collateral, released, this, ctx.sender)?
        } else {
            0
        };
        self.sync(storage, env, this)?;

        if storage.position.total_shares > 0 {
            self.rebalance_position(storage, env, this).map_err(|e| {
                warn!("vault {}: withdrawal leaves position unbalanced: {}", this, e);
                ProtocolError::WithdrawBreaksInvariant
            })?;
        }
        let leverage = self.measure_env(storage, env, this)?.leverage;
        info!(
            "vault {}: {} withdrew {} shares ({} fee) for {} collateral, leverage {}",
            this, ctx.sender, shares, fee_shares, collateral_out, leverage
        );
        Ok(WithdrawReceipt { shares_burned: burned, fee_shares, collateral_out, debt_repaid, leverage })
    }

    fn rebalance(&self, storage: &mut VaultStorage, env: &mut Env<'_>, ctx: CallContext) -> Result<RebalanceOutcome> {
        self.only_initialized(storage)?;
        self.check_collaborators(storage, env)?;
        self.sync(storage, env, ctx.this)?;
        match self.rebalance_position(storage, env, ctx.this)? {
            Some((before, after, report)) => Ok(RebalanceOutcome::Rebalanced { before, after, report }),
            None => {
                let leverage = self.measure_env(storage, env, ctx.this)?.leverage;
                debug!("vault {}: leverage {} within band, nothing to do", ctx.this, leverage);
                Ok(RebalanceOutcome::Skipped { leverage })
            }
        }
    }

    fn harvest(&self, storage: &mut VaultStorage, env: &mut Env<'_>, ctx: CallContext) -> Result<HarvestReceipt> {
        self.only_initialized(storage)?;
        if env.adapter.rewards().is_none() {
            return Err(ProtocolError::RewardsNotConfigured);
        }
        self.check_collaborators(storage, env)?;
        let this = ctx.this;

        let incentives = env.incentives.as_deref_mut().ok_or(ProtocolError::CollaboratorMismatch)?;
        let report =
            env.adapter
                .harvest_rewards(&mut env.venues, incentives, this, this, self.config.collateral_token)?;
        self.sync(storage, env, this)?;
        self.rebalance_position(storage, env, this)?;

        let leverage = self.measure_env(storage, env, this)?.leverage;
        info!("vault {}: harvested {} rewards into {} collateral", this, report.claimed, report.supplied);
        Ok(HarvestReceipt { claimed: report.claimed, supplied: report.supplied, leverage })
    }

    fn transfer(&self, storage: &mut VaultStorage, ctx: CallContext, to: Address, shares: u128) -> Result<()> {
        self.only_initialized(storage)?;
        storage.transfer_shares(ctx.sender, to, shares)?;
        debug!("vault {}: {} shares {} -> {}", ctx.this, shares, ctx.sender, to);
        Ok(())
    }

    fn set_exit_fee(&self, storage: &mut VaultStorage, ctx: CallContext, fee_bps: u16) -> Result<()> {
        self.only_initialized(storage)?;
        if ctx.sender != storage.fee_recipient {
            warn!("vault {}: exit fee change from {}", ctx.this, ctx.sender);
            return Err(ProtocolError::Unauthorized);
        }
        if fee_bps > MAX_EXIT_FEE_BPS {
            return Err(ProtocolError::InvalidBounds);
        }
        storage.exit_fee_bps = fee_bps;
        info!("vault {}: exit fee set to {} bps", ctx.this, fee_bps);
        Ok(())
    }

    fn leverage(&self, storage: &VaultStorage, view: MarketView<'_>, this: Address) -> Result<u128> {
        Ok(self.measure(storage.position.total_shares, view, this)?.leverage)
    }

    fn position_value(&self, storage: &VaultStorage, view: MarketView<'_>, this: Address) -> Result<u128> {
        Ok(self.measure(storage.position.total_shares, view, this)?.equity_value)
    }

    fn share_price(&self, storage: &VaultStorage, view: MarketView<'_>, this: Address) -> Result<u128> {
        let value = self.position_value(storage, view, this)?;
        Ok(share_price(value, storage.position.total_shares)?)
    }

    fn needs_rebalance(&self, storage: &VaultStorage, view: MarketView<'_>, this: Address) -> Result<bool> {
        if !storage.initialized {
            return Ok(false);
        }
        let band = self.band(storage)?;
        let snapshot = self.measure(storage.position.total_shares, view, this)?;
        let valuation = Valuation::new(snapshot.collateral_value, snapshot.debt_value);
        Ok(plan_rebalance(valuation, &band)? != RebalancePlan::Hold)
    }

    fn snapshot(&self, storage: &VaultStorage, view: MarketView<'_>, this: Address) -> Result<PositionSnapshot> {
        self.measure(storage.position.total_shares, view, this)
    }
}
