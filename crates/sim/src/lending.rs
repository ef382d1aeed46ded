//! Lending pool
//!
//! Supply, borrow, credit delegation and flash loans over listed reserves,
//! priced by a settable oracle. No interest accrues; the flash premium stays
//! in the pool.

use adapter_core::{FlashLoan, FlashLoanReceiver, MoneyMarket, ReserveBalance};
use dango_common::{
    apply_bps, mul_div, value_of, Address, Ledger, ProtocolError, Result, Rounding, BPS_DENOMINATOR, WAD,
};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Flash loan premium charged by the deployed pool (0.09%)
pub const FLASH_PREMIUM_BPS: u16 = 9;

/// Liquidation threshold used when a listing does not name one (75%)
pub const DEFAULT_LIQUIDATION_THRESHOLD_BPS: u16 = 7_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LendingPoolConfig {
    pub address: Address,
    pub addresses_provider: Address,
    pub data_provider: Address,
    pub flash_premium_bps: u16,
}

/// A listed asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reserve {
    /// Oracle price of one whole token, WAD
    pub price: u128,
    pub liquidation_threshold_bps: u16,
    pub total_supplied: u128,
    pub total_borrowed: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LendingPool {
    config: LendingPoolConfig,
    reserves: BTreeMap<Address, Reserve>,
    positions: BTreeMap<(Address, Address), ReserveBalance>,
    /// (delegator, delegatee)
    delegations: BTreeSet<(Address, Address)>,
}

impl LendingPool {
    pub fn new(config: LendingPoolConfig) -> Self {
        Self { config, reserves: BTreeMap::new(), positions: BTreeMap::new(), delegations: BTreeSet::new() }
    }

    pub fn config(&self) -> &LendingPoolConfig {
        &self.config
    }

    pub fn list_reserve(&mut self, asset: Address, price: u128, liquidation_threshold_bps: u16) -> Result<()> {
        if self.reserves.contains_key(&asset) {
            return Err(ProtocolError::UnknownToken(asset));
        }
        if liquidation_threshold_bps as u128 > BPS_DENOMINATOR || price == 0 {
            return Err(ProtocolError::InvalidBounds);
        }
        self.reserves.insert(
            asset,
            Reserve { price, liquidation_threshold_bps, total_supplied: 0, total_borrowed: 0 },
        );
        Ok(())
    }

    pub fn reserve(&self, asset: Address) -> Result<&Reserve> {
        self.reserves.get(&asset).ok_or(ProtocolError::UnknownToken(asset))
    }

    pub fn set_price(&mut self, asset: Address, price: u128) -> Result<()> {
        if price == 0 {
            return Err(ProtocolError::PriceUnavailable(asset));
        }
        let reserve = self.reserves.get_mut(&asset).ok_or(ProtocolError::UnknownToken(asset))?;
        debug!("oracle {}: {} -> {}", asset, reserve.price, price);
        reserve.price = price;
        Ok(())
    }

    pub fn is_delegated(&self, delegator: Address, delegatee: Address) -> bool {
        self.delegations.contains(&(delegator, delegatee))
    }

    /// Liquidation-weighted collateral over debt, WAD; `u128::MAX` without debt
    pub fn health_factor(&self, ledger: &Ledger, user: Address) -> Result<u128> {
        let mut weighted_collateral = 0u128;
        let mut debt = 0u128;
        for (&(holder, asset), balance) in self.positions.range((user, Address::ZERO)..) {
            if holder != user {
                break;
            }
            let reserve = self.reserve(asset)?;
            let decimals = ledger.decimals(asset)?;
            let supplied = value_of(balance.supplied, reserve.price, decimals, Rounding::Down)?;
            let weighted = apply_bps(supplied, reserve.liquidation_threshold_bps, Rounding::Down)?;
            weighted_collateral = weighted_collateral.checked_add(weighted).ok_or(ProtocolError::MathOverflow)?;
            let borrowed = value_of(balance.borrowed, reserve.price, decimals, Rounding::Up)?;
            debt = debt.checked_add(borrowed).ok_or(ProtocolError::MathOverflow)?;
        }
        if debt == 0 {
            return Ok(u128::MAX);
        }
        mul_div(weighted_collateral, WAD, debt, Rounding::Down)
    }

    fn check_health(&self, ledger: &Ledger, user: Address) -> Result<()> {
        let health = self.health_factor(ledger, user)?;
        if health < WAD {
            warn!("lending pool: {} health factor {} below 1", user, health);
            return Err(ProtocolError::HealthFactorTooLow);
        }
        Ok(())
    }

    fn may_act(&self, owner: Address, caller: Address) -> Result<()> {
        if owner == caller || self.is_delegated(owner, caller) {
            Ok(())
        } else {
            Err(ProtocolError::Unauthorized)
        }
    }

    fn liquidity(&self, ledger: &Ledger, asset: Address) -> u128 {
        ledger.balance_of(asset, self.config.address)
    }

    fn slot(&mut self, user: Address, asset: Address) -> &mut ReserveBalance {
        self.positions.entry((user, asset)).or_default()
    }

    fn reserve_mut(&mut self, asset: Address) -> Result<&mut Reserve> {
        self.reserves.get_mut(&asset).ok_or(ProtocolError::UnknownToken(asset))
    }
}

impl MoneyMarket for LendingPool {
    fn address(&self) -> Address {
        self.config.address
    }

    fn addresses_provider(&self) -> Address {
        self.config.addresses_provider
    }

    fn data_provider(&self) -> Address {
        self.config.data_provider
    }

    fn flash_premium_bps(&self) -> u16 {
        self.config.flash_premium_bps
    }

    fn asset_price(&self, asset: Address) -> Result<u128> {
        self.reserves.get(&asset).map(|r| r.price).ok_or(ProtocolError::PriceUnavailable(asset))
    }

    fn position_of(&self, user: Address, asset: Address) -> ReserveBalance {
        self.positions.get(&(user, asset)).copied().unwrap_or_default()
    }

    fn approve_delegation(&mut self, delegator: Address, delegatee: Address, approved: bool) {
        if approved {
            self.delegations.insert((delegator, delegatee));
        } else {
            self.delegations.remove(&(delegator, delegatee));
        }
    }

    fn supply(
        &mut self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: u128,
        on_behalf_of: Address,
    ) -> Result<()> {
        if amount == 0 {
            return Err(ProtocolError::ZeroAmount);
        }
        self.reserve(asset)?;
        ledger.transfer(asset, caller, self.config.address, amount)?;
        let reserve = self.reserve_mut(asset)?;
        reserve.total_supplied = reserve.total_supplied.checked_add(amount).ok_or(ProtocolError::MathOverflow)?;
        let slot = self.slot(on_behalf_of, asset);
        slot.supplied = slot.supplied.checked_add(amount).ok_or(ProtocolError::MathOverflow)?;
        Ok(())
    }

    fn withdraw(
        &mut self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: u128,
        owner: Address,
        to: Address,
    ) -> Result<u128> {
        if amount == 0 {
            return Err(ProtocolError::ZeroAmount);
        }
        self.reserve(asset)?;
        self.may_act(owner, caller)?;
        let supplied = self.position_of(owner, asset).supplied;
        let remaining = supplied.checked_sub(amount).ok_or(ProtocolError::InsufficientBalance)?;
        if self.liquidity(ledger, asset) < amount {
            return Err(ProtocolError::InsufficientLiquidity);
        }

        self.slot(owner, asset).supplied = remaining;
        if let Err(e) = self.check_health(ledger, owner) {
            self.slot(owner, asset).supplied = supplied;
            return Err(e);
        }
        let reserve = self.reserve_mut(asset)?;
        reserve.total_supplied = reserve.total_supplied.saturating_sub(amount);
        ledger.transfer(asset, self.config.address, to, amount)?;
        Ok(amount)
    }

    fn borrow(
        &mut self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: u128,
        on_behalf_of: Address,
    ) -> Result<()> {
        if amount == 0 {
            return Err(ProtocolError::ZeroAmount);
        }
        self.reserve(asset)?;
        self.may_act(on_behalf_of, caller)?;
        if self.liquidity(ledger, asset) < amount {
            return Err(ProtocolError::InsufficientLiquidity);
        }

        let borrowed = self.position_of(on_behalf_of, asset).borrowed;
        self.slot(on_behalf_of, asset).borrowed = borrowed.checked_add(amount).ok_or(ProtocolError::MathOverflow)?;
        if let Err(e) = self.check_health(ledger, on_behalf_of) {
            self.slot(on_behalf_of, asset).borrowed = borrowed;
            return Err(e);
        }
        let reserve = self.reserve_mut(asset)?;
        reserve.total_borrowed = reserve.total_borrowed.checked_add(amount).ok_or(ProtocolError::MathOverflow)?;
        ledger.transfer(asset, self.config.address, caller, amount)
    }

    fn repay(
        &mut self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: u128,
        on_behalf_of: Address,
    ) -> Result<u128> {
        self.reserve(asset)?;
        let owed = self.position_of(on_behalf_of, asset).borrowed;
        let paid = amount.min(owed);
        if paid == 0 {
            return Ok(0);
        }
        ledger.transfer(asset, caller, self.config.address, paid)?;
        self.slot(on_behalf_of, asset).borrowed = owed - paid;
        let reserve = self.reserve_mut(asset)?;
        reserve.total_borrowed = reserve.total_borrowed.saturating_sub(paid);
        Ok(paid)
    }

    fn flash_loan(
        &mut self,
        ledger: &mut Ledger,
        caller: Address,
        receiver: &mut dyn FlashLoanReceiver,
        asset: Address,
        amount: u128,
    ) -> Result<()> {
        if amount == 0 {
            return Err(ProtocolError::ZeroAmount);
        }
        self.reserve(asset)?;
        if self.liquidity(ledger, asset) < amount {
            return Err(ProtocolError::InsufficientLiquidity);
        }

        let premium = apply_bps(amount, self.config.flash_premium_bps, Rounding::Down)?;
        let loan = FlashLoan { asset, amount, premium, initiator: caller };
        let pool = self.config.address;
        ledger.transfer(asset, pool, receiver.address(), amount)?;
        debug!("flash loan {} of {} to {} (premium {})", amount, asset, receiver.address(), premium);

        receiver.execute_operation(self, ledger, &loan)?;

        let owed = loan.amount_owed()?;
        ledger.transfer(asset, receiver.address(), pool, owed).map_err(|_| {
            warn!("flash loan of {} {} not repaid by {}", amount, asset, receiver.address());
            ProtocolError::FlashLoanNotRepaid
        })
    }
}
