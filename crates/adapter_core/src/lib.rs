//! Adapter Core - collaborator interfaces for the leverage programs
//!
//! This crate defines the stable interface between the leverage programs and
//! the external venues they drive: the money market (supply, borrow, flash
//! loans), the exchange router and the incentives controller.
//!
//! # Design Principles
//! - Every mutating call takes the caller identity explicitly; venues enforce
//!   their own permissions (delegation, claimers) against it
//! - Value moves only through the shared `Ledger`, so callers can validate
//!   each hand-off against observed balances instead of returned amounts
//! - Flash loans invert control: the market calls back into a receiver that
//!   gets the market itself and the ledger for the duration of the loan

use dango_common::{
    amount_of, apply_bps, value_of, Address, Ledger, ProtocolError, Result, Rounding,
    BPS_DENOMINATOR,
};

// ============================================================================
// Money Market
// ============================================================================

/// Per-user reserve position at the money market
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReserveBalance {
    /// Supplied (collateral) amount, native units
    pub supplied: u128,
    /// Variable debt, native units
    pub borrowed: u128,
}

/// Terms of an in-flight flash loan, handed to the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashLoan {
    pub asset: Address,
    pub amount: u128,
    pub premium: u128,
    /// Account that requested the loan
    pub initiator: Address,
}

impl FlashLoan {
    /// Amount the receiver must hold when the callback returns
    pub fn amount_owed(&self) -> Result<u128> {
        self.amount.checked_add(self.premium).ok_or(ProtocolError::MathOverflow)
    }
}

/// Lending pool surface used by the programs
pub trait MoneyMarket {
    fn address(&self) -> Address;
    fn addresses_provider(&self) -> Address;
    fn data_provider(&self) -> Address;

    /// Flash loan premium in basis points
    fn flash_premium_bps(&self) -> u16;

    /// Oracle price of one whole token, WAD-scaled
    fn asset_price(&self, asset: Address) -> Result<u128>;

    fn position_of(&self, user: Address, asset: Address) -> ReserveBalance;

    /// Let `delegatee` borrow against and withdraw from `delegator`'s position
    fn approve_delegation(&mut self, delegator: Address, delegatee: Address, approved: bool);

    fn supply(
        &mut self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: u128,
        on_behalf_of: Address,
    ) -> Result<()>;

    /// Withdraw `owner`'s supplied `asset` to `to`; returns the amount withdrawn
    fn withdraw(
        &mut self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: u128,
        owner: Address,
        to: Address,
    ) -> Result<u128>;

    /// Borrow against `on_behalf_of`'s position; funds go to `caller`
    fn borrow(
        &mut self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: u128,
        on_behalf_of: Address,
    ) -> Result<()>;

    /// Repay up to `amount` of `on_behalf_of`'s debt; returns the amount repaid
    fn repay(
        &mut self,
        ledger: &mut Ledger,
        caller: Address,
        asset: Address,
        amount: u128,
        on_behalf_of: Address,
    ) -> Result<u128>;

    /// Lend `amount` to `receiver` for the duration of its callback
    fn flash_loan(
        &mut self,
        ledger: &mut Ledger,
        caller: Address,
        receiver: &mut dyn FlashLoanReceiver,
        asset: Address,
        amount: u128,
    ) -> Result<()>;
}

/// Flash loan callback target
pub trait FlashLoanReceiver {
    fn address(&self) -> Address;

    /// Called by the market after the loan is transferred; on return the
    /// receiver must hold `loan.amount_owed()`
    fn execute_operation(
        &mut self,
        market: &mut dyn MoneyMarket,
        ledger: &mut Ledger,
        loan: &FlashLoan,
    ) -> Result<()>;
}

// ============================================================================
// Exchange Router
// ============================================================================

/// UniswapV2-style router over registered pools
pub trait SwapRouter {
    fn address(&self) -> Address;

    /// Amounts at each hop for an exact input
    fn get_amounts_out(&self, amount_in: u128, path: &[Address]) -> Result<Vec<u128>>;

    /// Amounts at each hop for an exact output
    fn get_amounts_in(&self, amount_out: u128, path: &[Address]) -> Result<Vec<u128>>;

    /// Swap `amount_in` of `path[0]` from `caller` into `path[last]` for `to`
    fn swap_exact_tokens_for_tokens(
        &mut self,
        ledger: &mut Ledger,
        caller: Address,
        amount_in: u128,
        min_amount_out: u128,
        path: &[Address],
        to: Address,
    ) -> Result<Vec<u128>>;
}

// ============================================================================
// Incentives
// ============================================================================

/// Liquidity-mining rewards accrued on money market positions
pub trait IncentivesController {
    fn address(&self) -> Address;
    fn reward_token(&self) -> Address;
    fn rewards_balance(&self, user: Address) -> u128;

    /// Claim everything `user` has accrued to `to`; `caller` must be the user
    /// or its registered claimer
    fn claim_rewards(
        &mut self,
        ledger: &mut Ledger,
        caller: Address,
        user: Address,
        to: Address,
    ) -> Result<u128>;
}

// ============================================================================
// Venue Bundle
// ============================================================================

/// The venues one call may touch, borrowed for the duration of that call
pub struct Venues<'a> {
    pub ledger: &'a mut Ledger,
    pub market: &'a mut dyn MoneyMarket,
    pub router: &'a mut dyn SwapRouter,
}

impl<'a> Venues<'a> {
    pub fn new(
        ledger: &'a mut Ledger,
        market: &'a mut dyn MoneyMarket,
        router: &'a mut dyn SwapRouter,
    ) -> Self {
        Self { ledger, market, router }
    }
}

// ============================================================================
// Risk Guards
// ============================================================================

/// Slippage tolerance applied to every swap the programs make
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlippageGuard {
    /// Maximum shortfall against the oracle quote, basis points
    pub max_slippage_bps: u16,
}

impl SlippageGuard {
    /// Guard with the given tolerance; above 100% is rejected
    pub fn new(max_slippage_bps: u16) -> Result<Self> {
        if max_slippage_bps as u128 > BPS_DENOMINATOR {
            return Err(ProtocolError::InvalidBounds);
        }
        Ok(Self { max_slippage_bps })
    }

    /// Default guard used by the deployed adapters (3%)
    pub const fn standard() -> Self {
        Self { max_slippage_bps: 300 }
    }

    /// Smallest acceptable output for an `expected` quote (rounded down)
    pub fn min_amount_out(&self, expected: u128) -> Result<u128> {
        let haircut = apply_bps(expected, self.max_slippage_bps, Rounding::Up)?;
        Ok(expected - haircut.min(expected))
    }

    /// True if `received` is within tolerance of `expected`
    pub fn accepts(&self, received: u128, expected: u128) -> Result<bool> {
        Ok(received >= self.min_amount_out(expected)?)
    }
}

/// Oracle-implied output of swapping `amount_in` of `token_in` into `token_out`
pub fn oracle_quote(
    market: &dyn MoneyMarket,
    ledger: &Ledger,
    token_in: Address,
    token_out: Address,
    amount_in: u128,
) -> Result<u128> {
    let value = value_of(
        amount_in,
        market.asset_price(token_in)?,
        ledger.decimals(token_in)?,
        Rounding::Down,
    )?;
    amount_of(
        value,
        market.asset_price(token_out)?,
        ledger.decimals(token_out)?,
        Rounding::Down,
    )
}
