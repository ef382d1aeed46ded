//! One borrow -> swap -> repay cycle
//!
//! `FlashCycle` is the receiver the money market calls back into. It lives on
//! the adapter's stack for exactly one loan, so the loan context never
//! outlives the call that created it.

use crate::registry::TradePathRegistry;
use adapter_core::{oracle_quote, FlashLoan, FlashLoanReceiver, MoneyMarket, SlippageGuard, SwapRouter};
use dango_common::{Address, Ledger, ProtocolError, Result};
use log::debug;
use serde::Serialize;

/// Which way a cycle moves the vault's leverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Borrow the debt asset, swap to collateral, supply
    LeverUp,
    /// Borrow the collateral asset, swap to debt, repay
    LeverDown,
}

/// Arguments of `execute_flashloan`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashloanRequest {
    pub vault: Address,
    pub borrow_token: Address,
    /// Token the swap delivers to the vault
    pub target_token: Address,
    pub borrow_amount: u128,
    pub direction: Direction,
}

/// Loan terms as seen inside the callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashloanContext {
    pub initiating_vault: Address,
    pub borrowed_token: Address,
    pub borrowed_amount: u128,
    pub premium_owed: u128,
}

/// Observed outcome of a settled cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlashloanReport {
    pub direction: Direction,
    pub borrowed: u128,
    pub premium: u128,
    /// Target token received from the swap
    pub swapped_out: u128,
    /// Debt repaid on the vault's behalf (lever down only)
    pub debt_repaid: u128,
    /// Target token left idle on the vault (lever down only)
    pub leftover: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Awaiting,
    Settled(FlashloanReport),
}

pub(crate) struct FlashCycle<'r> {
    pub(crate) adapter: Address,
    pub(crate) request: FlashloanRequest,
    pub(crate) registry: &'r TradePathRegistry,
    pub(crate) router: &'r mut dyn SwapRouter,
    pub(crate) guard: SlippageGuard,
    phase: Phase,
}

impl<'r> FlashCycle<'r> {
    pub(crate) fn new(
        adapter: Address,
        request: FlashloanRequest,
        registry: &'r TradePathRegistry,
        router: &'r mut dyn SwapRouter,
        guard: SlippageGuard,
    ) -> Self {
        Self { adapter, request, registry, router, guard, phase: Phase::Awaiting }
    }

    /// Report of the settled cycle; `None` if the market never called back
    pub(crate) fn report(&self) -> Option<FlashloanReport> {
        match self.phase {
            Phase::Settled(report) => Some(report),
            Phase::Awaiting => None,
        }
    }

    /// Accept only the one callback this cycle asked for
    fn admit(&self, loan: &FlashLoan) -> Result<FlashloanContext> {
        if self.phase != Phase::Awaiting {
            return Err(ProtocolError::Reentrancy);
        }
        if loan.initiator != self.adapter
            || loan.asset != self.request.borrow_token
            || loan.amount != self.request.borrow_amount
        {
            return Err(ProtocolError::UnauthorizedCaller);
        }
        Ok(FlashloanContext {
            initiating_vault: self.request.vault,
            borrowed_token: loan.asset,
            borrowed_amount: loan.amount,
            premium_owed: loan.premium,
        })
    }

    /// Swap the borrowed funds along the registered path; returns the
    /// observed amount of target token received
    fn swap(&mut self, market: &dyn MoneyMarket, ledger: &mut Ledger, ctx: &FlashloanContext) -> Result<u128> {
        let token_out = self.request.target_token;
        let registry = self.registry;
        let path = registry.resolve(ctx.borrowed_token, token_out)?;

        let expected = oracle_quote(market, ledger, ctx.borrowed_token, token_out, ctx.borrowed_amount)?;
        let min_out = self.guard.min_amount_out(expected)?;

        let quoted = self
            .router
            .get_amounts_out(ctx.borrowed_amount, path.tokens())?
            .last()
            .copied()
            .unwrap_or(0);
        if quoted < min_out {
            return Err(ProtocolError::RepaymentShortfall { required: min_out, available: quoted });
        }

        let before = ledger.balance_of(token_out, self.adapter);
        self.router
            .swap_exact_tokens_for_tokens(
                ledger,
                self.adapter,
                ctx.borrowed_amount,
                min_out,
                path.tokens(),
                self.adapter,
            )
            .map_err(|e| match e {
                ProtocolError::SlippageExceeded | ProtocolError::InsufficientLiquidity => {
                    ProtocolError::RepaymentShortfall { required: min_out, available: quoted }
                }
                other => other,
            })?;
        let received = ledger.balance_of(token_out, self.adapter).saturating_sub(before);

        debug!(
            "flash swap {} -> {}: in {} expected {} min {} received {} ({} hops)",
            ctx.borrowed_token,
            token_out,
            ctx.borrowed_amount,
            expected,
            min_out,
            received,
            path.hop_count()
        );

        if received < min_out {
            return Err(ProtocolError::RepaymentShortfall { required: min_out, available: received });
        }
        Ok(received)
    }

    /// Hand the swap output to the vault's position
    ///
    /// Returns (debt repaid, leftover left idle on the vault).
    fn deliver(
        &mut self,
        market: &mut dyn MoneyMarket,
        ledger: &mut Ledger,
        received: u128,
    ) -> Result<(u128, u128)> {
        let vault = self.request.vault;
        let token = self.request.target_token;
        match self.request.direction {
            Direction::LeverUp => {
                market.supply(ledger, self.adapter, token, received, vault)?;
                Ok((0, 0))
            }
            Direction::LeverDown => {
                let outstanding = market.position_of(vault, token).borrowed;
                let to_repay = received.min(outstanding);
                let repaid = if to_repay > 0 {
                    market.repay(ledger, self.adapter, token, to_repay, vault)?
                } else {
                    0
                };
                let leftover = received.checked_sub(repaid).ok_or(ProtocolError::MathOverflow)?;
                ledger.transfer(token, self.adapter, vault, leftover)?;
                Ok((repaid, leftover))
            }
        }
    }

    /// Pull `owed` of the borrowed token back out of the vault's position
    fn draw_back(
        &mut self,
        market: &mut dyn MoneyMarket,
        ledger: &mut Ledger,
        ctx: &FlashloanContext,
        owed: u128,
    ) -> Result<()> {
        let vault = ctx.initiating_vault;
        let token = ctx.borrowed_token;
        let result = match self.request.direction {
            Direction::LeverUp => market.borrow(ledger, self.adapter, token, owed, vault),
            Direction::LeverDown => market
                .withdraw(ledger, self.adapter, token, owed, vault, self.adapter)
                .map(|_| ()),
        };
        result.map_err(|e| match e {
            ProtocolError::InsufficientBalance | ProtocolError::InsufficientLiquidity => {
                ProtocolError::RepaymentShortfall {
                    required: owed,
                    available: ledger.balance_of(token, self.adapter),
                }
            }
            other => other,
        })
    }
}

impl FlashLoanReceiver for FlashCycle<'_> {
    fn address(&self) -> Address {
        self.adapter
    }

    fn execute_operation(
        &mut self,
        market: &mut dyn MoneyMarket,
        ledger: &mut Ledger,
        loan: &FlashLoan,
    ) -> Result<()> {
        let ctx = self.admit(loan)?;
        let owed = loan.amount_owed()?;

        // The market must actually have delivered the funds
        let held = ledger.balance_of(ctx.borrowed_token, self.adapter);
        if held < ctx.borrowed_amount {
            return Err(ProtocolError::InsufficientBalance);
        }

        let received = self.swap(market, ledger, &ctx)?;
        let (debt_repaid, leftover) = self.deliver(market, ledger, received)?;
        self.draw_back(market, ledger, &ctx, owed)?;

        let available = ledger.balance_of(ctx.borrowed_token, self.adapter);
        if available < owed {
            return Err(ProtocolError::RepaymentShortfall { required: owed, available });
        }

        self.phase = Phase::Settled(FlashloanReport {
            direction: self.request.direction,
            borrowed: ctx.borrowed_amount,
            premium: ctx.premium_owed,
            swapped_out: received,
            debt_repaid,
            leftover,
        });
        Ok(())
    }
}
