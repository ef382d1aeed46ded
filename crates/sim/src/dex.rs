//! Constant-product exchange with a multi-hop router
//!
//! Pools are keyed by the sorted token pair and hold their reserves on the
//! ledger under the exchange's address. Quotes come from `amm_model`.

use adapter_core::SwapRouter;
use amm_model::{get_amount_in, get_amount_out, AmmError, DEFAULT_FEE_BPS};
use dango_common::{amount_of, value_of, Address, Ledger, ProtocolError, Result, Rounding};
use log::debug;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DexConfig {
    pub address: Address,
    pub fee_bps: u16,
}

impl DexConfig {
    pub fn new(address: Address) -> Self {
        Self { address, fee_bps: DEFAULT_FEE_BPS }
    }
}

/// Reserves of one pair, ordered as the sorted key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pool {
    pub reserve0: u128,
    pub reserve1: u128,
}

fn amm_error(e: AmmError) -> ProtocolError {
    match e {
        AmmError::InvalidAmount => ProtocolError::ZeroAmount,
        AmmError::InvalidReserves | AmmError::InsufficientLiquidity => ProtocolError::InsufficientLiquidity,
        AmmError::Overflow => ProtocolError::MathOverflow,
    }
}

fn sort(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dex {
    config: DexConfig,
    pools: BTreeMap<(Address, Address), Pool>,
}

impl Dex {
    pub fn new(config: DexConfig) -> Self {
        Self { config, pools: BTreeMap::new() }
    }

    pub fn config(&self) -> &DexConfig {
        &self.config
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Reserves of `(token_in, token_out)`, oriented in that order
    pub fn reserves(&self, token_in: Address, token_out: Address) -> Result<(u128, u128)> {
        let key = sort(token_in, token_out);
        let pool = self.pools.get(&key).ok_or(ProtocolError::PoolNotFound)?;
        if key.0 == token_in {
            Ok((pool.reserve0, pool.reserve1))
        } else {
            Ok((pool.reserve1, pool.reserve0))
        }
    }

    fn set_reserves(&mut self, token_in: Address, token_out: Address, reserve_in: u128, reserve_out: u128) {
        let key = sort(token_in, token_out);
        let pool = if key.0 == token_in {
            Pool { reserve0: reserve_in, reserve1: reserve_out }
        } else {
            Pool { reserve0: reserve_out, reserve1: reserve_in }
        };
        self.pools.insert(key, pool);
    }

    /// Deposit both sides of a pair from `provider`, creating the pool if needed
    pub fn add_liquidity(
        &mut self,
        ledger: &mut Ledger,
        provider: Address,
        token_a: Address,
        amount_a: u128,
        token_b: Address,
        amount_b: u128,
    ) -> Result<()> {
        if token_a == token_b {
            return Err(ProtocolError::InvalidPath);
        }
        if amount_a == 0 || amount_b == 0 {
            return Err(ProtocolError::ZeroAmount);
        }
        let (reserve_a, reserve_b) = self.reserves(token_a, token_b).unwrap_or((0, 0));
        ledger.transfer(token_a, provider, self.config.address, amount_a)?;
        ledger.transfer(token_b, provider, self.config.address, amount_b)?;
        let reserve_a = reserve_a.checked_add(amount_a).ok_or(ProtocolError::MathOverflow)?;
        let reserve_b = reserve_b.checked_add(amount_b).ok_or(ProtocolError::MathOverflow)?;
        self.set_reserves(token_a, token_b, reserve_a, reserve_b);
        debug!("pool {}/{}: reserves {} / {}", token_a, token_b, reserve_a, reserve_b);
        Ok(())
    }

    /// Move the pool onto the oracle price by resizing the `quote` side
    ///
    /// Stands in for arbitrage after an oracle move. The quote-side delta is
    /// minted into or burned from the exchange.
    pub fn reprice(
        &mut self,
        ledger: &mut Ledger,
        base: Address,
        quote: Address,
        base_price: u128,
        quote_price: u128,
    ) -> Result<()> {
        let (reserve_base, reserve_quote) = self.reserves(base, quote)?;
        let value = value_of(reserve_base, base_price, ledger.decimals(base)?, Rounding::Down)?;
        let target = amount_of(value, quote_price, ledger.decimals(quote)?, Rounding::Down)?;
        if target == 0 {
            return Err(ProtocolError::InsufficientLiquidity);
        }
        if target > reserve_quote {
            ledger.mint(quote, self.config.address, target - reserve_quote)?;
        } else {
            ledger.burn(quote, self.config.address, reserve_quote - target)?;
        }
        self.set_reserves(base, quote, reserve_base, target);
        debug!("pool {}/{} repriced: quote reserve {} -> {}", base, quote, reserve_quote, target);
        Ok(())
    }

    fn check_path(path: &[Address]) -> Result<()> {
        if path.len() < 2 {
            return Err(ProtocolError::InvalidPath);
        }
        Ok(())
    }
}

impl SwapRouter for Dex {
    fn address(&self) -> Address {
        self.config.address
    }

    fn get_amounts_out(&self, amount_in: u128, path: &[Address]) -> Result<Vec<u128>> {
        Self::check_path(path)?;
        let mut amounts = Vec::with_capacity(path.len());
        amounts.push(amount_in);
        let mut current = amount_in;
        for hop in path.windows(2) {
            let (reserve_in, reserve_out) = self.reserves(hop[0], hop[1])?;
            current = get_amount_out(current, reserve_in, reserve_out, self.config.fee_bps).map_err(amm_error)?;
            amounts.push(current);
        }
        Ok(amounts)
    }

    fn get_amounts_in(&self, amount_out: u128, path: &[Address]) -> Result<Vec<u128>> {
        Self::check_path(path)?;
        let mut amounts = vec![0; path.len()];
        let mut current = amount_out;
        amounts[path.len() - 1] = current;
        for i in (1..path.len()).rev() {
            let (reserve_in, reserve_out) = self.reserves(path[i - 1], path[i])?;
            current = get_amount_in(current, reserve_in, reserve_out, self.config.fee_bps).map_err(amm_error)?;
            amounts[i - 1] = current;
        }
        Ok(amounts)
    }

    fn swap_exact_tokens_for_tokens(
        &mut self,
        ledger: &mut Ledger,
        caller: Address,
        amount_in: u128,
        min_amount_out: u128,
        path: &[Address],
        to: Address,
    ) -> Result<Vec<u128>> {
        let amounts = self.get_amounts_out(amount_in, path)?;
        let amount_out = amounts.last().copied().unwrap_or(0);
        if amount_out < min_amount_out {
            return Err(ProtocolError::SlippageExceeded);
        }

        ledger.transfer(path[0], caller, self.config.address, amount_in)?;
        for (i, hop) in path.windows(2).enumerate() {
            let (reserve_in, reserve_out) = self.reserves(hop[0], hop[1])?;
            let reserve_in = reserve_in.checked_add(amounts[i]).ok_or(ProtocolError::MathOverflow)?;
            let reserve_out = reserve_out.checked_sub(amounts[i + 1]).ok_or(ProtocolError::InsufficientLiquidity)?;
            self.set_reserves(hop[0], hop[1], reserve_in, reserve_out);
        }
        ledger.transfer(path[path.len() - 1], self.config.address, to, amount_out)?;
        debug!("swap {} -> {} along {} hops for {}", amount_in, amount_out, path.len() - 1, to);
        Ok(amounts)
    }
}
