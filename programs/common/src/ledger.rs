//! Token ledger
//!
//! Fungible balances for every registered token, keyed by (token, holder).
//! Collaborators move value only through `transfer`/`mint`/`burn`, so the
//! balances observed here are the ground truth each hand-off is checked
//! against.

use crate::error::{ProtocolError, Result};
use crate::types::Address;
use model_safety::math::MAX_DECIMALS;
use std::collections::BTreeMap;

/// Static token metadata plus supply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    tokens: BTreeMap<Address, TokenInfo>,
    balances: BTreeMap<(Address, Address), u128>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token; re-registering an address is rejected
    pub fn register_token(&mut self, token: Address, symbol: &str, decimals: u8) -> Result<()> {
        if decimals > MAX_DECIMALS || self.tokens.contains_key(&token) {
            return Err(ProtocolError::UnknownToken(token));
        }
        self.tokens.insert(
            token,
            TokenInfo { symbol: symbol.to_string(), decimals, total_supply: 0 },
        );
        Ok(())
    }

    pub fn token(&self, token: Address) -> Result<&TokenInfo> {
        self.tokens.get(&token).ok_or(ProtocolError::UnknownToken(token))
    }

    pub fn decimals(&self, token: Address) -> Result<u8> {
        self.token(token).map(|t| t.decimals)
    }

    /// Look a token up by symbol (case-insensitive)
    pub fn find_symbol(&self, symbol: &str) -> Option<Address> {
        self.tokens
            .iter()
            .find(|(_, info)| info.symbol.eq_ignore_ascii_case(symbol))
            .map(|(addr, _)| *addr)
    }

    pub fn tokens(&self) -> impl Iterator<Item = (&Address, &TokenInfo)> {
        self.tokens.iter()
    }

    pub fn balance_of(&self, token: Address, holder: Address) -> u128 {
        self.balances.get(&(token, holder)).copied().unwrap_or(0)
    }

    pub fn mint(&mut self, token: Address, to: Address, amount: u128) -> Result<()> {
        let info = self.tokens.get_mut(&token).ok_or(ProtocolError::UnknownToken(token))?;
        let supply = info.total_supply.checked_add(amount).ok_or(ProtocolError::MathOverflow)?;
        let slot = self.balances.entry((token, to)).or_insert(0);
        *slot = slot.checked_add(amount).ok_or(ProtocolError::MathOverflow)?;
        info.total_supply = supply;
        Ok(())
    }

    pub fn burn(&mut self, token: Address, from: Address, amount: u128) -> Result<()> {
        let info = self.tokens.get_mut(&token).ok_or(ProtocolError::UnknownToken(token))?;
        let balance = self.balances.get(&(token, from)).copied().unwrap_or(0);
        let remaining = balance.checked_sub(amount).ok_or(ProtocolError::InsufficientBalance)?;
        info.total_supply -= amount;
        self.set_balance(token, from, remaining);
        Ok(())
    }

    pub fn transfer(&mut self, token: Address, from: Address, to: Address, amount: u128) -> Result<()> {
        if !self.tokens.contains_key(&token) {
            return Err(ProtocolError::UnknownToken(token));
        }
        let from_balance = self.balance_of(token, from);
        let from_after = from_balance.checked_sub(amount).ok_or(ProtocolError::InsufficientBalance)?;
        if from == to || amount == 0 {
            return Ok(());
        }
        let to_after = self
            .balance_of(token, to)
            .checked_add(amount)
            .ok_or(ProtocolError::MathOverflow)?;
        self.set_balance(token, from, from_after);
        self.set_balance(token, to, to_after);
        Ok(())
    }

    fn set_balance(&mut self, token: Address, holder: Address, amount: u128) {
        if amount == 0 {
            self.balances.remove(&(token, holder));
        } else {
            self.balances.insert((token, holder), amount);
        }
    }

    /// Sum of all balances of `token`; equals its total supply
    pub fn circulating(&self, token: Address) -> u128 {
        self.balances
            .range((token, Address::ZERO)..)
            .take_while(|((t, _), _)| *t == token)
            .map(|(_, amount)| *amount)
            .sum()
    }
}
