//! Trade path registry
//!
//! Admin-maintained routes from (token_in, token_out) to the full hop list
//! handed to the exchange router. Resolution is a direct lookup: a pair with
//! no registered path is an error, never a search.

use arrayvec::ArrayVec;
use dango_common::{Address, ProtocolError, Result};
use std::collections::BTreeMap;

/// Longest route the adapter will execute (tokens, including both ends)
pub const MAX_PATH_LEN: usize = 5;

/// Ordered token route, `path[0]` = input, `path[last]` = output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradePath(ArrayVec<Address, MAX_PATH_LEN>);

impl TradePath {
    /// Validate `hops` as the route for `token_in -> token_out`
    ///
    /// Rejects fewer than 2 tokens, more than `MAX_PATH_LEN`, endpoints that
    /// do not match the pair, and hops that swap a token into itself.
    pub fn new(token_in: Address, token_out: Address, hops: &[Address]) -> Result<Self> {
        if hops.len() < 2 || hops.len() > MAX_PATH_LEN {
            return Err(ProtocolError::InvalidPath);
        }
        if hops[0] != token_in || hops[hops.len() - 1] != token_out {
            return Err(ProtocolError::InvalidPath);
        }
        if hops.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(ProtocolError::InvalidPath);
        }

        let mut path = ArrayVec::new();
        path.try_extend_from_slice(hops).map_err(|_| ProtocolError::InvalidPath)?;
        Ok(Self(path))
    }

    pub fn tokens(&self) -> &[Address] {
        &self.0
    }

    pub fn token_in(&self) -> Address {
        self.0[0]
    }

    pub fn token_out(&self) -> Address {
        self.0[self.0.len() - 1]
    }

    /// Number of swaps along the route
    pub fn hop_count(&self) -> usize {
        self.0.len() - 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradePathRegistry {
    paths: BTreeMap<(Address, Address), TradePath>,
}

impl TradePathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or overwrite the route for a directional pair
    ///
    /// Returns the previous route, if any.
    pub fn insert(&mut self, token_in: Address, token_out: Address, hops: &[Address]) -> Result<Option<TradePath>> {
        let path = TradePath::new(token_in, token_out, hops)?;
        Ok(self.paths.insert((token_in, token_out), path))
    }

    pub fn get(&self, token_in: Address, token_out: Address) -> Option<&TradePath> {
        self.paths.get(&(token_in, token_out))
    }

    /// Route for a pair, or `RouteNotFound`
    pub fn resolve(&self, token_in: Address, token_out: Address) -> Result<&TradePath> {
        self.get(token_in, token_out)
            .ok_or(ProtocolError::RouteNotFound { token_in, token_out })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TradePath> {
        self.paths.values()
    }
}
