//! Transactional host
//!
//! `World` is every piece of state a call can touch. `Chain` runs each
//! top-level call against a scratch copy of the world and commits it only if
//! the call returns `Ok`, so a failed call leaves no trace anywhere.

use crate::dex::Dex;
use crate::incentives::Incentives;
use crate::lending::LendingPool;
use adapter_core::{IncentivesController, Venues};
use dango_common::{Address, Ledger, ProtocolError, Result};
use dango_flashloan::FlashloanAdapter;
use dango_proxy::UpgradeableProxy;
use dango_vault::{Env, MarketView};
use log::{debug, warn};
use sha3::{Digest, Keccak256};
use std::collections::BTreeMap;

/// Address a deployer's `nonce`-th deployment receives
pub fn derive_address(deployer: Address, nonce: u64) -> Address {
    let mut hasher = Keccak256::new();
    hasher.update(deployer.as_bytes());
    hasher.update(nonce.to_be_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; Address::LEN];
    bytes.copy_from_slice(&digest[32 - Address::LEN..]);
    Address(bytes)
}

/// Stable address for a named account ("alice", "keeper", ...)
pub fn account(name: &str) -> Address {
    let digest = Keccak256::digest(name.as_bytes());
    let mut bytes = [0u8; Address::LEN];
    bytes.copy_from_slice(&digest[32 - Address::LEN..]);
    Address(bytes)
}

#[derive(Debug, Clone)]
pub struct World {
    pub ledger: Ledger,
    pub lending: LendingPool,
    pub dex: Dex,
    /// Present when the deployment wires liquidity-mining rewards
    pub incentives: Option<Incentives>,
    pub adapter: FlashloanAdapter,
    pub vaults: BTreeMap<Address, UpgradeableProxy>,
}

impl World {
    pub fn view(&self) -> MarketView<'_> {
        MarketView::new(&self.ledger, &self.lending)
    }

    pub fn vault(&self, address: Address) -> Result<&UpgradeableProxy> {
        self.vaults.get(&address).ok_or(ProtocolError::UnknownVault(address))
    }

    /// Run `f` against the vault proxy at `address` with a full call env
    pub fn with_vault<T>(
        &mut self,
        address: Address,
        f: impl FnOnce(&mut UpgradeableProxy, &mut Env<'_>) -> Result<T>,
    ) -> Result<T> {
        let World { ledger, lending, dex, incentives, adapter, vaults } = self;
        let proxy = vaults.get_mut(&address).ok_or(ProtocolError::UnknownVault(address))?;
        let incentives = incentives.as_mut().map(|i| i as &mut dyn IncentivesController);
        let mut env = Env::new(Venues::new(ledger, lending, dex), adapter, incentives);
        f(proxy, &mut env)
    }

    /// Run `f` with a call env but no proxy, for deployment
    pub fn with_env<T>(&mut self, f: impl FnOnce(&mut Env<'_>) -> Result<T>) -> Result<T> {
        let World { ledger, lending, dex, incentives, adapter, .. } = self;
        let incentives = incentives.as_mut().map(|i| i as &mut dyn IncentivesController);
        let mut env = Env::new(Venues::new(ledger, lending, dex), adapter, incentives);
        f(&mut env)
    }

    pub fn leverage(&self, vault: Address) -> Result<u128> {
        self.vault(vault)?.leverage(self.view())
    }
}

/// Deploying account and its next nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployer {
    pub address: Address,
    pub nonce: u64,
}

impl Deployer {
    pub fn new(address: Address) -> Self {
        Self { address, nonce: 0 }
    }

    /// Address the deployment `nonce_offset` steps from now will receive
    pub fn predict(&self, nonce_offset: u64) -> Address {
        derive_address(self.address, self.nonce + nonce_offset)
    }

    /// Consume the next nonce
    pub fn next(&mut self) -> Address {
        let address = self.predict(0);
        self.nonce += 1;
        address
    }
}

#[derive(Debug, Clone)]
pub struct Chain {
    world: World,
    deployer: Deployer,
    height: u64,
}

impl Chain {
    pub fn new(world: World, deployer: Deployer) -> Self {
        Self { world, deployer, height: 0 }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn deployer(&self) -> Address {
        self.deployer.address
    }

    /// Number of committed calls
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn predict_address(&self, nonce_offset: u64) -> Address {
        self.deployer.predict(nonce_offset)
    }

    pub fn next_address(&mut self) -> Address {
        self.deployer.next()
    }

    /// Run one top-level call; its effects are committed only on `Ok`
    pub fn transact<T>(&mut self, label: &str, f: impl FnOnce(&mut World) -> Result<T>) -> Result<T> {
        let mut scratch = self.world.clone();
        match f(&mut scratch) {
            Ok(value) => {
                self.world = scratch;
                self.height += 1;
                debug!("#{} {} committed", self.height, label);
                Ok(value)
            }
            Err(e) => {
                warn!("{} reverted: {}", label, e);
                Err(e)
            }
        }
    }
}
