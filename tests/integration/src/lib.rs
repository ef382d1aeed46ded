//! Shared fixtures for the end-to-end suites

use dango_common::{Address, Ledger, WAD};
use dango_sim::{account, deploy, Deployment, DeploymentConfig, LendingPool};
use dango_vault::{InitParams, VaultStorage};

/// One whole WBTC in native units
pub const ONE_BTC: u128 = 100_000_000;

pub const LOWER: u128 = 17 * WAD / 10;
pub const TARGET: u128 = 2 * WAD;
pub const UPPER: u128 = 23 * WAD / 10;

pub fn deployed() -> Deployment {
    deploy(&DeploymentConfig::default()).unwrap()
}

/// Named account holding `btc` whole WBTC
pub fn funded(deployment: &mut Deployment, name: &str, btc: u128) -> Address {
    let holder = account(name);
    deployment.fund(holder, deployment.collateral, btc * ONE_BTC).unwrap();
    holder
}

/// Deployment with `alice` already levered up on `btc` WBTC
pub fn with_position(btc: u128) -> (Deployment, Address) {
    let mut deployment = deployed();
    let alice = funded(&mut deployment, "alice", btc);
    deployment.deposit(alice, btc * ONE_BTC).unwrap();
    (deployment, alice)
}

/// The arguments the deployment initialized its vault with
pub fn init_params(deployment: &Deployment) -> InitParams {
    let storage = deployment.proxy().unwrap().storage();
    InitParams {
        name: storage.name.clone(),
        symbol: storage.symbol.clone(),
        flashloan_adapter: deployment.adapter,
        fee_recipient: deployment.fee_recipient,
        lower_bound: storage.lower_bound,
        upper_bound: storage.upper_bound,
        capacity: storage.capacity,
    }
}

pub fn in_band(leverage: u128) -> bool {
    (LOWER..=UPPER).contains(&leverage)
}

pub fn near(value: u128, target: u128, tolerance: u128) -> bool {
    value.abs_diff(target) <= tolerance
}

/// Every piece of state a reverted call must leave alone
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub ledger: Ledger,
    pub lending: LendingPool,
    pub storage: VaultStorage,
    pub height: u64,
}

impl Snapshot {
    pub fn take(deployment: &Deployment) -> Self {
        let world = deployment.world();
        Self {
            ledger: world.ledger.clone(),
            lending: world.lending.clone(),
            storage: deployment.proxy().unwrap().storage().clone(),
            height: deployment.chain.height(),
        }
    }

    pub fn assert_unchanged(&self, deployment: &Deployment, context: &str) {
        let now = Snapshot::take(deployment);
        assert!(now.ledger == self.ledger, "{}: ledger changed", context);
        assert!(now.lending == self.lending, "{}: money market changed", context);
        assert!(now.storage == self.storage, "{}: vault storage changed", context);
        assert_eq!(now.height, self.height, "{}: chain height changed", context);
    }
}
