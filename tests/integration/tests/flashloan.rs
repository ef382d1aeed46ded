//! Adapter guards and reward harvesting through the deployed stack

use adapter_core::{IncentivesController, Venues};
use dango_common::{Address, ProtocolError, Wad, WAD};
use dango_flashloan::{Direction, FlashloanRequest};
use dango_integration_tests::*;
use dango_proxy::{CallOutcome, VaultCall};
use dango_sim::{account, deploy, DeploymentConfig, World};

fn flashloan(world: &mut World, caller: Address, request: FlashloanRequest) -> dango_common::Result<()> {
    let World { ledger, lending, dex, adapter, .. } = world;
    let mut venues = Venues::new(ledger, lending, dex);
    adapter.execute_flashloan(&mut venues, caller, request).map(|_| ())
}

#[test]
fn test_single_token_path_rejected() {
    let mut deployment = deployed();
    let admin = deployment.admin;
    let wbtc = deployment.collateral;
    let result = deployment
        .chain
        .transact("add_trade_path", |world| world.adapter.add_trade_path(admin, wbtc, wbtc, &[wbtc]));
    assert_eq!(result, Err(ProtocolError::InvalidPath));
}

#[test]
fn test_only_admin_registers_paths() {
    let mut deployment = deployed();
    let (usdc, weth) = (deployment.debt, deployment.token("WETH").unwrap());
    let result = deployment.chain.transact("add_trade_path", |world| {
        world.adapter.add_trade_path(account("mallory"), usdc, weth, &[usdc, weth])
    });
    assert_eq!(result, Err(ProtocolError::Unauthorized));
    assert!(deployment.world().adapter.trade_path(usdc, weth).is_err());
}

#[test]
fn test_unauthorized_caller_leaves_market_untouched() {
    let (mut deployment, _) = with_position(1);
    let (wbtc, usdc) = (deployment.collateral, deployment.debt);
    let vault = deployment.vault;
    let mallory = account("mallory");
    let before = Snapshot::take(&deployment);

    for (caller, target) in [(mallory, mallory), (mallory, vault)] {
        let result = deployment.chain.transact("flashloan", |world| {
            flashloan(
                world,
                caller,
                FlashloanRequest {
                    vault: target,
                    borrow_token: usdc,
                    target_token: wbtc,
                    borrow_amount: 1_000_000,
                    direction: Direction::LeverUp,
                },
            )
        });
        assert_eq!(result, Err(ProtocolError::UnauthorizedCaller));
    }
    before.assert_unchanged(&deployment, "unauthorized flashloan");
}

#[test]
fn test_missing_route_reverts_every_transfer() {
    let (mut deployment, _) = with_position(1);
    let usdc = deployment.debt;
    let weth = deployment.token("WETH").unwrap();
    let vault = deployment.vault;
    let before = Snapshot::take(&deployment);

    let result = deployment.chain.transact("flashloan", |world| {
        flashloan(
            world,
            vault,
            FlashloanRequest {
                vault,
                borrow_token: usdc,
                target_token: weth,
                borrow_amount: 1_000_000_000,
                direction: Direction::LeverUp,
            },
        )
    });
    assert_eq!(result, Err(ProtocolError::RouteNotFound { token_in: usdc, token_out: weth }));
    before.assert_unchanged(&deployment, "flashloan without a route");
}

#[test]
fn test_harvest_compounds_rewards_into_collateral() {
    let (mut deployment, _) = with_position(5);
    let vault = deployment.vault;
    let collateral_before = deployment.snapshot().unwrap().collateral_amount;

    deployment.accrue_rewards(3_000 * WAD).unwrap();
    let receipt = match deployment.call(account("keeper"), VaultCall::Harvest).unwrap() {
        CallOutcome::Harvest(receipt) => receipt,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(receipt.claimed, 3_000 * WAD);
    // $3,000 of WMATIC at $30,000 per WBTC, less fees
    assert!(near(receipt.supplied, ONE_BTC / 10, ONE_BTC / 100), "supplied {}", receipt.supplied);
    assert!(in_band(receipt.leverage));

    let world = deployment.world();
    let incentives = world.incentives.as_ref().unwrap();
    assert_eq!(incentives.rewards_balance(vault), 0);
    assert!(deployment.snapshot().unwrap().collateral_amount > collateral_before);
    assert_eq!(world.ledger.balance_of(incentives.reward_token(), deployment.adapter), 0);
}

#[test]
fn test_harvest_with_nothing_accrued() {
    let (mut deployment, _) = with_position(1);
    match deployment.call(account("keeper"), VaultCall::Harvest).unwrap() {
        CallOutcome::Harvest(receipt) => {
            assert_eq!(receipt.claimed, 0);
            assert_eq!(receipt.supplied, 0);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_harvest_requires_rewards_wiring() {
    let mut config = DeploymentConfig::default();
    config.adapter.rewards = None;
    let mut deployment = deploy(&config).unwrap();
    let alice = funded(&mut deployment, "alice", 1);
    deployment.deposit(alice, ONE_BTC).unwrap();

    let before = Snapshot::take(&deployment);
    assert_eq!(
        deployment.call(account("keeper"), VaultCall::Harvest),
        Err(ProtocolError::RewardsNotConfigured)
    );
    assert_eq!(deployment.accrue_rewards(WAD), Err(ProtocolError::RewardsNotConfigured));
    before.assert_unchanged(&deployment, "harvest on a v1 adapter");
}

#[test]
fn test_slippage_guard_blocks_thin_pools() {
    let mut config = DeploymentConfig::default();
    for pool in config.pools.iter_mut().filter(|p| p.base == "WBTC" && p.quote == "USDC") {
        pool.base_reserve = Wad(20 * WAD);
    }
    let mut deployment = deploy(&config).unwrap();
    let alice = funded(&mut deployment, "alice", 5);

    let before = Snapshot::take(&deployment);
    let result = deployment.deposit(alice, 5 * ONE_BTC);
    assert!(matches!(result, Err(ProtocolError::RepaymentShortfall { .. })), "{:?}", result);
    before.assert_unchanged(&deployment, "deposit through a thin pool");
}
