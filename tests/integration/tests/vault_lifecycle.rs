//! Deposit, withdraw and rebalance against a fully deployed world

use dango_common::{ProtocolError, Wad, WAD};
use dango_integration_tests::*;
use dango_sim::{account, deploy, DeploymentConfig};
use dango_vault::RebalanceOutcome;

#[test]
fn test_first_deposit_mints_one_share_per_token_and_levers_up() {
    let mut deployment = deployed();
    let alice = funded(&mut deployment, "alice", 1);

    let receipt = deployment.deposit(alice, ONE_BTC).unwrap();
    assert_eq!(receipt.shares_minted, WAD);
    assert!(receipt.rebalance.is_some());
    assert!(near(receipt.leverage, TARGET, WAD / 20), "leverage {}", Wad(receipt.leverage));
    assert!(in_band(deployment.leverage().unwrap()));

    let snapshot = deployment.snapshot().unwrap();
    assert_eq!(snapshot.total_shares, WAD);
    assert!(snapshot.debt_amount > 0);
    assert_eq!(deployment.shares(alice).unwrap(), WAD);
    assert_eq!(deployment.balance(deployment.collateral, alice), 0);
}

#[test]
fn test_round_trip_returns_collateral_less_costs() {
    let (mut deployment, alice) = with_position(1);

    let receipt = deployment.withdraw(alice, WAD).unwrap();
    assert_eq!(receipt.shares_burned, WAD);
    assert_eq!(receipt.fee_shares, 0);
    assert!(receipt.debt_repaid > 0);

    let returned = deployment.balance(deployment.collateral, alice);
    assert_eq!(returned, receipt.collateral_out);
    assert!(returned < ONE_BTC);
    assert!(returned > ONE_BTC * 97 / 100, "returned {}", returned);

    let snapshot = deployment.snapshot().unwrap();
    assert_eq!(snapshot.total_shares, 0);
    assert_eq!(snapshot.collateral_amount, 0);
    assert_eq!(snapshot.debt_amount, 0);
    assert_eq!(deployment.leverage().unwrap(), WAD);
}

#[test]
fn test_shares_track_balances_across_holders() {
    let (mut deployment, alice) = with_position(2);
    let bob = funded(&mut deployment, "bob", 1);
    deployment.deposit(bob, ONE_BTC).unwrap();

    let carol = account("carol");
    deployment
        .call(alice, dango_proxy::VaultCall::Transfer { to: carol, shares: WAD / 2 })
        .unwrap();
    deployment.withdraw(bob, deployment.shares(bob).unwrap() / 3).unwrap();

    let storage = deployment.proxy().unwrap().storage();
    assert_eq!(storage.sum_of_balances(), storage.position.total_shares);
    assert_eq!(deployment.shares(carol).unwrap(), WAD / 2);
    assert!(in_band(deployment.leverage().unwrap()));
}

#[test]
fn test_second_depositor_pays_current_share_price() {
    let (mut deployment, _) = with_position(1);
    let price = deployment.proxy().unwrap().share_price(deployment.world().view()).unwrap();
    assert!(price < WAD, "costs of levering reduce equity per share");

    let bob = funded(&mut deployment, "bob", 1);
    let receipt = deployment.deposit(bob, ONE_BTC).unwrap();
    assert!(receipt.shares_minted > WAD);
}

#[test]
fn test_price_drop_rebalances_back_to_target() {
    let (mut deployment, _) = with_position(10);
    let collateral = deployment.collateral;

    deployment.set_price(collateral, 25_750 * WAD).unwrap();
    let drifted = deployment.leverage().unwrap();
    assert!(drifted > UPPER, "leverage {}", Wad(drifted));
    assert!(deployment.needs_rebalance().unwrap());

    match deployment.rebalance(account("keeper")).unwrap() {
        RebalanceOutcome::Rebalanced { before, after, report } => {
            assert_eq!(before, drifted);
            assert!(near(after, TARGET, WAD / 20), "after {}", Wad(after));
            assert_eq!(report.direction, dango_flashloan::Direction::LeverDown);
        }
        other => panic!("expected a rebalance, got {:?}", other),
    }
    assert!(!deployment.needs_rebalance().unwrap());
}

#[test]
fn test_price_rise_levers_back_up() {
    let (mut deployment, _) = with_position(10);
    let collateral = deployment.collateral;

    deployment.set_price(collateral, 37_000 * WAD).unwrap();
    assert!(deployment.leverage().unwrap() < LOWER);

    let outcome = deployment.rebalance(account("keeper")).unwrap();
    assert!(matches!(outcome, RebalanceOutcome::Rebalanced { .. }));
    assert!(near(outcome.leverage(), TARGET, WAD / 20));
}

#[test]
fn test_rebalance_inside_band_is_a_no_op() {
    let (mut deployment, _) = with_position(3);
    let keeper = account("keeper");

    let first = deployment.rebalance(keeper).unwrap();
    let second = deployment.rebalance(keeper).unwrap();
    assert!(matches!(first, RebalanceOutcome::Skipped { .. }));
    assert_eq!(first, second);
    assert_eq!(second.leverage(), deployment.leverage().unwrap());
}

#[test]
fn test_capacity_is_enforced() {
    let mut config = DeploymentConfig::default();
    config.vault.capacity = Wad(2 * WAD);
    let mut deployment = deploy(&config).unwrap();
    let alice = funded(&mut deployment, "alice", 3);

    deployment.deposit(alice, 3 * ONE_BTC / 2).unwrap();
    let before = Snapshot::take(&deployment);
    assert_eq!(deployment.deposit(alice, ONE_BTC), Err(ProtocolError::CapacityExceeded));
    before.assert_unchanged(&deployment, "deposit over capacity");
}

#[test]
fn test_zero_amounts_rejected() {
    let (mut deployment, alice) = with_position(1);
    assert_eq!(deployment.deposit(alice, 0), Err(ProtocolError::ZeroAmount));
    assert_eq!(deployment.withdraw(alice, 0), Err(ProtocolError::ZeroAmount));
}

#[test]
fn test_overdrawn_withdraw_leaves_no_trace() {
    let (mut deployment, alice) = with_position(1);
    let before = Snapshot::take(&deployment);
    assert_eq!(deployment.withdraw(alice, WAD + 1), Err(ProtocolError::InsufficientShares));
    before.assert_unchanged(&deployment, "overdrawn withdraw");
}

#[test]
fn test_exit_fee_goes_to_fee_recipient() {
    let (mut deployment, alice) = with_position(1);
    let admin = deployment.fee_recipient;

    assert_eq!(
        deployment.call(alice, dango_proxy::VaultCall::SetExitFee { fee_bps: 50 }),
        Err(ProtocolError::Unauthorized)
    );
    assert_eq!(
        deployment.call(admin, dango_proxy::VaultCall::SetExitFee { fee_bps: 150 }),
        Err(ProtocolError::InvalidBounds)
    );
    deployment.call(admin, dango_proxy::VaultCall::SetExitFee { fee_bps: 100 }).unwrap();

    let receipt = deployment.withdraw(alice, WAD / 2).unwrap();
    assert_eq!(receipt.fee_shares, WAD / 2 / 100);
    assert_eq!(receipt.shares_burned, WAD / 2 - receipt.fee_shares);
    assert_eq!(deployment.shares(admin).unwrap(), receipt.fee_shares);
    assert_eq!(deployment.shares(alice).unwrap(), WAD / 2);
}

#[test]
fn test_last_withdrawer_empties_the_vault() {
    let (mut deployment, alice) = with_position(2);
    let bob = funded(&mut deployment, "bob", 1);
    deployment.deposit(bob, ONE_BTC).unwrap();

    deployment.withdraw(alice, deployment.shares(alice).unwrap()).unwrap();
    assert!(in_band(deployment.leverage().unwrap()));
    deployment.withdraw(bob, deployment.shares(bob).unwrap()).unwrap();

    let vault = deployment.vault;
    let world = deployment.world();
    let snapshot = deployment.snapshot().unwrap();
    assert_eq!(snapshot.total_shares, 0);
    assert_eq!(snapshot.collateral_amount, 0);
    assert_eq!(snapshot.debt_amount, 0);
    assert_eq!(world.ledger.balance_of(deployment.collateral, vault), 0);
    assert_eq!(world.ledger.balance_of(deployment.debt, vault), 0);
}

#[test]
fn test_withdraw_that_cannot_rebalance_reverts() {
    let (mut deployment, alice) = with_position(10);
    let (admin, wbtc, usdc) = (deployment.admin, deployment.collateral, deployment.debt);
    let wmatic = deployment.token("WMATIC").unwrap();

    // Lever-up route through a pair with no pool
    deployment
        .chain
        .transact("add_trade_path", |world| world.adapter.add_trade_path(admin, usdc, wbtc, &[usdc, wmatic, wbtc]))
        .unwrap();
    deployment.set_price(wbtc, 37_000 * WAD).unwrap();
    assert!(deployment.leverage().unwrap() < LOWER);

    let before = Snapshot::take(&deployment);
    assert_eq!(deployment.withdraw(alice, WAD / 2), Err(ProtocolError::WithdrawBreaksInvariant));
    before.assert_unchanged(&deployment, "withdraw from an unbalanced vault");
    assert_eq!(deployment.shares(alice).unwrap(), WAD);
}

#[test]
fn test_rebalance_landing_outside_band_reverts() {
    let (mut deployment, _) = with_position(10);
    let wbtc = deployment.collateral;

    // Oracle drops while the pool still trades at the old price, so the
    // lever-down buys back far more debt than planned
    deployment
        .chain
        .transact("oracle", |world| world.lending.set_price(wbtc, 22_000 * WAD))
        .unwrap();
    assert!(deployment.leverage().unwrap() > UPPER);

    let before = Snapshot::take(&deployment);
    match deployment.rebalance(account("keeper")) {
        Err(ProtocolError::LeverageOutOfBounds { leverage, lower, upper }) => {
            assert!(leverage < lower, "leverage {}", Wad(leverage));
            assert_eq!((lower, upper), (LOWER, UPPER));
        }
        other => panic!("expected LeverageOutOfBounds, got {:?}", other),
    }
    before.assert_unchanged(&deployment, "overshooting rebalance");
}
