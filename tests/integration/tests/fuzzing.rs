//! State-machine fuzzing of the deployed vault
//!
//! Random deposits, withdrawals, transfers, oracle moves and rebalances are
//! replayed against one deployment. After every action:
//! - a reverted action leaves ledger, market and vault storage untouched
//! - holder balances sum to the total share supply
//! - a successful state-changing call leaves leverage inside the band
//!
//! Increase cases: PROPTEST_CASES=256 cargo test -p dango-integration-tests --test fuzzing

use dango_common::{Address, WAD};
use dango_integration_tests::*;
use dango_proxy::VaultCall;
use dango_sim::{account, Deployment};
use proptest::prelude::*;

const ACTORS: [&str; 3] = ["alice", "bob", "carol"];

/// Oracle price of WBTC at genesis
const BASE_PRICE: u128 = 30_000;

/// Leverage reads round up; allow for that at the band edges
const EDGE: u128 = 1_000;

#[derive(Clone, Debug)]
enum Action {
    /// Hundredths of a WBTC
    Deposit { who: usize, centi_btc: u128 },
    /// Fraction of the holder's shares in bps
    Withdraw { who: usize, bps: u128 },
    Transfer { from: usize, to: usize, bps: u128 },
    /// Collateral price as a percentage of genesis
    SetPrice { pct: u128 },
    Rebalance,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        6 => (0..ACTORS.len(), 0u128..300).prop_map(|(who, centi_btc)| Action::Deposit { who, centi_btc }),
        4 => (0..ACTORS.len(), 0u128..=10_000).prop_map(|(who, bps)| Action::Withdraw { who, bps }),
        2 => (0..ACTORS.len(), 0..ACTORS.len(), 0u128..=10_000)
            .prop_map(|(from, to, bps)| Action::Transfer { from, to, bps }),
        3 => (85u128..=115).prop_map(|pct| Action::SetPrice { pct }),
        3 => Just(Action::Rebalance),
    ]
}

/// Opening deposit so every run has a position to act on
fn opening_strategy() -> impl Strategy<Value = Action> {
    (0..ACTORS.len(), 1u128..300).prop_map(|(who, centi_btc)| Action::Deposit { who, centi_btc })
}

struct FuzzState {
    deployment: Deployment,
    actors: Vec<Address>,
    committed_deposits: usize,
}

impl FuzzState {
    fn new() -> Self {
        let mut deployment = deployed();
        let actors = ACTORS.iter().map(|name| funded(&mut deployment, name, 20)).collect();
        FuzzState { deployment, actors, committed_deposits: 0 }
    }

    fn check_shares(&self, context: &str) {
        let storage = self.deployment.proxy().unwrap().storage();
        assert_eq!(storage.sum_of_balances(), storage.position.total_shares, "{}: share sum", context);
    }

    fn check_band(&self, context: &str) {
        let storage = self.deployment.proxy().unwrap().storage();
        if storage.position.total_shares == 0 {
            return;
        }
        let leverage = self.deployment.leverage().unwrap();
        assert!(
            (LOWER - EDGE..=UPPER + EDGE).contains(&leverage),
            "{}: leverage {} outside band",
            context,
            leverage
        );
    }

    fn execute(&mut self, action: &Action, step: usize) {
        let context = format!("Step {} ({:?})", step, action);
        let snapshot = Snapshot::take(&self.deployment);

        let (result, moves_position) = match *action {
            Action::Deposit { who, centi_btc } => {
                let call = VaultCall::Deposit { amount: centi_btc * ONE_BTC / 100 };
                (self.deployment.call(self.actors[who], call).map(|_| ()), true)
            }
            Action::Withdraw { who, bps } => {
                let holder = self.actors[who];
                let shares = self.deployment.shares(holder).unwrap() * bps / 10_000;
                (self.deployment.call(holder, VaultCall::Withdraw { shares }).map(|_| ()), true)
            }
            Action::Transfer { from, to, bps } => {
                let holder = self.actors[from];
                let shares = self.deployment.shares(holder).unwrap() * bps / 10_000;
                let call = VaultCall::Transfer { to: self.actors[to], shares };
                (self.deployment.call(holder, call).map(|_| ()), false)
            }
            Action::SetPrice { pct } => {
                let collateral = self.deployment.collateral;
                (self.deployment.set_price(collateral, BASE_PRICE * pct * WAD / 100), false)
            }
            Action::Rebalance => (self.deployment.call(account("keeper"), VaultCall::Rebalance).map(|_| ()), true),
        };

        match result {
            Ok(()) => {
                if let Action::Deposit { .. } = action {
                    self.committed_deposits += 1;
                }
                if moves_position {
                    self.check_band(&context);
                }
            }
            Err(_) => snapshot.assert_unchanged(&self.deployment, &context),
        }
        self.check_shares(&context);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn fuzz_vault_state_machine(
        opening in opening_strategy(),
        actions in prop::collection::vec(action_strategy(), 10..40),
    ) {
        let mut state = FuzzState::new();
        state.execute(&opening, 0);
        prop_assert_eq!(state.committed_deposits, 1, "opening deposit {:?} reverted", opening);
        for (step, action) in actions.iter().enumerate() {
            state.execute(action, step + 1);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Redeeming a whole position never pays out more than was deposited
    #[test]
    fn fuzz_round_trip_never_profits(centi_btc in 1u128..500) {
        let mut state = FuzzState::new();
        let alice = state.actors[0];
        let amount = centi_btc * ONE_BTC / 100;
        let held = state.deployment.balance(state.deployment.collateral, alice);

        state.deployment.deposit(alice, amount).unwrap();
        let shares = state.deployment.shares(alice).unwrap();
        let receipt = state.deployment.withdraw(alice, shares).unwrap();

        prop_assert!(receipt.collateral_out <= amount);
        prop_assert!(receipt.collateral_out >= amount * 97 / 100);
        prop_assert_eq!(state.deployment.balance(state.deployment.collateral, alice), held - amount + receipt.collateral_out);
    }
}
