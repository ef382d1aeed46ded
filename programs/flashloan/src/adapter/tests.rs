use super::*;
use crate::cycle::Direction;
use adapter_core::{FlashLoan, FlashLoanReceiver, ReserveBalance};
use dango_common::{amount_of, apply_bps, value_of, Ledger, Rounding, WAD};
use std::collections::{BTreeMap, BTreeSet};

const USDC: Address = Address::from_low_u64(1);
const WBTC: Address = Address::from_low_u64(2);
const WMATIC: Address = Address::from_low_u64(3);
const MARKET: Address = Address::from_low_u64(900);
const PROVIDER: Address = Address::from_low_u64(901);
const DATA: Address = Address::from_low_u64(902);
const ROUTER: Address = Address::from_low_u64(903);
const INCENTIVES: Address = Address::from_low_u64(904);
const ADAPTER: Address = Address::from_low_u64(910);
const ADMIN: Address = Address::from_low_u64(911);
const VAULT: Address = Address::from_low_u64(500);
const STRANGER: Address = Address::from_low_u64(666);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Honest,
    DoubleCallback,
    ForeignInitiator,
    SkipCallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MockMarket {
    prices: BTreeMap<Address, u128>,
    positions: BTreeMap<(Address, Address), ReserveBalance>,
    delegations: BTreeSet<(Address, Address)>,
    behavior: Behavior,
    provider: Address,
}

impl MockMarket {
    fn new() -> Self {
        let mut prices = BTreeMap::new();
        prices.insert(USDC, WAD);
        prices.insert(WBTC, 30_000 * WAD);
        prices.insert(WMATIC, WAD);
        Self {
            prices,
            positions: BTreeMap::new(),
            delegations: BTreeSet::new(),
            behavior: Behavior::Honest,
            provider: PROVIDER,
        }
    }

    fn slot(&mut self, user: Address, asset: Address) -> &mut ReserveBalance {
        self.positions.entry((user, asset)).or_default()
    }

    fn may_act(&self, owner: Address, caller: Address) -> Result<()> {
        if owner == caller || self.delegations.contains(&(owner, caller)) {
            Ok(())
        } else {
            Err(ProtocolError::Unauthorized)
        }
    }
}

impl MoneyMarket for MockMarket {
    fn address(&self) -> Address {
        MARKET
    }
    fn addresses_provider(&self) -> Address {
        self.provider
    }
    fn data_provider(&self) -> Address {
        DATA
    }
    fn flash_premium_bps(&self) -> u16 {
        9
    }
    fn asset_price(&self, asset: Address) -> Result<u128> {
        self.prices.get(&asset).copied().ok_or(ProtocolError::PriceUnavailable(asset))
    }
    fn position_of(&self, user: Address, asset: Address) -> ReserveBalance {
        self.positions.get(&(user, asset)).copied().unwrap_or_default()
    }
    fn approve_delegation(&mut self, delegator: Address, delegatee: Address, approved: bool) {
        if approved {
            self.delegations.insert((delegator, delegatee));
        } else {
            self.delegations.remove(&(delegator, delegatee));
        }
    }
    fn supply(&mut self, ledger: &mut Ledger, caller: Address, asset: Address, amount: u128, on_behalf_of: Address) -> Result<()> {
        ledger.transfer(asset, caller, MARKET, amount)?;
        self.slot(on_behalf_of, asset).supplied += amount;
        Ok(())
    }
    fn withdraw(&mut self, ledger: &mut Ledger, caller: Address, asset: Address, amount: u128, owner: Address, to: Address) -> Result<u128> {
        self.may_act(owner, caller)?;
        let slot = self.slot(owner, asset);
        slot.supplied = slot.supplied.checked_sub(amount).ok_or(ProtocolError::InsufficientBalance)?;
        ledger.transfer(asset, MARKET, to, amount)?;
        Ok(amount)
    }
    fn borrow(&mut self, ledger: &mut Ledger, caller: Address, asset: Address, amount: u128, on_behalf_of: Address) -> Result<()> {
        self.may_act(on_behalf_of, caller)?;
        self.slot(on_behalf_of, asset).borrowed += amount;
        ledger.transfer(asset, MARKET, caller, amount)
    }
    fn repay(&mut self, ledger: &mut Ledger, caller: Address, asset: Address, amount: u128, on_behalf_of: Address) -> Result<u128> {
        let owed = self.position_of(on_behalf_of, asset).borrowed;
        let paid = amount.min(owed);
        ledger.transfer(asset, caller, MARKET, paid)?;
        self.slot(on_behalf_of, asset).borrowed -= paid;
        Ok(paid)
    }
    fn flash_loan(
        &mut self,
        ledger: &mut Ledger,
        caller: Address,
        receiver: &mut dyn FlashLoanReceiver,
        asset: Address,
        amount: u128,
    ) -> Result<()> {
        if self.behavior == Behavior::SkipCallback {
            return Ok(());
        }
        let premium = apply_bps(amount, 9, Rounding::Down)?;
        ledger.transfer(asset, MARKET, receiver.address(), amount)?;
        let initiator = if self.behavior == Behavior::ForeignInitiator { STRANGER } else { caller };
        let loan = FlashLoan { asset, amount, premium, initiator };
        match self.behavior {
            Behavior::DoubleCallback => {
                receiver.execute_operation(self, ledger, &loan)?;
                receiver.execute_operation(self, ledger, &loan)?;
            }
            _ => receiver.execute_operation(self, ledger, &loan)?,
        }
        ledger
            .transfer(asset, receiver.address(), MARKET, amount + premium)
            .map_err(|_| ProtocolError::FlashLoanNotRepaid)
    }
}

/// Quotes at oracle prices less a fixed haircut
struct MockRouter {
    prices: BTreeMap<Address, u128>,
    decimals: BTreeMap<Address, u8>,
    haircut_bps: u16,
}

impl MockRouter {
    fn new(haircut_bps: u16) -> Self {
        let market = MockMarket::new();
        let decimals = [(USDC, 6), (WBTC, 8), (WMATIC, 18)].into_iter().collect();
        Self { prices: market.prices, decimals, haircut_bps }
    }

    fn convert(&self, amount: u128, from: Address, to: Address) -> Result<u128> {
        let value = value_of(amount, self.prices[&from], self.decimals[&from], Rounding::Down)?;
        amount_of(value, self.prices[&to], self.decimals[&to], Rounding::Down)
    }
}

impl SwapRouter for MockRouter {
    fn address(&self) -> Address {
        ROUTER
    }
    fn get_amounts_out(&self, amount_in: u128, path: &[Address]) -> Result<Vec<u128>> {
        let gross = self.convert(amount_in, path[0], path[path.len() - 1])?;
        let out = gross - apply_bps(gross, self.haircut_bps, Rounding::Down)?;
        let mut amounts = vec![0; path.len()];
        amounts[0] = amount_in;
        amounts[path.len() - 1] = out;
        Ok(amounts)
    }
    fn get_amounts_in(&self, amount_out: u128, path: &[Address]) -> Result<Vec<u128>> {
        let amount_in = self.convert(amount_out, path[path.len() - 1], path[0])?;
        let mut amounts = vec![0; path.len()];
        amounts[0] = amount_in;
        amounts[path.len() - 1] = amount_out;
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
        let out = amounts[amounts.len() - 1];
        if out < min_amount_out {
            return Err(ProtocolError::SlippageExceeded);
        }
        ledger.transfer(path[0], caller, ROUTER, amount_in)?;
        ledger.transfer(path[path.len() - 1], ROUTER, to, out)?;
        Ok(amounts)
    }
}

struct MockIncentives {
    accrued: BTreeMap<Address, u128>,
}

impl IncentivesController for MockIncentives {
    fn address(&self) -> Address {
        INCENTIVES
    }
    fn reward_token(&self) -> Address {
        WMATIC
    }
    fn rewards_balance(&self, user: Address) -> u128 {
        self.accrued.get(&user).copied().unwrap_or(0)
    }
    fn claim_rewards(&mut self, ledger: &mut Ledger, caller: Address, user: Address, to: Address) -> Result<u128> {
        if caller != ADAPTER && caller != user {
            return Err(ProtocolError::Unauthorized);
        }
        let amount = self.accrued.remove(&user).unwrap_or(0);
        ledger.transfer(WMATIC, INCENTIVES, to, amount)?;
        Ok(amount)
    }
}

struct Fixture {
    ledger: Ledger,
    market: MockMarket,
    router: MockRouter,
    adapter: FlashloanAdapter,
}

impl Fixture {
    /// Vault holding 2 WBTC supplied against 30,000 USDC of debt (1.5x)
    fn new(config: AdapterConfig) -> Self {
        let mut ledger = Ledger::new();
        ledger.register_token(USDC, "USDC", 6).unwrap();
        ledger.register_token(WBTC, "WBTC", 8).unwrap();
        ledger.register_token(WMATIC, "WMATIC", 18).unwrap();
        for (token, amount) in [(USDC, 10_000_000 * 1_000_000), (WBTC, 1_000 * 100_000_000), (WMATIC, 1_000_000 * WAD)] {
            ledger.mint(token, MARKET, amount).unwrap();
            ledger.mint(token, ROUTER, amount).unwrap();
        }
        ledger.mint(WBTC, VAULT, 200_000_000).unwrap();

        let mut market = MockMarket::new();
        market.supply(&mut ledger, VAULT, WBTC, 200_000_000, VAULT).unwrap();
        market.borrow(&mut ledger, VAULT, USDC, 30_000 * 1_000_000, VAULT).unwrap();
        ledger.burn(USDC, VAULT, 30_000 * 1_000_000).unwrap();
        market.approve_delegation(VAULT, ADAPTER, true);

        let mut adapter = FlashloanAdapter::new(ADAPTER, ADMIN, config).unwrap();
        adapter.add_trade_path(ADMIN, USDC, WBTC, &[USDC, WBTC]).unwrap();
        adapter.add_trade_path(ADMIN, WBTC, USDC, &[WBTC, USDC]).unwrap();
        adapter.add_trade_path(ADMIN, WMATIC, WBTC, &[WMATIC, USDC, WBTC]).unwrap();

        Self { ledger, market, router: MockRouter::new(30), adapter }
    }

    fn v1() -> Self {
        Self::new(AdapterConfig::v1(PROVIDER, DATA, ROUTER, 300, vec![VAULT]))
    }

    fn execute(&mut self, caller: Address, request: FlashloanRequest) -> Result<FlashloanReport> {
        let mut venues = Venues::new(&mut self.ledger, &mut self.market, &mut self.router);
        self.adapter.execute_flashloan(&mut venues, caller, request)
    }
}

fn lever_up(amount: u128) -> FlashloanRequest {
    FlashloanRequest {
        vault: VAULT,
        borrow_token: USDC,
        target_token: WBTC,
        borrow_amount: amount,
        direction: Direction::LeverUp,
    }
}

fn lever_down(amount: u128) -> FlashloanRequest {
    FlashloanRequest {
        vault: VAULT,
        borrow_token: WBTC,
        target_token: USDC,
        borrow_amount: amount,
        direction: Direction::LeverDown,
    }
}

#[test]
fn test_lever_up_cycle() {
    let mut fx = Fixture::v1();
    let market_usdc = fx.ledger.balance_of(USDC, MARKET);

    let report = fx.execute(VAULT, lever_up(30_000 * 1_000_000)).unwrap();

    assert_eq!(report.direction, Direction::LeverUp);
    assert_eq!(report.premium, 27_000_000);
    assert_eq!(report.swapped_out, 99_700_000);

    let pos_btc = fx.market.position_of(VAULT, WBTC);
    let pos_usd = fx.market.position_of(VAULT, USDC);
    assert_eq!(pos_btc.supplied, 200_000_000 + 99_700_000);
    assert_eq!(pos_usd.borrowed, 30_000 * 1_000_000 + 30_027_000_000);

    // Adapter ends flat; the premium is carried as vault debt
    assert_eq!(fx.ledger.balance_of(USDC, ADAPTER), 0);
    assert_eq!(fx.ledger.balance_of(WBTC, ADAPTER), 0);
    assert_eq!(fx.ledger.balance_of(USDC, MARKET), market_usdc - 30_000 * 1_000_000);
    assert!(!fx.adapter.entered);
}

#[test]
fn test_lever_down_cycle() {
    let mut fx = Fixture::v1();

    let report = fx.execute(VAULT, lever_down(50_000_000)).unwrap();

    assert_eq!(report.premium, 45_000);
    assert_eq!(report.swapped_out, 14_955_000_000);
    assert_eq!(report.debt_repaid, 14_955_000_000);
    assert_eq!(report.leftover, 0);

    assert_eq!(fx.market.position_of(VAULT, USDC).borrowed, 15_045_000_000);
    assert_eq!(fx.market.position_of(VAULT, WBTC).supplied, 200_000_000 - 50_045_000);
    assert_eq!(fx.ledger.balance_of(WBTC, ADAPTER), 0);
}

#[test]
fn test_lever_down_leftover_goes_to_vault() {
    let mut fx = Fixture::v1();

    // 1.5 WBTC swaps to ~44,865 USDC against 30,000 of debt
    let report = fx.execute(VAULT, lever_down(150_000_000)).unwrap();

    assert_eq!(report.debt_repaid, 30_000 * 1_000_000);
    assert_eq!(report.leftover, report.swapped_out - 30_000 * 1_000_000);
    assert_eq!(fx.ledger.balance_of(USDC, VAULT), report.leftover);
    assert_eq!(fx.market.position_of(VAULT, USDC).borrowed, 0);
}

#[test]
fn test_unauthorized_caller_leaves_market_untouched() {
    let mut fx = Fixture::v1();
    let market_before = fx.market.clone();
    let ledger_before = fx.ledger.clone();

    let mut request = lever_up(1_000_000);
    request.vault = STRANGER;
    assert_eq!(fx.execute(STRANGER, request), Err(ProtocolError::UnauthorizedCaller));

    assert_eq!(fx.market, market_before);
    assert_eq!(fx.ledger, ledger_before);
}

#[test]
fn test_caller_must_be_the_vault() {
    let mut fx = Fixture::v1();
    assert_eq!(
        fx.execute(STRANGER, lever_up(1_000_000)),
        Err(ProtocolError::UnauthorizedCaller)
    );
}

#[test]
fn test_removed_vault_rejected() {
    let mut fx = Fixture::v1();
    fx.adapter.remove_authorized_vault(ADMIN, VAULT).unwrap();
    assert!(!fx.adapter.is_authorized(VAULT));
    assert_eq!(fx.execute(VAULT, lever_up(1_000_000)), Err(ProtocolError::UnauthorizedCaller));
}

#[test]
fn test_zero_amount_rejected() {
    let mut fx = Fixture::v1();
    assert_eq!(fx.execute(VAULT, lever_up(0)), Err(ProtocolError::ZeroAmount));
}

#[test]
fn test_route_not_found() {
    let mut fx = Fixture::v1();
    let mut request = lever_up(1_000_000);
    request.target_token = WMATIC;
    assert_eq!(
        fx.execute(VAULT, request),
        Err(ProtocolError::RouteNotFound { token_in: USDC, token_out: WMATIC })
    );
    assert!(!fx.adapter.entered);
}

#[test]
fn test_bad_fill_is_repayment_shortfall() {
    let mut fx = Fixture::v1();
    fx.router.haircut_bps = 500;
    match fx.execute(VAULT, lever_up(30_000 * 1_000_000)) {
        Err(ProtocolError::RepaymentShortfall { required, available }) => {
            assert_eq!(required, 97_000_000);
            assert_eq!(available, 95_000_000);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_draw_back_shortfall() {
    let mut fx = Fixture::v1();
    // Borrow more collateral than the vault can give back
    let result = fx.execute(VAULT, lever_down(250_000_000));
    assert!(matches!(result, Err(ProtocolError::RepaymentShortfall { .. })));
}

#[test]
fn test_duplicate_callback_rejected() {
    let mut fx = Fixture::v1();
    fx.market.behavior = Behavior::DoubleCallback;
    assert_eq!(fx.execute(VAULT, lever_up(1_000_000)), Err(ProtocolError::Reentrancy));
    assert!(!fx.adapter.entered);
}

#[test]
fn test_foreign_callback_rejected() {
    let mut fx = Fixture::v1();
    fx.market.behavior = Behavior::ForeignInitiator;
    assert_eq!(fx.execute(VAULT, lever_up(1_000_000)), Err(ProtocolError::UnauthorizedCaller));
}

#[test]
fn test_missing_callback_detected() {
    let mut fx = Fixture::v1();
    fx.market.behavior = Behavior::SkipCallback;
    assert_eq!(fx.execute(VAULT, lever_up(1_000_000)), Err(ProtocolError::CollaboratorMismatch));
}

#[test]
fn test_nested_entry_rejected() {
    let mut fx = Fixture::v1();
    fx.adapter.entered = true;
    assert_eq!(fx.execute(VAULT, lever_up(1_000_000)), Err(ProtocolError::Reentrancy));
}

#[test]
fn test_wrong_market_rejected() {
    let mut fx = Fixture::v1();
    fx.market.provider = STRANGER;
    assert_eq!(fx.execute(VAULT, lever_up(1_000_000)), Err(ProtocolError::CollaboratorMismatch));
}

#[test]
fn test_admin_only_operations() {
    let mut fx = Fixture::v1();
    assert_eq!(
        fx.adapter.add_trade_path(STRANGER, USDC, WBTC, &[USDC, WBTC]),
        Err(ProtocolError::Unauthorized)
    );
    assert_eq!(fx.adapter.add_authorized_vault(STRANGER, STRANGER), Err(ProtocolError::Unauthorized));
    assert_eq!(fx.adapter.set_slippage_bps(STRANGER, 100), Err(ProtocolError::Unauthorized));
    assert_eq!(fx.adapter.transfer_admin(STRANGER, STRANGER), Err(ProtocolError::Unauthorized));

    assert_eq!(fx.adapter.add_trade_path(ADMIN, USDC, USDC, &[USDC]), Err(ProtocolError::InvalidPath));
    assert_eq!(fx.adapter.set_slippage_bps(ADMIN, 10_001), Err(ProtocolError::InvalidBounds));

    fx.adapter.transfer_admin(ADMIN, STRANGER).unwrap();
    assert_eq!(fx.adapter.admin(), STRANGER);
    assert_eq!(fx.adapter.add_authorized_vault(ADMIN, VAULT), Err(ProtocolError::Unauthorized));
}

#[test]
fn test_config_versions() {
    let v1 = AdapterConfig::v1(PROVIDER, DATA, ROUTER, 300, vec![VAULT]);
    let v2 = AdapterConfig::v2(PROVIDER, DATA, ROUTER, INCENTIVES, WMATIC, 300, vec![VAULT]);
    assert_eq!(v1.version(), ConfigVersion::V1);
    assert_eq!(v2.version(), ConfigVersion::V2);
    for config in [v1.clone(), v2] {
        let adapter = FlashloanAdapter::new(ADAPTER, ADMIN, config.clone()).unwrap();
        assert_eq!(adapter.config_version(), config.version());
        assert_eq!(adapter.rewards(), config.rewards);
    }
    assert!(FlashloanAdapter::new(ADAPTER, ADMIN, AdapterConfig { slippage_bps: 20_000, ..v1 }).is_err());
}

#[test]
fn test_harvest_requires_rewards_config() {
    let mut fx = Fixture::v1();
    let mut incentives = MockIncentives { accrued: BTreeMap::new() };
    let mut venues = Venues::new(&mut fx.ledger, &mut fx.market, &mut fx.router);
    assert_eq!(
        fx.adapter.harvest_rewards(&mut venues, &mut incentives, VAULT, VAULT, WBTC),
        Err(ProtocolError::RewardsNotConfigured)
    );
}

#[test]
fn test_harvest_swaps_rewards_into_collateral() {
    let mut fx = Fixture::new(AdapterConfig::v2(PROVIDER, DATA, ROUTER, INCENTIVES, WMATIC, 300, vec![VAULT]));
    fx.ledger.mint(WMATIC, INCENTIVES, 3_000 * WAD).unwrap();
    let mut incentives = MockIncentives { accrued: [(VAULT, 3_000 * WAD)].into_iter().collect() };
    let supplied_before = fx.market.position_of(VAULT, WBTC).supplied;

    let mut venues = Venues::new(&mut fx.ledger, &mut fx.market, &mut fx.router);
    let report = fx.adapter.harvest_rewards(&mut venues, &mut incentives, VAULT, VAULT, WBTC).unwrap();

    // 3,000 WMATIC at $1 = 0.1 WBTC, less the 30 bps haircut
    assert_eq!(report.claimed, 3_000 * WAD);
    assert_eq!(report.supplied, 9_970_000);
    assert_eq!(fx.market.position_of(VAULT, WBTC).supplied, supplied_before + 9_970_000);
    assert_eq!(incentives.rewards_balance(VAULT), 0);
}

#[test]
fn test_harvest_with_nothing_accrued() {
    let mut fx = Fixture::new(AdapterConfig::v2(PROVIDER, DATA, ROUTER, INCENTIVES, WMATIC, 300, vec![VAULT]));
    let mut incentives = MockIncentives { accrued: BTreeMap::new() };
    let mut venues = Venues::new(&mut fx.ledger, &mut fx.market, &mut fx.router);
    let report = fx.adapter.harvest_rewards(&mut venues, &mut incentives, VAULT, VAULT, WBTC).unwrap();
    assert_eq!(report, HarvestReport::default());
}
