//! Genesis deployment
//!
//! Builds a complete world from a declarative `DeploymentConfig` in the same
//! order the production deployment runs: venues, then the vault logic, then
//! the adapter authorized for the proxy address predicted from the deployer
//! nonce, then the proxy itself, initialized in its deploying call.

use crate::chain::{account, Chain, Deployer, World};
use crate::dex::{Dex, DexConfig};
use crate::incentives::{Incentives, IncentivesConfig};
use crate::lending::{LendingPool, LendingPoolConfig, DEFAULT_LIQUIDATION_THRESHOLD_BPS, FLASH_PREMIUM_BPS};
use adapter_core::MoneyMarket;
use amm_model::DEFAULT_FEE_BPS;
use dango_common::{amount_of, value_of, Address, Ledger, ProtocolError, Rounding, Wad, WAD};
use dango_flashloan::{AdapterConfig, FlashloanAdapter};
use dango_proxy::{CallOutcome, UpgradeableProxy, VaultCall};
use dango_vault::{
    DepositReceipt, InitParams, LeverageVault, PositionSnapshot, RebalanceOutcome, VaultConfig, VaultLogic,
    WithdrawReceipt, DEFAULT_CAPACITY, DEFAULT_LOWER_LEVER_RATIO, DEFAULT_TARGET_LEVER_RATIO,
    DEFAULT_UPPER_LEVER_RATIO,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeployError {
    #[error("unknown token symbol '{0}'")]
    UnknownSymbol(String),
    #[error("duplicate token symbol '{0}'")]
    DuplicateSymbol(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

fn default_threshold() -> u16 {
    DEFAULT_LIQUIDATION_THRESHOLD_BPS
}

fn default_slippage() -> u16 {
    300
}

fn default_dex_fee() -> u16 {
    DEFAULT_FEE_BPS
}

fn default_flash_premium() -> u16 {
    FLASH_PREMIUM_BPS
}

fn default_target() -> Wad {
    Wad(DEFAULT_TARGET_LEVER_RATIO)
}

fn default_lower() -> Wad {
    Wad(DEFAULT_LOWER_LEVER_RATIO)
}

fn default_upper() -> Wad {
    Wad(DEFAULT_UPPER_LEVER_RATIO)
}

fn default_capacity() -> Wad {
    Wad(DEFAULT_CAPACITY)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenSpec {
    pub symbol: String,
    pub decimals: u8,
    /// Oracle price of one whole token
    pub price: Wad,
    #[serde(default = "default_threshold")]
    pub liquidation_threshold_bps: u16,
    /// Whole tokens supplied to the lending pool at genesis
    #[serde(default)]
    pub market_liquidity: Wad,
}

/// Exchange pair seeded at the oracle price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSpec {
    pub base: String,
    pub quote: String,
    /// Whole base tokens; the quote side is sized from oracle prices
    pub base_reserve: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewardsSpec {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterSpec {
    #[serde(default = "default_slippage")]
    pub slippage_bps: u16,
    /// Trade paths by symbol, first and last token being the pair
    pub paths: Vec<Vec<String>>,
    /// Version-2 adapter wiring; omitted for a version-1 adapter
    #[serde(default)]
    pub rewards: Option<RewardsSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultSpec {
    pub name: String,
    pub symbol: String,
    pub collateral: String,
    pub debt: String,
    #[serde(default = "default_target")]
    pub target: Wad,
    /// Constructor envelope
    #[serde(default = "default_lower")]
    pub lower: Wad,
    #[serde(default = "default_upper")]
    pub upper: Wad,
    /// Operative band set at initialization; the envelope when omitted
    #[serde(default)]
    pub band_lower: Option<Wad>,
    #[serde(default)]
    pub band_upper: Option<Wad>,
    #[serde(default = "default_capacity")]
    pub capacity: Wad,
    #[serde(default)]
    pub exit_fee_bps: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentConfig {
    pub tokens: Vec<TokenSpec>,
    #[serde(default)]
    pub pools: Vec<PoolSpec>,
    pub adapter: AdapterSpec,
    pub vault: VaultSpec,
    #[serde(default = "default_dex_fee")]
    pub dex_fee_bps: u16,
    #[serde(default = "default_flash_premium")]
    pub flash_premium_bps: u16,
}

impl Default for DeploymentConfig {
    /// WBTC 2x vault against USDC debt with WMATIC rewards
    fn default() -> Self {
        let token = |symbol: &str, decimals, price: u128, threshold, liquidity: u128| TokenSpec {
            symbol: symbol.to_string(),
            decimals,
            price: Wad(price * WAD),
            liquidation_threshold_bps: threshold,
            market_liquidity: Wad(liquidity * WAD),
        };
        let pool = |base: &str, quote: &str, reserve: u128| PoolSpec {
            base: base.to_string(),
            quote: quote.to_string(),
            base_reserve: Wad(reserve * WAD),
        };
        let path = |hops: &[&str]| hops.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            tokens: vec![
                token("USDC", 6, 1, 8_000, 50_000_000),
                token("WBTC", 8, 30_000, 7_500, 1_000),
                token("WETH", 18, 2_000, 8_000, 10_000),
                token("WMATIC", 18, 1, 6_500, 0),
            ],
            pools: vec![
                pool("WBTC", "USDC", 2_000),
                pool("WETH", "USDC", 20_000),
                pool("WBTC", "WETH", 500),
                pool("WMATIC", "USDC", 10_000_000),
            ],
            adapter: AdapterSpec {
                slippage_bps: default_slippage(),
                paths: vec![path(&["USDC", "WBTC"]), path(&["WBTC", "USDC"]), path(&["WMATIC", "USDC", "WBTC"])],
                rewards: Some(RewardsSpec { token: "WMATIC".to_string() }),
            },
            vault: VaultSpec {
                name: "WBTC 2x Fluid Leverage Index".to_string(),
                symbol: "dFLI-WBTC-2x".to_string(),
                collateral: "WBTC".to_string(),
                debt: "USDC".to_string(),
                target: default_target(),
                lower: default_lower(),
                upper: default_upper(),
                band_lower: None,
                band_upper: None,
                capacity: default_capacity(),
                exit_fee_bps: 0,
            },
            dex_fee_bps: DEFAULT_FEE_BPS,
            flash_premium_bps: FLASH_PREMIUM_BPS,
        }
    }
}

/// A deployed world plus the addresses needed to drive it
#[derive(Debug, Clone)]
pub struct Deployment {
    pub chain: Chain,
    pub admin: Address,
    pub fee_recipient: Address,
    pub vault: Address,
    pub adapter: Address,
    pub collateral: Address,
    pub debt: Address,
    tokens: BTreeMap<String, Address>,
    /// (base, quote) of every exchange pair
    pools: Vec<(Address, Address)>,
}

/// Genesis liquidity provider for the lending pool and exchange
pub fn genesis_provider() -> Address {
    account("genesis-liquidity")
}

fn resolve(tokens: &BTreeMap<String, Address>, symbol: &str) -> Result<Address, DeployError> {
    tokens
        .get(&symbol.to_ascii_uppercase())
        .copied()
        .ok_or_else(|| DeployError::UnknownSymbol(symbol.to_string()))
}

pub fn deploy(config: &DeploymentConfig) -> Result<Deployment, DeployError> {
    let mut deployer = Deployer::new(account("deployer"));
    let admin = deployer.address;
    let provider = genesis_provider();

    // Tokens
    let mut ledger = Ledger::new();
    let mut tokens = BTreeMap::new();
    for spec in &config.tokens {
        let key = spec.symbol.to_ascii_uppercase();
        if tokens.contains_key(&key) {
            return Err(DeployError::DuplicateSymbol(spec.symbol.clone()));
        }
        let address = deployer.next();
        ledger.register_token(address, &spec.symbol, spec.decimals)?;
        tokens.insert(key, address);
    }

    // Lending pool
    let mut lending = LendingPool::new(LendingPoolConfig {
        address: deployer.next(),
        addresses_provider: deployer.next(),
        data_provider: deployer.next(),
        flash_premium_bps: config.flash_premium_bps,
    });
    for spec in &config.tokens {
        let token = resolve(&tokens, &spec.symbol)?;
        lending.list_reserve(token, spec.price.raw(), spec.liquidation_threshold_bps)?;
        let liquidity = spec.market_liquidity.to_units(spec.decimals)?;
        if liquidity > 0 {
            ledger.mint(token, provider, liquidity)?;
            lending.supply(&mut ledger, provider, token, liquidity, provider)?;
        }
    }

    // Exchange
    let mut dex = Dex::new(DexConfig { address: deployer.next(), fee_bps: config.dex_fee_bps });
    let mut pools = Vec::with_capacity(config.pools.len());
    for spec in &config.pools {
        let base = resolve(&tokens, &spec.base)?;
        let quote = resolve(&tokens, &spec.quote)?;
        let base_amount = spec.base_reserve.to_units(ledger.decimals(base)?)?;
        let value = value_of(base_amount, lending.asset_price(base)?, ledger.decimals(base)?, Rounding::Down)?;
        let quote_amount = amount_of(value, lending.asset_price(quote)?, ledger.decimals(quote)?, Rounding::Down)?;
        ledger.mint(base, provider, base_amount)?;
        ledger.mint(quote, provider, quote_amount)?;
        dex.add_liquidity(&mut ledger, provider, base, base_amount, quote, quote_amount)?;
        pools.push((base, quote));
    }

    // Incentives
    let reward_token = match &config.adapter.rewards {
        Some(rewards) => Some(resolve(&tokens, &rewards.token)?),
        None => None,
    };
    let incentives = reward_token.map(|reward_token| {
        Incentives::new(IncentivesConfig { address: deployer.next(), reward_token, emission_manager: admin })
    });

    // Vault logic, then the adapter authorized for the proxy one nonce ahead
    let spec = &config.vault;
    let collateral = resolve(&tokens, &spec.collateral)?;
    let debt = resolve(&tokens, &spec.debt)?;
    let vault_config = VaultConfig::new(
        lending.addresses_provider(),
        lending.data_provider(),
        collateral,
        debt,
        spec.target.raw(),
        spec.lower.raw(),
        spec.upper.raw(),
    )?;
    let logic: Arc<dyn VaultLogic> = Arc::new(LeverageVault::new(vault_config));
    deployer.next();

    let proxy_address = deployer.predict(1);
    let adapter_address = deployer.next();
    let adapter_config = match (&incentives, reward_token) {
        (Some(controller), Some(reward_token)) => AdapterConfig::v2(
            lending.addresses_provider(),
            lending.data_provider(),
            dex.config().address,
            adapter_core::IncentivesController::address(controller),
            reward_token,
            config.adapter.slippage_bps,
            vec![proxy_address],
        ),
        _ => AdapterConfig::v1(
            lending.addresses_provider(),
            lending.data_provider(),
            dex.config().address,
            config.adapter.slippage_bps,
            vec![proxy_address],
        ),
    };
    let mut adapter = FlashloanAdapter::new(adapter_address, admin, adapter_config)?;
    for path in &config.adapter.paths {
        let hops = path.iter().map(|s| resolve(&tokens, s)).collect::<Result<Vec<_>, _>>()?;
        let (token_in, token_out) = match (hops.first(), hops.last()) {
            (Some(&token_in), Some(&token_out)) => (token_in, token_out),
            _ => return Err(ProtocolError::InvalidPath.into()),
        };
        adapter.add_trade_path(admin, token_in, token_out, &hops)?;
    }

    let mut world = World { ledger, lending, dex, incentives, adapter, vaults: BTreeMap::new() };

    let params = InitParams {
        name: spec.name.clone(),
        symbol: spec.symbol.clone(),
        flashloan_adapter: adapter_address,
        fee_recipient: admin,
        lower_bound: spec.band_lower.unwrap_or(spec.lower).raw(),
        upper_bound: spec.band_upper.unwrap_or(spec.upper).raw(),
        capacity: spec.capacity.raw(),
    };
    let deployed = deployer.next();
    let mut proxy =
        world.with_env(|env| UpgradeableProxy::deploy_and_initialize(deployed, logic, admin, env, params))?;
    if spec.exit_fee_bps > 0 {
        proxy.set_exit_fee(admin, spec.exit_fee_bps)?;
    }
    world.vaults.insert(deployed, proxy);
    if let Some(incentives) = world.incentives.as_mut() {
        incentives.set_claimer(admin, deployed, adapter_address)?;
    }

    info!(
        "deployed {} at {} (adapter {}, {} tokens, {} pools)",
        spec.symbol,
        deployed,
        adapter_address,
        tokens.len(),
        pools.len()
    );
    Ok(Deployment {
        chain: Chain::new(world, deployer),
        admin,
        fee_recipient: admin,
        vault: deployed,
        adapter: adapter_address,
        collateral,
        debt,
        tokens,
        pools,
    })
}

type Result<T, E = ProtocolError> = std::result::Result<T, E>;

impl Deployment {
    pub fn world(&self) -> &World {
        self.chain.world()
    }

    pub fn token(&self, symbol: &str) -> Result<Address, DeployError> {
        resolve(&self.tokens, symbol)
    }

    pub fn tokens(&self) -> impl Iterator<Item = (&String, &Address)> {
        self.tokens.iter()
    }

    pub fn decimals(&self, token: Address) -> Result<u8> {
        self.world().ledger.decimals(token)
    }

    pub fn balance(&self, token: Address, holder: Address) -> u128 {
        self.world().ledger.balance_of(token, holder)
    }

    pub fn shares(&self, holder: Address) -> Result<u128> {
        Ok(self.world().vault(self.vault)?.balance_of(holder))
    }

    pub fn proxy(&self) -> Result<&UpgradeableProxy> {
        self.world().vault(self.vault)
    }

    pub fn leverage(&self) -> Result<u128> {
        self.world().leverage(self.vault)
    }

    pub fn snapshot(&self) -> Result<PositionSnapshot> {
        let world = self.world();
        world.vault(self.vault)?.snapshot(world.view())
    }

    pub fn needs_rebalance(&self) -> Result<bool> {
        let world = self.world();
        world.vault(self.vault)?.needs_rebalance(world.view())
    }

    /// Mint `amount` native units of `token` to `holder`
    pub fn fund(&mut self, holder: Address, token: Address, amount: u128) -> Result<()> {
        self.chain.transact("fund", |world| world.ledger.mint(token, holder, amount))
    }

    /// Move the oracle and every exchange pair quoting `token`
    pub fn set_price(&mut self, token: Address, price: u128) -> Result<()> {
        let pools = self.pools.clone();
        self.chain.transact("set_price", |world| {
            world.lending.set_price(token, price)?;
            for (base, quote) in pools.into_iter().filter(|&(b, q)| b == token || q == token) {
                let base_price = world.lending.asset_price(base)?;
                let quote_price = world.lending.asset_price(quote)?;
                world.dex.reprice(&mut world.ledger, base, quote, base_price, quote_price)?;
            }
            Ok(())
        })
    }

    /// Credit liquidity-mining rewards to the vault
    pub fn accrue_rewards(&mut self, amount: u128) -> Result<()> {
        let vault = self.vault;
        self.chain.transact("accrue_rewards", |world| {
            let World { ledger, incentives, .. } = world;
            incentives
                .as_mut()
                .ok_or(ProtocolError::RewardsNotConfigured)?
                .accrue(ledger, vault, amount)
        })
    }

    /// Forward one call to the vault proxy as `sender`
    pub fn call(&mut self, sender: Address, call: VaultCall) -> Result<CallOutcome> {
        let vault = self.vault;
        self.chain
            .transact(call.name(), |world| world.with_vault(vault, |proxy, env| proxy.forward(env, sender, call)))
    }

    pub fn deposit(&mut self, sender: Address, amount: u128) -> Result<DepositReceipt> {
        match self.call(sender, VaultCall::Deposit { amount })? {
            CallOutcome::Deposit(receipt) => Ok(receipt),
            _ => Err(ProtocolError::CollaboratorMismatch),
        }
    }

    pub fn withdraw(&mut self, sender: Address, shares: u128) -> Result<WithdrawReceipt> {
        match self.call(sender, VaultCall::Withdraw { shares })? {
            CallOutcome::Withdraw(receipt) => Ok(receipt),
            _ => Err(ProtocolError::CollaboratorMismatch),
        }
    }

    pub fn rebalance(&mut self, sender: Address) -> Result<RebalanceOutcome> {
        match self.call(sender, VaultCall::Rebalance)? {
            CallOutcome::Rebalance(outcome) => Ok(outcome),
            _ => Err(ProtocolError::CollaboratorMismatch),
        }
    }

    /// Point the proxy at a fresh logic instance reporting `version`
    pub fn upgrade(&mut self, caller: Address, version: &str) -> Result<()> {
        let vault = self.vault;
        self.chain.transact("upgrade", |world| {
            let proxy = world.vaults.get_mut(&vault).ok_or(ProtocolError::UnknownVault(vault))?;
            let config = proxy.logic().config().clone();
            proxy.upgrade_to(caller, Arc::new(LeverageVault::with_version(config, version)))
        })
    }
}
