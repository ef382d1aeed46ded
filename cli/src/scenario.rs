//! Scripted scenario runner
//!
//! Deploys a fresh world, funds the named accounts and replays the steps in
//! order. Every step is one chain transaction; a failed step is rolled back
//! and aborts the run unless it was marked `expect_failure`.

use crate::config::{Action, ScenarioFile, Step};
use anyhow::{bail, Context, Result};
use dango_common::{Address, ProtocolError, Wad};
use dango_proxy::{CallOutcome, VaultCall};
use dango_sim::{account, deploy, Deployment};
use dango_vault::PositionSnapshot;
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    Call { outcome: CallOutcome },
    PriceSet { token: String, price: Wad },
    Accrued { amount: u128 },
    Upgraded { version: String },
    Checked { leverage: Wad },
    Reverted { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub action: &'static str,
    pub outcome: StepOutcome,
    pub leverage: Wad,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub vault: Address,
    pub symbol: String,
    pub steps: Vec<StepReport>,
    pub final_position: PositionSnapshot,
    pub balances: BTreeMap<String, BTreeMap<String, u128>>,
}

pub struct Scenario {
    deployment: Deployment,
    accounts: BTreeMap<String, Address>,
}

impl Scenario {
    pub fn deploy(file: &ScenarioFile) -> Result<Self> {
        let deployment = deploy(&file.deployment).context("Deployment failed")?;
        let mut scenario = Self { deployment, accounts: BTreeMap::new() };
        for (name, holdings) in &file.accounts {
            let holder = scenario.address(name);
            for (symbol, amount) in holdings {
                let token = scenario.deployment.token(symbol)?;
                let units = amount.to_units(scenario.deployment.decimals(token)?)?;
                scenario.deployment.fund(holder, token, units)?;
                debug!("funded {} with {} {}", name, amount, symbol);
            }
        }
        Ok(scenario)
    }

    /// Address of a named account; `admin` is the deployer
    pub fn address(&mut self, name: &str) -> Address {
        if name == "admin" {
            return self.deployment.admin;
        }
        *self.accounts.entry(name.to_string()).or_insert_with(|| account(name))
    }

    fn apply(&mut self, action: &Action) -> Result<StepOutcome> {
        let outcome = match action {
            Action::Deposit { account, amount } => {
                let sender = self.address(account);
                let units = amount.to_units(self.deployment.decimals(self.deployment.collateral)?)?;
                self.call(sender, VaultCall::Deposit { amount: units })?
            }
            Action::Withdraw { account, shares } => {
                let sender = self.address(account);
                let shares = match shares {
                    Some(shares) => shares.raw(),
                    None => self.deployment.shares(sender)?,
                };
                self.call(sender, VaultCall::Withdraw { shares })?
            }
            Action::Transfer { from, to, shares } => {
                let sender = self.address(from);
                let to = self.address(to);
                self.call(sender, VaultCall::Transfer { to, shares: shares.raw() })?
            }
            Action::Rebalance { account } => {
                let sender = self.address(account);
                self.call(sender, VaultCall::Rebalance)?
            }
            Action::Harvest { account } => {
                let sender = self.address(account);
                self.call(sender, VaultCall::Harvest)?
            }
            Action::SetExitFee { fee_bps } => {
                let sender = self.deployment.fee_recipient;
                self.call(sender, VaultCall::SetExitFee { fee_bps: *fee_bps })?
            }
            Action::SetPrice { token, price } => {
                let address = self.deployment.token(token)?;
                self.deployment.set_price(address, price.raw())?;
                StepOutcome::PriceSet { token: token.clone(), price: *price }
            }
            Action::Accrue { amount } => {
                let reward = self
                    .deployment
                    .world()
                    .adapter
                    .rewards()
                    .ok_or(ProtocolError::RewardsNotConfigured)?
                    .reward_token;
                let units = amount.to_units(self.deployment.decimals(reward)?)?;
                self.deployment.accrue_rewards(units)?;
                StepOutcome::Accrued { amount: units }
            }
            Action::Upgrade { version } => {
                let admin = self.deployment.admin;
                self.deployment.upgrade(admin, version)?;
                StepOutcome::Upgraded { version: version.clone() }
            }
            Action::ExpectLeverage { .. } => StepOutcome::Checked { leverage: Wad(self.deployment.leverage()?) },
        };
        Ok(outcome)
    }

    fn call(&mut self, sender: Address, call: VaultCall) -> Result<StepOutcome> {
        let outcome = self.deployment.call(sender, call)?;
        Ok(StepOutcome::Call { outcome })
    }

    /// Run one step, enforcing its expectation
    pub fn step(&mut self, index: usize, step: &Step) -> Result<StepReport> {
        let action = step.action.name();
        let outcome = match (self.apply(&step.action), step.expect_failure) {
            (Ok(outcome), false) => outcome,
            (Err(e), true) => StepOutcome::Reverted { error: e.to_string() },
            (Ok(_), true) => bail!("step {} ({}) succeeded but was expected to fail", index, action),
            (Err(e), false) => return Err(e.context(format!("step {} ({}) failed", index, action))),
        };
        let leverage = Wad(self.deployment.leverage()?);
        if let Action::ExpectLeverage { min, max } = &step.action {
            if leverage < *min || leverage > *max {
                bail!("step {}: leverage {} outside [{}, {}]", index, leverage, min, max);
            }
        }
        info!("step {} {} -> leverage {}", index, action, leverage);
        Ok(StepReport { index, action, outcome, leverage })
    }

    pub fn report(&self, steps: Vec<StepReport>) -> Result<ScenarioReport> {
        let proxy = self.deployment.proxy()?;
        let mut balances = BTreeMap::new();
        for (name, &holder) in &self.accounts {
            let mut row = BTreeMap::new();
            for (symbol, &token) in self.deployment.tokens() {
                let balance = self.deployment.balance(token, holder);
                if balance > 0 {
                    row.insert(symbol.clone(), balance);
                }
            }
            let shares = proxy.balance_of(holder);
            if shares > 0 {
                row.insert(proxy.symbol().to_string(), shares);
            }
            balances.insert(name.clone(), row);
        }
        Ok(ScenarioReport {
            vault: self.deployment.vault,
            symbol: proxy.symbol().to_string(),
            steps,
            final_position: self.deployment.snapshot()?,
            balances,
        })
    }
}

pub fn run(file: &ScenarioFile) -> Result<ScenarioReport> {
    let mut scenario = Scenario::deploy(file)?;
    let steps = file
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| scenario.step(i, step))
        .collect::<Result<Vec<_>>>()?;
    scenario.report(steps)
}
