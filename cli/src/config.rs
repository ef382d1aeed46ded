//! Scenario files and path handling

use anyhow::{Context, Result};
use dango_common::Wad;
use dango_sim::DeploymentConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// One scripted vault action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Deposit whole collateral tokens
    Deposit { account: String, amount: Wad },
    /// Redeem shares; every share the account holds when omitted
    Withdraw {
        account: String,
        #[serde(default)]
        shares: Option<Wad>,
    },
    Transfer { from: String, to: String, shares: Wad },
    SetPrice { token: String, price: Wad },
    Rebalance {
        #[serde(default = "default_keeper")]
        account: String,
    },
    Harvest {
        #[serde(default = "default_keeper")]
        account: String,
    },
    /// Credit whole reward tokens to the vault
    Accrue { amount: Wad },
    Upgrade { version: String },
    SetExitFee { fee_bps: u16 },
    /// Fail the run unless leverage sits inside `[min, max]`
    ExpectLeverage { min: Wad, max: Wad },
}

fn default_keeper() -> String {
    "keeper".to_string()
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Deposit { .. } => "deposit",
            Action::Withdraw { .. } => "withdraw",
            Action::Transfer { .. } => "transfer",
            Action::SetPrice { .. } => "set_price",
            Action::Rebalance { .. } => "rebalance",
            Action::Harvest { .. } => "harvest",
            Action::Accrue { .. } => "accrue",
            Action::Upgrade { .. } => "upgrade",
            Action::SetExitFee { .. } => "set_exit_fee",
            Action::ExpectLeverage { .. } => "expect_leverage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    /// The step must revert
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub expect_failure: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioFile {
    #[serde(default)]
    pub deployment: DeploymentConfig,
    /// Genesis balances in whole tokens, by account then symbol
    #[serde(default)]
    pub accounts: BTreeMap<String, BTreeMap<String, Wad>>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Expand `~` and environment variables in a user-supplied path
pub fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).with_context(|| format!("Failed to expand path: {}", path))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

pub fn load_scenario(path: &str) -> Result<ScenarioFile> {
    let path = expand_path(path)?;
    let text = fs::read_to_string(&path).with_context(|| format!("Failed to read scenario: {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse scenario: {}", path.display()))
}

/// Deployment section of a scenario file, or the built-in default
pub fn load_deployment(path: Option<&str>) -> Result<DeploymentConfig> {
    match path {
        Some(path) => Ok(load_scenario(path)?.deployment),
        None => Ok(DeploymentConfig::default()),
    }
}

/// Write a starter scenario with the default deployment
pub fn write_template(path: &str) -> Result<PathBuf> {
    let path = expand_path(path)?;
    if path.exists() {
        anyhow::bail!("Refusing to overwrite existing file: {}", path.display());
    }
    let template = ScenarioFile {
        deployment: DeploymentConfig::default(),
        accounts: BTreeMap::from([(
            "alice".to_string(),
            BTreeMap::from([("WBTC".to_string(), "10".parse().context("template amount")?)]),
        )]),
        steps: vec![Step {
            action: Action::Deposit { account: "alice".to_string(), amount: "1".parse().context("template amount")? },
            expect_failure: false,
        }],
    };
    let text = toml::to_string_pretty(&template).context("Failed to serialize scenario")?;
    fs::write(&path, text).with_context(|| format!("Failed to write scenario: {}", path.display()))?;
    Ok(path)
}
