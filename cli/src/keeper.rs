//! Keeper loop over a simulated price path

use anyhow::{Context, Result};
use dango_common::{Address, Wad};
use dango_sim::Deployment;
use dango_vault::RebalanceOutcome;
use log::{info, warn};
use serde::Serialize;

/// One oracle move and the keeper's response to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeeperTick {
    pub price: Wad,
    pub leverage_before: Wad,
    pub leverage_after: Wad,
    pub rebalanced: bool,
    /// Set when a needed rebalance reverted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Move the collateral price along `prices`, rebalancing whenever the vault
/// leaves its band
pub fn run(deployment: &mut Deployment, keeper: Address, prices: &[Wad]) -> Result<Vec<KeeperTick>> {
    let collateral = deployment.collateral;
    let mut ticks = Vec::with_capacity(prices.len());
    for &price in prices {
        deployment.set_price(collateral, price.raw()).with_context(|| format!("Failed to set price {}", price))?;
        let leverage_before = Wad(deployment.leverage()?);
        let mut tick = KeeperTick {
            price,
            leverage_before,
            leverage_after: leverage_before,
            rebalanced: false,
            error: None,
        };
        if deployment.needs_rebalance()? {
            match deployment.rebalance(keeper) {
                Ok(RebalanceOutcome::Rebalanced { after, .. }) => {
                    tick.leverage_after = Wad(after);
                    tick.rebalanced = true;
                    info!("price {}: rebalanced {} -> {}", price, leverage_before, tick.leverage_after);
                }
                Ok(RebalanceOutcome::Skipped { .. }) => {}
                Err(e) => {
                    warn!("price {}: rebalance reverted: {}", price, e);
                    tick.error = Some(e.to_string());
                }
            }
        }
        ticks.push(tick);
    }
    Ok(ticks)
}
