//! Terminal and JSON rendering

use crate::keeper::KeeperTick;
use crate::scenario::{ScenarioReport, StepOutcome};
use anyhow::Result;
use colored::Colorize;
use dango_common::Wad;
use dango_proxy::CallOutcome;
use dango_sim::Deployment;
use dango_vault::{PositionSnapshot, RebalanceOutcome};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn leverage(value: Wad) -> String {
    format!("{}x", value)
}

fn describe(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Call { outcome } => match outcome {
            CallOutcome::Deposit(r) => format!("minted {} shares", Wad(r.shares_minted)),
            CallOutcome::Withdraw(r) => format!(
                "burned {} shares, paid out {} collateral, repaid {} debt",
                Wad(r.shares_burned),
                r.collateral_out,
                r.debt_repaid
            ),
            CallOutcome::Rebalance(RebalanceOutcome::Skipped { .. }) => "within band".to_string(),
            CallOutcome::Rebalance(RebalanceOutcome::Rebalanced { before, after, report }) => format!(
                "{} -> {} ({:?}, borrowed {})",
                leverage(Wad(*before)),
                leverage(Wad(*after)),
                report.direction,
                report.borrowed
            ),
            CallOutcome::Harvest(r) => format!("claimed {}, supplied {}", r.claimed, r.supplied),
            CallOutcome::Transfer => "shares transferred".to_string(),
            CallOutcome::SetExitFee => "exit fee updated".to_string(),
        },
        StepOutcome::PriceSet { token, price } => format!("{} = {}", token, price),
        StepOutcome::Accrued { amount } => format!("{} reward units accrued", amount),
        StepOutcome::Upgraded { version } => format!("logic {}", version),
        StepOutcome::Checked { leverage: l } => format!("leverage {}", leverage(*l)),
        StepOutcome::Reverted { error } => format!("reverted as expected: {}", error),
    }
}

pub fn print_position(position: &PositionSnapshot) {
    println!("\n{}", "Position:".bright_yellow());
    println!("  {} {}", "Collateral:".bright_cyan(), position.collateral_amount);
    println!("  {} {}", "Debt:".bright_cyan(), position.debt_amount);
    println!("  {} {}", "Shares:".bright_cyan(), Wad(position.total_shares));
    println!("  {} {}", "Equity:".bright_cyan(), Wad(position.equity_value));
    println!("  {} {}", "Leverage:".bright_cyan(), leverage(Wad(position.leverage)));
}

pub fn print_scenario(report: &ScenarioReport) {
    println!("{}", format!("=== Scenario: {} ===", report.symbol).bright_green().bold());
    println!("{} {}\n", "Vault:".bright_cyan(), report.vault);
    for step in &report.steps {
        let mark = match step.outcome {
            StepOutcome::Reverted { .. } => "✗".bright_yellow(),
            _ => "✓".bright_green(),
        };
        println!(
            "{} [{:>2}] {:<16} {:<10} {}",
            mark,
            step.index,
            step.action,
            leverage(step.leverage),
            describe(&step.outcome).dimmed()
        );
    }
    print_position(&report.final_position);
    if !report.balances.is_empty() {
        println!("\n{}", "Balances:".bright_yellow());
        for (name, row) in &report.balances {
            let holdings = row.iter().map(|(k, v)| format!("{} {}", v, k)).collect::<Vec<_>>().join(", ");
            println!("  {} {}", format!("{}:", name).bright_cyan(), holdings);
        }
    }
}

pub fn print_keeper(ticks: &[KeeperTick]) {
    println!("{}", "=== Keeper Run ===".bright_green().bold());
    let mut rebalances = 0;
    for tick in ticks {
        let line = format!(
            "price {:<12} {:<10} -> {:<10}",
            tick.price.to_string(),
            leverage(tick.leverage_before),
            leverage(tick.leverage_after)
        );
        match (&tick.error, tick.rebalanced) {
            (Some(e), _) => println!("{} {} {}", "✗".bright_red(), line, e.red()),
            (None, true) => {
                rebalances += 1;
                println!("{} {} {}", "✓".bright_green(), line, "rebalanced".bright_green());
            }
            (None, false) => println!("{} {}", "·".dimmed(), line.dimmed()),
        }
    }
    println!("\n{} {} of {} ticks", "Rebalances:".bright_cyan(), rebalances, ticks.len());
}

pub fn print_deployment(deployment: &Deployment) -> Result<()> {
    let world = deployment.world();
    let proxy = deployment.proxy()?;
    let storage = proxy.storage();
    println!("{}", format!("=== {} ({}) ===", proxy.name(), proxy.symbol()).bright_green().bold());
    println!("{} {}", "Proxy:".bright_cyan(), proxy.address());
    println!("{} {}", "Logic:".bright_cyan(), proxy.implementation());
    println!("{} {}", "Admin:".bright_cyan(), proxy.admin());
    println!("{} {}", "Adapter:".bright_cyan(), deployment.adapter);
    println!(
        "{} [{}, {}], capacity {}, exit fee {} bps",
        "Band:".bright_cyan(),
        leverage(Wad(storage.lower_bound)),
        leverage(Wad(storage.upper_bound)),
        Wad(storage.capacity),
        storage.exit_fee_bps
    );

    println!("\n{}", "Tokens:".bright_yellow());
    for (symbol, &token) in deployment.tokens() {
        let price = world.lending.reserve(token).map(|r| Wad(r.price).to_string()).unwrap_or_default();
        println!("  {:<8} {} {}", symbol, token, format!("@ {}", price).dimmed());
    }

    println!("\n{}", "Trade paths:".bright_yellow());
    for path in world.adapter.registry().iter() {
        let hops = path
            .tokens()
            .iter()
            .map(|t| world.ledger.token(*t).map(|i| i.symbol.clone()).unwrap_or_else(|_| t.to_string()))
            .collect::<Vec<_>>()
            .join(" -> ");
        println!("  {}", hops);
    }
    print_position(&deployment.snapshot()?);
    Ok(())
}
