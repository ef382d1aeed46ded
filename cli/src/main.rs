//! Dango CLI - scenario runner and keeper simulator
//!
//! Deploys the leverage vault stack into an in-process chain and drives it
//! from scripted scenarios or simulated price paths.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use dango_common::Wad;
use dango_sim::{account, deploy};

mod config;
mod keeper;
mod report;
mod scenario;

#[derive(Parser)]
#[command(name = "dango")]
#[command(about = "Dango leverage vault CLI - deploy, script and keep a simulated vault", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter scenario file
    Init {
        /// Destination path
        path: String,
    },

    /// Deploy and print the resulting vault, tokens and trade paths
    Inspect {
        /// Scenario file whose deployment section to use
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Replay a scenario file step by step
    Run {
        /// Scenario file (TOML)
        scenario: String,
    },

    /// Walk the collateral price along a path, rebalancing when needed
    Keeper {
        /// Scenario file whose deployment section to use
        #[arg(short, long)]
        config: Option<String>,

        /// Collateral seeded into the vault before the walk (whole tokens)
        #[arg(long, default_value = "5")]
        deposit: Wad,

        /// Comma-separated collateral prices
        #[arg(long, value_delimiter = ',', required = true)]
        prices: Vec<Wad>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Init { path } => {
            let written = config::write_template(&path)?;
            println!("{} Wrote {}", "✓".bright_green(), written.display());
        }
        Commands::Inspect { config: path } => {
            let deployment = deploy(&config::load_deployment(path.as_deref())?)?;
            if cli.json {
                report::print_json(&deployment.snapshot()?)?;
            } else {
                report::print_deployment(&deployment)?;
            }
        }
        Commands::Run { scenario: path } => {
            let file = config::load_scenario(&path)?;
            let result = scenario::run(&file)?;
            if cli.json {
                report::print_json(&result)?;
            } else {
                report::print_scenario(&result);
            }
        }
        Commands::Keeper { config: path, deposit, prices } => {
            let mut deployment = deploy(&config::load_deployment(path.as_deref())?)?;
            let depositor = account("depositor");
            let amount = deposit.to_units(deployment.decimals(deployment.collateral)?)?;
            deployment.fund(depositor, deployment.collateral, amount)?;
            deployment.deposit(depositor, amount)?;
            let ticks = keeper::run(&mut deployment, account("keeper"), &prices)?;
            if cli.json {
                report::print_json(&ticks)?;
            } else {
                report::print_keeper(&ticks);
            }
        }
    }

    Ok(())
}
