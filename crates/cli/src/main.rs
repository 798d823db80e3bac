//! LendBook CLI - Main entry point

use clap::{Parser, Subcommand};
use lendbook_cli::{commands, AppContext};
use lendbook_core::Asset;
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lendbook")]
#[command(about = "LendBook - Collateralized lending engine", long_about = None)]
struct Cli {
    /// Market configuration file (JSON); built-in ETH/DAI markets if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file
    Run {
        /// Scenario path
        scenario: PathBuf,
        /// Stop at the first rejected step
        #[arg(long)]
        fail_fast: bool,
    },

    /// Open a loan, crash the collateral price and liquidate it
    Demo,

    /// Print the effective market configuration
    Config,

    /// Quote a borrow against a hypothetical deposit
    Preview {
        /// Collateral to deposit
        #[arg(long)]
        collateral: Decimal,
        #[arg(long, default_value = "ETH")]
        collateral_asset: Asset,
        /// Amount to borrow
        #[arg(long)]
        borrow: Decimal,
        #[arg(long, default_value = "DAI")]
        borrow_asset: Asset,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reports go to stdout, logs to stderr
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let ctx = AppContext::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            scenario,
            fail_fast,
        } => {
            let reports = commands::run_scenario(&ctx, &scenario, fail_fast).await?;
            let failed = reports.iter().filter(|report| !report.ok).count();
            if failed > 0 {
                tracing::warn!(failed, total = reports.len(), "scenario finished with rejected steps");
            }
        }

        Commands::Demo => {
            commands::demo(&ctx).await?;
        }

        Commands::Config => {
            commands::show_config(&ctx)?;
        }

        Commands::Preview {
            collateral,
            collateral_asset,
            borrow,
            borrow_asset,
        } => {
            commands::preview(&ctx, collateral, &collateral_asset, borrow, &borrow_asset).await?;
        }
    }

    Ok(())
}
