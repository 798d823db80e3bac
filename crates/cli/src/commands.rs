//! CLI commands

use lendbook_core::{AccountId, Asset};
use rust_decimal::Decimal;
use serde_json::json;
use std::path::Path;

use crate::context::AppContext;
use crate::scenario::{self, Scenario, Step, StepReport};

/// Replay a scenario file and print one JSON report per step
pub async fn run_scenario(
    ctx: &AppContext,
    path: &Path,
    fail_fast: bool,
) -> Result<Vec<StepReport>, anyhow::Error> {
    let scenario = Scenario::from_file(path)?;
    tracing::info!(
        name = scenario.name.as_deref().unwrap_or("unnamed"),
        steps = scenario.steps.len(),
        "running scenario"
    );

    let reports = scenario::run(ctx, &scenario, fail_fast).await?;
    print_reports(&reports)?;
    Ok(reports)
}

/// Built-in walkthrough: open a loan, crash ETH, liquidate
pub fn demo_scenario() -> Scenario {
    let alice = AccountId::from("alice");
    let carol = AccountId::from("carol");

    Scenario {
        name: Some("demo".to_string()),
        prices: [(Asset::eth(), Decimal::from(1640)), (Asset::dai(), Decimal::ONE)]
            .into_iter()
            .collect(),
        steps: vec![
            Step::DepositCollateral {
                account: alice.clone(),
                asset: Asset::eth(),
                amount: Decimal::from(2),
            },
            Step::Borrow {
                account: alice.clone(),
                asset: Asset::dai(),
                amount: Decimal::from(1200),
            },
            Step::DepositSavings {
                account: alice.clone(),
                asset: Asset::dai(),
                amount: Decimal::from(850),
            },
            Step::RiskReport {
                account: alice.clone(),
            },
            Step::SetPrice {
                asset: Asset::eth(),
                price: Decimal::from(720),
            },
            Step::LiquidatableAccounts,
            Step::Liquidate {
                account: alice.clone(),
                liquidator: carol.clone(),
                debt_asset: None,
                collateral_asset: None,
            },
            Step::Snapshot { account: alice },
            Step::Snapshot { account: carol },
        ],
    }
}

pub async fn demo(ctx: &AppContext) -> Result<Vec<StepReport>, anyhow::Error> {
    let reports = scenario::run(ctx, &demo_scenario(), true).await?;
    print_reports(&reports)?;
    Ok(reports)
}

/// Print the effective market configuration
pub fn show_config(ctx: &AppContext) -> Result<(), anyhow::Error> {
    println!("{}", serde_json::to_string_pretty(ctx.engine.config())?);
    Ok(())
}

/// Quote a borrow against a fresh deposit, without touching real accounts
pub async fn preview(
    ctx: &AppContext,
    collateral: Decimal,
    collateral_asset: &Asset,
    borrow: Decimal,
    borrow_asset: &Asset,
) -> Result<(), anyhow::Error> {
    let scratch = AccountId::from("preview");
    ctx.engine
        .deposit_collateral(&scratch, collateral_asset, collateral)
        .await?;
    let preview = ctx.engine.preview_borrow(&scratch, borrow_asset, borrow).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "collateral": { "asset": collateral_asset, "amount": collateral },
            "preview": preview,
        }))?
    );
    Ok(())
}

fn print_reports(reports: &[StepReport]) -> Result<(), anyhow::Error> {
    for report in reports {
        println!("{}", serde_json::to_string(report)?);
    }
    Ok(())
}
