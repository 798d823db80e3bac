//! Scenario files
//!
//! A scenario is a JSON list of steps replayed in order against one
//! `AppContext`. Amounts and prices are decimal strings:
//!
//! ```json
//! {
//!   "prices": { "ETH": "1640", "DAI": "1" },
//!   "steps": [
//!     { "op": "deposit_collateral", "account": "alice", "asset": "ETH", "amount": "2" },
//!     { "op": "borrow", "account": "alice", "asset": "DAI", "amount": "1200" },
//!     { "op": "set_price", "asset": "ETH", "price": "720" },
//!     { "op": "liquidate", "account": "alice", "liquidator": "carol" }
//!   ]
//! }
//! ```

use lendbook_core::{AccountId, Asset};
use lendbook_engine::EngineError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use strum_macros::IntoStaticStr;
use thiserror::Error;
use uuid::Uuid;

use crate::context::AppContext;

/// One scripted action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "op", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Step {
    SetPrice {
        asset: Asset,
        price: Decimal,
    },
    Advance {
        seconds: i64,
    },
    DepositCollateral {
        account: AccountId,
        asset: Asset,
        amount: Decimal,
    },
    WithdrawCollateral {
        account: AccountId,
        asset: Asset,
        amount: Decimal,
    },
    Borrow {
        account: AccountId,
        asset: Asset,
        amount: Decimal,
    },
    Repay {
        account: AccountId,
        asset: Asset,
        amount: Decimal,
    },
    DepositSavings {
        account: AccountId,
        asset: Asset,
        amount: Decimal,
    },
    WithdrawSavings {
        account: AccountId,
        asset: Asset,
        amount: Decimal,
    },
    /// Without both assets the largest debt and collateral are chosen
    Liquidate {
        account: AccountId,
        liquidator: AccountId,
        #[serde(default)]
        debt_asset: Option<Asset>,
        #[serde(default)]
        collateral_asset: Option<Asset>,
    },
    RetryCredit {
        credit_id: Uuid,
    },
    Snapshot {
        account: AccountId,
    },
    RiskReport {
        account: AccountId,
    },
    MaxBorrowable {
        account: AccountId,
        asset: Asset,
    },
    Portfolio {
        account: AccountId,
    },
    PreviewBorrow {
        account: AccountId,
        asset: Asset,
        amount: Decimal,
    },
    LiquidatableAccounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    /// Quotes set before the first step
    #[serde(default)]
    pub prices: BTreeMap<Asset, Decimal>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_json_str(&contents)?)
    }
}

/// Result of one step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub op: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Retrying the step later may succeed
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub transient: bool,
}

#[derive(Debug, Error)]
enum StepError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Failed to encode step output: {0}")]
    Output(#[from] serde_json::Error),
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, StepError> {
    Ok(serde_json::to_value(value)?)
}

async fn execute(ctx: &AppContext, step: &Step) -> Result<Value, StepError> {
    let engine = &ctx.engine;
    match step {
        Step::SetPrice { asset, price } => {
            ctx.set_price(asset.clone(), *price);
            Ok(Value::Null)
        }
        Step::Advance { seconds } => {
            ctx.advance(*seconds);
            Ok(Value::Null)
        }
        Step::DepositCollateral {
            account,
            asset,
            amount,
        } => to_json(&engine.deposit_collateral(account, asset, *amount).await?),
        Step::WithdrawCollateral {
            account,
            asset,
            amount,
        } => to_json(&engine.withdraw_collateral(account, asset, *amount).await?),
        Step::Borrow {
            account,
            asset,
            amount,
        } => to_json(&engine.borrow(account, asset, *amount).await?),
        Step::Repay {
            account,
            asset,
            amount,
        } => to_json(&engine.repay(account, asset, *amount).await?),
        Step::DepositSavings {
            account,
            asset,
            amount,
        } => to_json(&engine.deposit_savings(account, asset, *amount).await?),
        Step::WithdrawSavings {
            account,
            asset,
            amount,
        } => to_json(&engine.withdraw_savings(account, asset, *amount).await?),
        Step::Liquidate {
            account,
            liquidator,
            debt_asset: Some(debt_asset),
            collateral_asset: Some(collateral_asset),
        } => to_json(
            &engine
                .liquidate_pair(account, liquidator, debt_asset, collateral_asset)
                .await?,
        ),
        Step::Liquidate {
            account,
            liquidator,
            ..
        } => to_json(&engine.liquidate(account, liquidator).await?),
        Step::RetryCredit { credit_id } => {
            to_json(&engine.retry_liquidator_credit(*credit_id).await?)
        }
        Step::Snapshot { account } => to_json(&engine.snapshot(account).await?),
        Step::RiskReport { account } => to_json(&engine.risk_report(account).await?),
        Step::MaxBorrowable { account, asset } => {
            to_json(&engine.max_borrowable(account, asset).await?)
        }
        Step::Portfolio { account } => to_json(&engine.portfolio(account).await?),
        Step::PreviewBorrow {
            account,
            asset,
            amount,
        } => to_json(&engine.preview_borrow(account, asset, *amount).await?),
        Step::LiquidatableAccounts => to_json(&engine.liquidatable_accounts().await?),
    }
}

/// Replay `scenario`; engine rejections are reported per step, not returned
///
/// With `fail_fast` the run stops after the first rejected step.
pub async fn run(ctx: &AppContext, scenario: &Scenario, fail_fast: bool) -> anyhow::Result<Vec<StepReport>> {
    for (asset, price) in &scenario.prices {
        ctx.set_price(asset.clone(), *price);
    }

    let mut reports = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let op: &'static str = step.into();
        let report = match execute(ctx, step).await {
            Ok(output) => StepReport {
                step: index + 1,
                op,
                ok: true,
                output: (!output.is_null()).then_some(output),
                error: None,
                transient: false,
            },
            Err(StepError::Engine(err)) => StepReport {
                step: index + 1,
                op,
                ok: false,
                output: None,
                error: Some(err.to_string()),
                transient: err.is_transient(),
            },
            Err(err @ StepError::Output(_)) => return Err(err.into()),
        };

        let failed = !report.ok;
        reports.push(report);
        if failed && fail_fast {
            break;
        }
    }

    Ok(reports)
}
