//! Audit journal boundary
//!
//! The ledger is in-memory; anything that must outlive the process (audit
//! trail, external persistence) is fed from here. Every committed delta and
//! every interest accrual becomes one `LedgerEvent`.

use chrono::{DateTime, Utc};
use lendbook_core::{AccountId, Asset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::balance::{BalanceKind, DeltaLine};

/// What happened to an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEventKind {
    /// A committed balance delta
    Delta { lines: Vec<DeltaLine> },
    /// Interest brought current on a debt or savings balance
    InterestAccrued {
        kind: BalanceKind,
        asset: Asset,
        interest: Decimal,
        balance_after: Decimal,
    },
}

/// A single journal record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: Uuid,
    pub account: AccountId,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: LedgerEventKind,
}

impl LedgerEvent {
    pub fn new(account: AccountId, at: DateTime<Utc>, kind: LedgerEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            account,
            at,
            kind,
        }
    }
}

/// Receiver of committed ledger events
///
/// Called after the in-memory commit while the account lock is still held, so
/// events for one account arrive in commit order. Implementations own their
/// failure handling; a sink cannot veto a commit.
pub trait JournalSink: Send + Sync {
    fn record(&self, event: LedgerEvent);
}

/// In-memory journal
#[derive(Debug, Default)]
pub struct MemoryJournal {
    events: RwLock<Vec<LedgerEvent>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_for(&self, account: &AccountId) -> Vec<LedgerEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| &event.account == account)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JournalSink for MemoryJournal {
    fn record(&self, event: LedgerEvent) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
